// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Event sink: the single ordered channel every notification goes through.
// The receiving end is the UI's dispatch context.

use etiqueta_core::error::EtiquetaError;
use etiqueta_core::types::PrinterEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Receiving half handed to the UI.
pub type EventStream = mpsc::UnboundedReceiver<PrinterEvent>;

/// Cloneable sending half shared by the engine's components.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<PrinterEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: PrinterEvent) {
        debug!(?event, "emit");
        if self.tx.send(event).is_err() {
            debug!("event stream dropped; notification discarded");
        }
    }

    /// Report `err` through an `Error` event. A disabled radio is announced
    /// with `RadioStateChanged { enabled: false }` first.
    pub fn report(&self, err: &EtiquetaError) {
        if err.kind().is_failure() {
            warn!(kind = %err.kind(), error = %err, "reporting error");
        }
        if matches!(err, EtiquetaError::RadioDisabled) {
            self.emit(PrinterEvent::RadioStateChanged { enabled: false });
        }
        self.emit(PrinterEvent::error(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etiqueta_core::error::ErrorKind;

    #[test]
    fn events_arrive_in_emission_order() {
        let (sink, mut stream) = EventSink::channel();
        sink.emit(PrinterEvent::PrintSucceeded);
        sink.report(&EtiquetaError::NotConnected);

        assert_eq!(stream.try_recv().ok(), Some(PrinterEvent::PrintSucceeded));
        assert_eq!(
            stream.try_recv().ok(),
            Some(PrinterEvent::Error {
                kind: ErrorKind::NoConnection,
                message: "no active connection".into(),
            })
        );
    }

    #[test]
    fn disabled_radio_is_announced_before_the_error() {
        let (sink, mut stream) = EventSink::channel();
        sink.report(&EtiquetaError::RadioDisabled);

        assert_eq!(
            stream.try_recv().ok(),
            Some(PrinterEvent::RadioStateChanged { enabled: false })
        );
        assert_eq!(
            stream.try_recv().ok(),
            Some(PrinterEvent::Error {
                kind: ErrorKind::Precondition,
                message: "Bluetooth is disabled".into(),
            })
        );
        assert!(stream.try_recv().is_err());
    }

    #[test]
    fn emitting_after_receiver_dropped_is_harmless() {
        let (sink, stream) = EventSink::channel();
        drop(stream);
        sink.emit(PrinterEvent::PrintSucceeded);
    }
}
