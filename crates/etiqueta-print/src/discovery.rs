// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Discovery session: drives a platform scan and forwards each new device to
// the event sink, once per address per session.
//
// The platform reports scan events on its own thread. The scan callback
// tags each event with the session id and hands it to a pump task, which
// deduplicates through the registry and emits in arrival order. Events from
// a session that has since been stopped or restarted are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use etiqueta_bridge::traits::{PlatformBridge, ScanCallback, ScanEvent};
use etiqueta_core::error::{ErrorKind, Result};
use etiqueta_core::types::{DeviceRecord, PrinterEvent};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::EventSink;
use crate::registry::DeviceRegistry;

/// Message of the terminal notification sent when a scan runs to completion.
pub const DISCOVERY_FINISHED: &str = "discovery finished";

/// Invoked once, with the session id, when a session's scan runs to
/// completion (not when stopped).
pub type FinishedHook = Box<dyn FnOnce(u64) + Send + 'static>;

/// One scan at a time, with per-session deduplication.
pub struct DiscoverySession {
    bridge: Arc<dyn PlatformBridge>,
    sink: EventSink,
    runtime: Handle,
    registry: Arc<Mutex<DeviceRegistry>>,
    /// Id of the running session; 0 when none is running.
    active: Arc<AtomicU64>,
    next_id: AtomicU64,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoverySession {
    pub fn new(bridge: Arc<dyn PlatformBridge>, sink: EventSink, runtime: Handle) -> Self {
        Self {
            bridge,
            sink,
            runtime,
            registry: Arc::new(Mutex::new(DeviceRegistry::new())),
            active: Arc::new(AtomicU64::new(0)),
            next_id: AtomicU64::new(1),
            pump: Mutex::new(None),
        }
    }

    /// Start a fresh session, stopping any running one first.
    ///
    /// Radio and permission preconditions are the caller's job. `on_finished`
    /// runs after the terminal notification if the scan completes on its own.
    pub fn start(&self, on_finished: FinishedHook) -> Result<()> {
        self.stop();
        self.registry
            .lock()
            .expect("registry lock poisoned")
            .clear();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.active.store(id, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel::<(u64, ScanEvent)>();
        let callback: ScanCallback = Arc::new(move |event| {
            // The pump may already be gone after stop().
            let _ = tx.send((id, event));
        });

        let pump = self.runtime.spawn(pump_events(
            id,
            rx,
            Arc::clone(&self.active),
            Arc::clone(&self.registry),
            self.sink.clone(),
            on_finished,
        ));
        *self.pump.lock().expect("pump lock poisoned") = Some(pump);

        if let Err(e) = self.bridge.start_scan(callback) {
            warn!(error = %e, "platform scan failed to start");
            self.active.store(0, Ordering::SeqCst);
            if let Some(pump) = self.pump.lock().expect("pump lock poisoned").take() {
                pump.abort();
            }
            return Err(e);
        }

        info!(session = id, "discovery started");
        Ok(())
    }

    /// Stop the running session, if any. Idempotent.
    pub fn stop(&self) {
        let previous = self.active.swap(0, Ordering::SeqCst);
        if let Some(pump) = self.pump.lock().expect("pump lock poisoned").take() {
            pump.abort();
        }
        if previous != 0 {
            self.bridge.cancel_scan();
            info!(session = previous, "discovery stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) != 0
    }

    /// Id of the running session, if any.
    pub fn session_id(&self) -> Option<u64> {
        match self.active.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// Look up a device seen during the current session.
    pub fn lookup(&self, address: &str) -> Option<DeviceRecord> {
        self.registry
            .lock()
            .expect("registry lock poisoned")
            .lookup(address)
            .cloned()
    }

    /// Number of distinct devices seen during the current session.
    pub fn discovered_count(&self) -> usize {
        self.registry.lock().expect("registry lock poisoned").len()
    }
}

// -- internal helpers -------------------------------------------------------

async fn pump_events(
    id: u64,
    mut rx: mpsc::UnboundedReceiver<(u64, ScanEvent)>,
    active: Arc<AtomicU64>,
    registry: Arc<Mutex<DeviceRegistry>>,
    sink: EventSink,
    on_finished: FinishedHook,
) {
    while let Some((session, event)) = rx.recv().await {
        if session != id || active.load(Ordering::SeqCst) != id {
            debug!(session, "dropping scan event from stale session");
            continue;
        }

        match event {
            ScanEvent::DeviceFound(record) => {
                let fresh = registry
                    .lock()
                    .expect("registry lock poisoned")
                    .register(record.clone());
                if fresh {
                    debug!(address = %record.address, name = %record.display_name, "device discovered");
                    sink.emit(PrinterEvent::DeviceDiscovered(record));
                }
            }
            ScanEvent::Finished => {
                if active
                    .compare_exchange(id, 0, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    info!(session = id, "discovery finished");
                    sink.emit(PrinterEvent::Error {
                        kind: ErrorKind::DiscoveryFinished,
                        message: DISCOVERY_FINISHED.into(),
                    });
                    on_finished(id);
                }
                return;
            }
        }
    }
}
