// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport connection: the single serial link to one printer.
//
// `connect`, `write` and `close` are serialized by one async mutex around
// the link slot. Platform I/O blocks, so it runs on the blocking pool under
// a deadline. A call that overruns its deadline is abandoned; whatever it
// eventually returns is closed in the background.
//
// Bonding is asynchronous on most platforms: after the request is accepted
// the bond state is polled until it settles, all within the connect deadline.
//
// Every connect attempt carries a generation number. An attempt that is no
// longer current when its stream opens closes that stream without
// announcing it, so overlapping connects leave one live link.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use etiqueta_bridge::traits::{PlatformBridge, SerialLink};
use etiqueta_core::config::EngineConfig;
use etiqueta_core::error::{EtiquetaError, Result};
use etiqueta_core::types::{BondState, DeviceRecord, PrinterEvent};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::events::EventSink;
use crate::pairing::PairingHandshake;

/// Gap between bond state polls while pairing is in progress.
const BOND_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Check that the adapter exists, is on, and may be used.
pub fn check_ready(bridge: &dyn PlatformBridge) -> Result<()> {
    if !bridge.is_present() {
        return Err(EtiquetaError::AdapterMissing);
    }
    if !bridge.is_enabled() {
        return Err(EtiquetaError::RadioDisabled);
    }
    if !bridge.has_permissions() {
        return Err(EtiquetaError::PermissionDenied);
    }
    Ok(())
}

/// How a connect attempt ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The link is open and was announced.
    Connected,
    /// A newer attempt or a close overtook this one. Nothing was announced.
    Superseded,
}

struct ActiveLink {
    device: DeviceRecord,
    stream: Box<dyn SerialLink>,
}

/// Owner of the one open serial stream.
pub struct TransportConnection {
    bridge: Arc<dyn PlatformBridge>,
    sink: EventSink,
    pairing: PairingHandshake,
    service: Uuid,
    connect_timeout: Duration,
    write_timeout: Duration,
    link: Mutex<Option<ActiveLink>>,
    generation: AtomicU64,
}

impl TransportConnection {
    pub fn new(bridge: Arc<dyn PlatformBridge>, sink: EventSink, config: &EngineConfig) -> Self {
        Self {
            pairing: PairingHandshake::new(Arc::clone(&bridge), config.pairing_pin.clone()),
            bridge,
            sink,
            service: config.service_uuid,
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
            link: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Start a new connect attempt. Every earlier attempt becomes stale.
    pub fn begin_attempt(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make every in-flight attempt stale.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == attempt
    }

    /// Open a link to `device` for `attempt`, tearing down any existing one.
    ///
    /// On failure the error is reported and the connection is closed, which
    /// announces `connected: false`.
    #[instrument(skip_all, fields(address = %device.address, attempt = attempt))]
    pub async fn connect(&self, device: DeviceRecord, attempt: u64) -> Result<ConnectOutcome> {
        let mut slot = self.link.lock().await;
        if !self.is_current(attempt) {
            debug!("attempt superseded before it started");
            return Ok(ConnectOutcome::Superseded);
        }
        if slot.is_some() {
            info!("replacing existing connection");
            self.close_locked(&mut slot).await;
        }

        let result = self.establish(&device).await;
        self.pairing.disarm();

        match result {
            Ok(stream) if !self.is_current(attempt) => {
                debug!("attempt superseded after the stream opened; discarding it");
                self.discard(stream).await;
                Ok(ConnectOutcome::Superseded)
            }
            Ok(stream) => {
                info!("connected");
                *slot = Some(ActiveLink {
                    device: device.clone(),
                    stream,
                });
                self.sink.emit(PrinterEvent::ConnectionStateChanged {
                    connected: true,
                    device: Some(device),
                });
                Ok(ConnectOutcome::Connected)
            }
            Err(e) if !self.is_current(attempt) => {
                debug!(error = %e, "superseded attempt failed");
                Ok(ConnectOutcome::Superseded)
            }
            Err(e) => {
                self.sink.report(&e);
                self.close_locked(&mut slot).await;
                Err(e)
            }
        }
    }

    /// Write one encoded job and flush it, then announce the print.
    ///
    /// Without an open link this reports "no active connection" and performs
    /// no I/O. A failed or partial write tears the link down.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        let mut slot = self.link.lock().await;
        let Some(ActiveLink { device, mut stream }) = slot.take() else {
            let err = EtiquetaError::NotConnected;
            self.sink.report(&err);
            return Err(err);
        };

        let result = run_blocking(
            "write",
            self.write_timeout,
            self.write_timeout,
            move || {
                let outcome = stream.write_all(&bytes).and_then(|()| stream.flush());
                (stream, outcome)
            },
            |(mut stream, _)| {
                let _ = close_stream(stream.as_mut());
            },
        )
        .await;

        let failure = match result {
            Ok((stream, outcome)) => {
                *slot = Some(ActiveLink { device, stream });
                match outcome {
                    Ok(()) => {
                        debug!("job written");
                        // Still under the link lock, so a waiting close
                        // announces its disconnect after this.
                        self.sink.emit(PrinterEvent::PrintSucceeded);
                        return Ok(());
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        warn!(error = %failure, "write failed; tearing down link");
        self.sink.report(&failure);
        self.close_locked(&mut slot).await;
        Err(failure)
    }

    /// Close the link. Safe to call at any time, any number of times.
    ///
    /// Waits for an outstanding connect or write to finish first. Always
    /// announces `connected: false` once.
    pub async fn close(&self) {
        self.invalidate();
        let mut slot = self.link.lock().await;
        self.close_locked(&mut slot).await;
    }

    /// The device behind the open link, if any. Waits for outstanding I/O.
    pub async fn connected_device(&self) -> Option<DeviceRecord> {
        self.link.lock().await.as_ref().map(|link| link.device.clone())
    }

    // -- internal helpers ---------------------------------------------------

    async fn establish(&self, device: &DeviceRecord) -> Result<Box<dyn SerialLink>> {
        check_ready(&*self.bridge)?;
        self.bridge.cancel_scan();

        let deadline = Instant::now() + self.connect_timeout;

        self.bond(device, deadline).await?;

        let bridge = Arc::clone(&self.bridge);
        let target = device.clone();
        let service = self.service;
        run_blocking(
            "connect",
            remaining(deadline),
            self.connect_timeout,
            move || bridge.open_stream(&target, service),
            |opened| {
                if let Ok(mut stream) = opened {
                    let _ = close_stream(stream.as_mut());
                }
            },
        )
        .await?
    }

    /// Make sure `device` is bonded before `deadline`, pairing with the
    /// configured PIN when it is not. A bond already in progress is waited
    /// on rather than requested again.
    async fn bond(&self, device: &DeviceRecord, deadline: Instant) -> Result<()> {
        let state = self.known_bond_state(device);
        if state == BondState::Bonded {
            return Ok(());
        }

        info!(address = %device.address, ?state, "device not bonded; pairing");
        self.pairing.arm(&device.address)?;
        if state == BondState::Unbonded {
            let bridge = Arc::clone(&self.bridge);
            let target = device.clone();
            run_blocking(
                "pairing",
                remaining(deadline),
                self.connect_timeout,
                move || bridge.create_bond(&target),
                |_| {},
            )
            .await??;
        }
        self.await_bond(&device.address, deadline).await
    }

    /// Poll the platform until the bond with `address` settles.
    async fn await_bond(&self, address: &str, deadline: Instant) -> Result<()> {
        loop {
            let bridge = Arc::clone(&self.bridge);
            let target = address.to_owned();
            let state = run_blocking(
                "pairing",
                remaining(deadline),
                self.connect_timeout,
                move || bridge.bond_state(&target),
                |_| {},
            )
            .await??;

            match state {
                BondState::Bonded => {
                    debug!(address, "bonded");
                    return Ok(());
                }
                BondState::Unbonded => {
                    return Err(EtiquetaError::Pairing(format!(
                        "bonding with {address} did not complete"
                    )));
                }
                BondState::Bonding => {}
            }

            let left = remaining(deadline);
            if left.is_zero() {
                warn!(address, "bonding still in progress at the deadline");
                return Err(EtiquetaError::Timeout {
                    operation: "pairing",
                    seconds: self.connect_timeout.as_secs(),
                });
            }
            tokio::time::sleep(left.min(BOND_POLL_INTERVAL)).await;
        }
    }

    fn known_bond_state(&self, device: &DeviceRecord) -> BondState {
        if device.is_bonded() {
            return BondState::Bonded;
        }
        self.bridge
            .bond_state(&device.address)
            .unwrap_or_else(|e| {
                debug!(error = %e, "bond state unavailable; assuming unbonded");
                BondState::Unbonded
            })
    }

    /// Tear down whatever is in `slot` while the lock is held.
    async fn close_locked(&self, slot: &mut Option<ActiveLink>) {
        self.pairing.disarm();

        if let Some(ActiveLink { device, mut stream }) = slot.take() {
            let closed = tokio::task::spawn_blocking(move || close_stream(stream.as_mut())).await;
            match closed {
                Ok(Ok(())) => info!(address = %device.address, "connection closed"),
                Ok(Err(e)) => self.sink.report(&e),
                Err(join) => self
                    .sink
                    .report(&EtiquetaError::Close(format!("close task failed: {join}"))),
            }
        }

        self.sink.emit(PrinterEvent::disconnected());
    }

    /// Close a stream nobody will use, without announcing anything.
    async fn discard(&self, mut stream: Box<dyn SerialLink>) {
        let closed = tokio::task::spawn_blocking(move || close_stream(stream.as_mut())).await;
        if let Ok(Err(e)) = closed {
            debug!(error = %e, "error closing discarded stream");
        }
    }
}

/// Close the output side, then the stream itself. Both are attempted; the
/// first failure is returned.
fn close_stream(stream: &mut dyn SerialLink) -> Result<()> {
    let output = stream.close_output();
    let socket = stream.close();
    output.and(socket).map_err(|e| match e {
        EtiquetaError::Close(_) => e,
        other => EtiquetaError::Close(other.to_string()),
    })
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Run `call` on the blocking pool for at most `limit`.
///
/// On timeout the call keeps running; its result goes to `reclaim` once it
/// returns. `budget` is the configured deadline named in the error.
async fn run_blocking<T, F, R>(
    operation: &'static str,
    limit: Duration,
    budget: Duration,
    call: F,
    reclaim: R,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    R: FnOnce(T) + Send + 'static,
{
    let mut task = tokio::task::spawn_blocking(call);
    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join)) => Err(EtiquetaError::Bridge(format!(
            "{operation} task failed: {join}"
        ))),
        Err(_) => {
            warn!(operation, seconds = budget.as_secs(), "platform call timed out");
            tokio::spawn(async move {
                if let Ok(value) = task.await {
                    let _ = tokio::task::spawn_blocking(move || reclaim(value)).await;
                }
            });
            Err(EtiquetaError::Timeout {
                operation,
                seconds: budget.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etiqueta_bridge::mock::MockBridge;
    use etiqueta_core::error::ErrorKind;
    use etiqueta_core::types::SPP_UUID;

    const ADDR: &str = "00:11:22:33:44:55";

    fn bonded() -> DeviceRecord {
        DeviceRecord::new(ADDR, "PT-260", BondState::Bonded)
    }

    fn transport(bridge: &Arc<MockBridge>) -> (TransportConnection, crate::events::EventStream) {
        let (sink, stream) = EventSink::channel();
        let transport = TransportConnection::new(bridge.clone(), sink, &EngineConfig::default());
        (transport, stream)
    }

    fn drain(stream: &mut crate::events::EventStream) -> Vec<PrinterEvent> {
        let mut events = Vec::new();
        while let Ok(event) = stream.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn connect_write_close() {
        let bridge = Arc::new(MockBridge::new());
        bridge.add_bonded(bonded());
        let (transport, mut events) = transport(&bridge);

        let attempt = transport.begin_attempt();
        let outcome = transport.connect(bonded(), attempt).await.expect("connect");
        assert_eq!(outcome, ConnectOutcome::Connected);
        assert_eq!(transport.connected_device().await.map(|d| d.address), Some(ADDR.into()));

        transport.write(vec![1, 2, 3]).await.expect("write");
        transport.close().await;

        let links = bridge.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].service, SPP_UUID);
        assert_eq!(links[0].written, vec![1, 2, 3]);
        assert_eq!(links[0].flushes, 1);
        assert!(links[0].output_closed && links[0].closed);

        assert_eq!(
            drain(&mut events),
            vec![
                PrinterEvent::ConnectionStateChanged {
                    connected: true,
                    device: Some(bonded()),
                },
                PrinterEvent::PrintSucceeded,
                PrinterEvent::disconnected(),
            ]
        );
    }

    #[tokio::test]
    async fn write_without_link_does_no_io() {
        let bridge = Arc::new(MockBridge::new());
        let (transport, mut events) = transport(&bridge);

        let err = transport.write(vec![0x1B, 0x40]).await.unwrap_err();
        assert!(matches!(err, EtiquetaError::NotConnected));
        assert!(bridge.links().is_empty());
        assert_eq!(
            drain(&mut events),
            vec![PrinterEvent::Error {
                kind: ErrorKind::NoConnection,
                message: "no active connection".into(),
            }]
        );
    }

    #[tokio::test]
    async fn failed_open_reports_then_disconnects() {
        let bridge = Arc::new(MockBridge::new());
        bridge.add_bonded(bonded());
        bridge.fail_open(ADDR, "read failed, socket might closed");
        let (transport, mut events) = transport(&bridge);

        let attempt = transport.begin_attempt();
        assert!(transport.connect(bonded(), attempt).await.is_err());

        let events = drain(&mut events);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            PrinterEvent::Error { kind: ErrorKind::Transport, message }
                if message.contains("socket might closed")
        ));
        assert_eq!(events[1], PrinterEvent::disconnected());
    }

    #[tokio::test]
    async fn unbonded_device_is_paired_with_configured_pin() {
        let bridge = Arc::new(MockBridge::new());
        let (transport, _events) = transport(&bridge);
        let device = DeviceRecord::new(ADDR, "PT-260", BondState::Unbonded);

        let attempt = transport.begin_attempt();
        transport.connect(device, attempt).await.expect("connect");

        assert_eq!(bridge.bond_requests(), vec![ADDR.to_string()]);
        assert_eq!(
            bridge.pairing_replies(),
            vec![etiqueta_bridge::traits::PairingReply::SupplyPin("0000".into())]
        );
        assert!(!bridge.handler_registered());
        assert_eq!(bridge.open_links().len(), 1);
    }

    #[tokio::test]
    async fn wrong_pin_fails_connect() {
        let bridge = Arc::new(MockBridge::new());
        bridge.set_expected_pin("1234");
        let (transport, _events) = transport(&bridge);
        let device = DeviceRecord::new(ADDR, "", BondState::Unbonded);

        let attempt = transport.begin_attempt();
        let err = transport.connect(device, attempt).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(bridge.links().is_empty());
        assert!(!bridge.handler_registered());
    }

    #[tokio::test]
    async fn stale_attempt_discards_its_stream() {
        let bridge = Arc::new(MockBridge::new());
        bridge.add_bonded(bonded());
        let (transport, mut events) = transport(&bridge);

        let attempt = transport.begin_attempt();
        transport.invalidate();
        let outcome = transport.connect(bonded(), attempt).await.expect("connect");
        assert_eq!(outcome, ConnectOutcome::Superseded);
        assert!(bridge.links().is_empty());
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn close_failure_is_reported_and_still_disconnects() {
        let bridge = Arc::new(MockBridge::new());
        bridge.add_bonded(bonded());
        bridge.fail_close("socket already closed");
        let (transport, mut events) = transport(&bridge);

        let attempt = transport.begin_attempt();
        transport.connect(bonded(), attempt).await.expect("connect");
        drain(&mut events);

        transport.close().await;
        let events = drain(&mut events);
        assert!(matches!(
            &events[0],
            PrinterEvent::Error { kind: ErrorKind::Transport, message }
                if message.starts_with("error while closing connection")
        ));
        assert_eq!(events[1], PrinterEvent::disconnected());
        assert!(bridge.links()[0].closed);
    }

    #[tokio::test]
    async fn slow_open_times_out() {
        let bridge = Arc::new(MockBridge::new());
        bridge.add_bonded(bonded());
        bridge.delay_open(ADDR, Duration::from_millis(1500));
        let (sink, mut events) = EventSink::channel();
        let config = EngineConfig {
            connect_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let transport = TransportConnection::new(bridge.clone(), sink, &config);

        let attempt = transport.begin_attempt();
        let err = transport.connect(bonded(), attempt).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(matches!(
            events.recv().await,
            Some(PrinterEvent::Error { kind: ErrorKind::Timeout, .. })
        ));
        assert_eq!(events.recv().await, Some(PrinterEvent::disconnected()));

        // The late stream is closed once the platform call returns.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(bridge.open_links().is_empty());
    }

    #[tokio::test]
    async fn slow_write_times_out_and_late_stream_is_closed() {
        let bridge = Arc::new(MockBridge::new());
        bridge.add_bonded(bonded());
        bridge.delay_writes(Duration::from_millis(1500));
        let (sink, mut events) = EventSink::channel();
        let config = EngineConfig {
            write_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let transport = TransportConnection::new(bridge.clone(), sink, &config);

        let attempt = transport.begin_attempt();
        transport.connect(bonded(), attempt).await.expect("connect");
        drain(&mut events);

        let err = transport.write(vec![0x1B, 0x40]).await.unwrap_err();
        assert!(matches!(
            err,
            EtiquetaError::Timeout { operation: "write", seconds: 1 }
        ));
        assert_eq!(transport.connected_device().await, None);
        let events = drain(&mut events);
        assert!(matches!(
            &events[0],
            PrinterEvent::Error { kind: ErrorKind::Timeout, .. }
        ));
        assert_eq!(events[1], PrinterEvent::disconnected());
        assert_eq!(events.len(), 2);

        // The write is still running; the link stays open until it returns.
        assert_eq!(bridge.open_links().len(), 1);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(bridge.open_links().is_empty());
    }

    #[tokio::test]
    async fn stream_opens_only_after_deferred_bond_completes() {
        let bridge = Arc::new(MockBridge::new());
        bridge.defer_bonding(3);
        let (transport, _events) = transport(&bridge);
        let device = DeviceRecord::new(ADDR, "PT-260", BondState::Unbonded);

        let attempt = transport.begin_attempt();
        let outcome = transport.connect(device, attempt).await.expect("connect");
        assert_eq!(outcome, ConnectOutcome::Connected);

        // The prompt arrived while the responder was still armed.
        assert_eq!(
            bridge.pairing_replies(),
            vec![etiqueta_bridge::traits::PairingReply::SupplyPin("0000".into())]
        );
        assert_eq!(bridge.bond_requests().len(), 1);
        assert!(!bridge.handler_registered());
        assert_eq!(bridge.open_links().len(), 1);
    }

    #[tokio::test]
    async fn bond_in_progress_is_awaited_not_requested_again() {
        use etiqueta_bridge::traits::SerialConnector;

        let bridge = Arc::new(MockBridge::new());
        bridge.defer_bonding(2);
        let device = DeviceRecord::new(ADDR, "PT-260", BondState::Unbonded);
        bridge.create_bond(&device).expect("bond requested");
        let (transport, _events) = transport(&bridge);

        let attempt = transport.begin_attempt();
        transport.connect(device, attempt).await.expect("connect");
        assert_eq!(bridge.bond_requests(), vec![ADDR.to_string()]);
        assert_eq!(bridge.open_links().len(), 1);
    }

    #[tokio::test]
    async fn bond_that_never_settles_times_out() {
        let bridge = Arc::new(MockBridge::new());
        bridge.defer_bonding(usize::MAX);
        let (sink, mut events) = EventSink::channel();
        let config = EngineConfig {
            connect_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let transport = TransportConnection::new(bridge.clone(), sink, &config);
        let device = DeviceRecord::new(ADDR, "", BondState::Unbonded);

        let attempt = transport.begin_attempt();
        let err = transport.connect(device, attempt).await.unwrap_err();
        assert!(matches!(
            err,
            EtiquetaError::Timeout { operation: "pairing", .. }
        ));
        assert!(bridge.links().is_empty());
        assert!(!bridge.handler_registered());
        assert!(matches!(
            events.recv().await,
            Some(PrinterEvent::Error { kind: ErrorKind::Timeout, .. })
        ));
    }
}
