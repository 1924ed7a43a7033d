// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer engine: the state machine the UI drives.
//
// States and transitions:
//
//   Idle | Connected  --start_discovery-->   Discovering
//   Discovering       --stop / finished-->   Idle, or Connected if a link is open
//   any but Printing  --connect-->           Connecting
//   Connecting        --success-->           Connected
//   Connecting        --failure-->           Idle
//   Connected         --print-->             Printing
//   Printing          --success-->           Connected
//   Printing          --failure-->           Idle
//   any               --close-->             Idle
//
// Every notification goes through the event stream returned by
// `Engine::new`. Synchronous rejections are reported there and also returned
// to the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use etiqueta_bridge::traits::PlatformBridge;
use etiqueta_core::config::EngineConfig;
use etiqueta_core::error::{EtiquetaError, Result};
use etiqueta_core::types::{DeviceRecord, EngineState, PrintJob, PrinterEvent};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::discovery::DiscoverySession;
use crate::encoder;
use crate::events::{EventSink, EventStream};
use crate::transport::{check_ready, ConnectOutcome, TransportConnection};

/// A background `connect` or `print`.
///
/// Await it for the outcome, or drop it to let the operation run detached.
/// After [`abort`](Self::abort), call [`Engine::close`] to return to `Idle`.
#[derive(Debug)]
pub struct OperationHandle {
    handle: JoinHandle<Result<()>>,
}

impl OperationHandle {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for OperationHandle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(EtiquetaError::Runtime("operation aborted".into())),
            Err(e) => Err(EtiquetaError::Runtime(format!("operation panicked: {e}"))),
        })
    }
}

#[derive(Debug)]
struct Machine {
    state: EngineState,
    /// Device behind the open link.
    device: Option<DeviceRecord>,
    /// Connect attempt the machine is waiting on; 0 when none.
    attempt: u64,
}

impl Machine {
    /// State to settle in once discovery ends.
    fn resting_state(&self) -> EngineState {
        if self.device.is_some() {
            EngineState::Connected
        } else {
            EngineState::Idle
        }
    }
}

struct Inner {
    bridge: Arc<dyn PlatformBridge>,
    config: EngineConfig,
    sink: EventSink,
    runtime: Handle,
    discovery: DiscoverySession,
    transport: TransportConnection,
    machine: Mutex<Machine>,
}

impl Inner {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().expect("engine state lock poisoned")
    }

    /// Report `err` on the event stream and hand it back for returning.
    fn reject(&self, err: EtiquetaError) -> EtiquetaError {
        self.sink.report(&err);
        err
    }
}

/// Handle to the printer engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Build an engine on the current tokio runtime.
    pub fn new(bridge: Arc<dyn PlatformBridge>, config: EngineConfig) -> Result<(Self, EventStream)> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| EtiquetaError::Runtime(e.to_string()))?;
        let (sink, stream) = EventSink::channel();

        info!(
            platform = bridge.platform_name(),
            dialect = config.dialect.display_name(),
            "printer engine ready"
        );

        let inner = Inner {
            discovery: DiscoverySession::new(Arc::clone(&bridge), sink.clone(), runtime.clone()),
            transport: TransportConnection::new(Arc::clone(&bridge), sink.clone(), &config),
            bridge,
            config,
            sink,
            runtime,
            machine: Mutex::new(Machine {
                state: EngineState::Idle,
                device: None,
                attempt: 0,
            }),
        };
        Ok((
            Self {
                inner: Arc::new(inner),
            },
            stream,
        ))
    }

    pub fn state(&self) -> EngineState {
        self.inner.machine().state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Device behind the open link, as last announced.
    pub fn connected_device(&self) -> Option<DeviceRecord> {
        self.inner.machine().device.clone()
    }

    /// Adapter present and switched on.
    pub fn is_ready(&self) -> bool {
        self.inner.bridge.is_present() && self.inner.bridge.is_enabled()
    }

    pub fn has_permissions(&self) -> bool {
        self.inner.bridge.has_permissions()
    }

    /// Ask the platform to switch the radio on. No-op when already on.
    pub fn request_enable_radio(&self) -> Result<()> {
        let bridge = &self.inner.bridge;
        if bridge.is_enabled() {
            return Ok(());
        }
        bridge
            .request_enable()
            .map_err(|e| self.inner.reject(e))?;
        if bridge.is_enabled() {
            self.inner
                .sink
                .emit(PrinterEvent::RadioStateChanged { enabled: true });
        }
        Ok(())
    }

    // -- discovery ----------------------------------------------------------

    /// Start a discovery session, restarting one that is already running.
    pub fn start_discovery(&self) -> Result<()> {
        let inner = &self.inner;
        check_ready(&*inner.bridge).map_err(|e| inner.reject(e))?;

        let mut machine = inner.machine();
        let state = machine.state;
        match state {
            EngineState::Connecting | EngineState::Printing => {
                drop(machine);
                return Err(inner.reject(EtiquetaError::Busy(
                    "cannot scan while connecting or printing".into(),
                )));
            }
            EngineState::Idle | EngineState::Connected | EngineState::Discovering => {}
        }

        let weak = Arc::downgrade(&self.inner);
        let started = inner
            .discovery
            .start(Box::new(move |session| finish_discovery(&weak, session)));
        match started {
            Ok(()) => {
                machine.state = EngineState::Discovering;
                info!("discovery session started");
                Ok(())
            }
            Err(e) => {
                machine.state = machine.resting_state();
                drop(machine);
                Err(inner.reject(e))
            }
        }
    }

    /// Stop the running discovery session. Idempotent.
    pub fn stop_discovery(&self) {
        let inner = &self.inner;
        let mut machine = inner.machine();
        inner.discovery.stop();
        if machine.state == EngineState::Discovering {
            machine.state = machine.resting_state();
        }
    }

    // -- paired devices -----------------------------------------------------

    /// Devices bonded with this host, or `None` when the radio is unusable
    /// (the reason is reported on the event stream).
    pub fn list_paired_devices(&self) -> Option<Vec<DeviceRecord>> {
        self.paired_devices().ok()
    }

    /// Like [`list_paired_devices`](Self::list_paired_devices), but hands the
    /// reason back as well as reporting it.
    pub fn paired_devices(&self) -> Result<Vec<DeviceRecord>> {
        let inner = &self.inner;
        check_ready(&*inner.bridge).map_err(|e| inner.reject(e))?;
        inner.bridge.bonded_devices().map_err(|e| inner.reject(e))
    }

    /// Resolve an address, as picked from a list, to its bonded record.
    pub fn find_paired_device(&self, address: &str) -> Option<DeviceRecord> {
        self.list_paired_devices()?
            .into_iter()
            .find(|d| d.address.eq_ignore_ascii_case(address))
    }

    // -- connection ---------------------------------------------------------

    /// Connect to `device` in the background, superseding any attempt in
    /// flight and replacing any open link.
    #[instrument(skip_all, fields(address = %device.address))]
    pub fn connect(&self, device: DeviceRecord) -> Result<OperationHandle> {
        let inner = &self.inner;
        check_ready(&*inner.bridge).map_err(|e| inner.reject(e))?;

        let attempt = {
            let mut machine = inner.machine();
            if machine.state == EngineState::Printing {
                drop(machine);
                return Err(inner.reject(EtiquetaError::Busy(
                    "a print job is in progress".into(),
                )));
            }
            inner.discovery.stop();
            let attempt = inner.transport.begin_attempt();
            machine.attempt = attempt;
            machine.state = EngineState::Connecting;
            attempt
        };
        info!(attempt, "connecting");

        let engine = Arc::clone(&self.inner);
        let handle = inner.runtime.spawn(async move {
            let result = engine.transport.connect(device.clone(), attempt).await;

            let mut machine = engine.machine();
            if machine.attempt != attempt {
                debug!(attempt, "connect finished after being superseded");
            } else {
                machine.attempt = 0;
                match &result {
                    Ok(ConnectOutcome::Connected) => {
                        machine.state = EngineState::Connected;
                        machine.device = Some(device);
                    }
                    Ok(ConnectOutcome::Superseded) | Err(_) => {
                        machine.state = EngineState::Idle;
                        machine.device = None;
                    }
                }
            }
            drop(machine);

            match result? {
                ConnectOutcome::Connected => Ok(()),
                ConnectOutcome::Superseded => Err(EtiquetaError::Connect(
                    "superseded by a newer connection attempt".into(),
                )),
            }
        });
        Ok(OperationHandle { handle })
    }

    /// Encode `job` and send it over the open link in the background.
    ///
    /// Rejected synchronously, with nothing scheduled, when there is no open
    /// link, another operation is in flight, the label is empty, or the job
    /// cannot be encoded.
    #[instrument(skip_all, fields(label_len = job.label_text.len()))]
    pub fn print(&self, job: PrintJob) -> Result<OperationHandle> {
        let inner = &self.inner;
        let mut machine = inner.machine();
        let state = machine.state;

        match state {
            EngineState::Printing | EngineState::Connecting => {
                drop(machine);
                return Err(inner.reject(EtiquetaError::Busy(
                    "another operation is in progress".into(),
                )));
            }
            _ if machine.device.is_none() => {
                drop(machine);
                return Err(inner.reject(EtiquetaError::NotConnected));
            }
            EngineState::Discovering => {
                drop(machine);
                return Err(inner.reject(EtiquetaError::Busy(
                    "stop discovery before printing".into(),
                )));
            }
            EngineState::Idle | EngineState::Connected => {}
        }

        if !job.has_label() {
            drop(machine);
            return Err(inner.reject(EtiquetaError::EmptyLabel));
        }
        let command = encoder::encode(&job, inner.config.dialect, &inner.config.label)
            .map_err(|e| inner.reject(e))?;
        machine.state = EngineState::Printing;
        drop(machine);
        info!(bytes = command.len(), "printing");

        let engine = Arc::clone(&self.inner);
        let handle = inner.runtime.spawn(async move {
            let result = engine.transport.write(command.into_bytes()).await;

            let mut machine = engine.machine();
            if machine.state == EngineState::Printing {
                if result.is_ok() {
                    machine.state = EngineState::Connected;
                } else {
                    machine.state = EngineState::Idle;
                    machine.device = None;
                }
            }
            drop(machine);
            result
        });
        Ok(OperationHandle { handle })
    }

    /// Close the link and return to `Idle`. Waits for an outstanding
    /// connect or print to finish first. Safe to call at any time.
    pub async fn close(&self) {
        let inner = &self.inner;
        {
            let mut machine = inner.machine();
            inner.discovery.stop();
            inner.transport.invalidate();
            machine.attempt = 0;
            machine.state = EngineState::Idle;
            machine.device = None;
        }
        inner.transport.close().await;
    }

    /// Stop discovery and close the link. For process teardown.
    pub async fn shutdown(&self) {
        info!("shutting down printer engine");
        self.close().await;
    }
}

/// Discovery session `session` ran to completion: settle back into the
/// resting state, unless a newer session took over in the meantime.
///
/// Sessions start and stop only under the machine lock, so the running
/// session id read here is stable until the lock is released.
fn finish_discovery(inner: &Weak<Inner>, session: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut machine = inner.machine();
    if let Some(running) = inner.discovery.session_id() {
        debug!(session, running, "stale discovery finish; newer session is running");
        return;
    }
    if machine.state == EngineState::Discovering {
        machine.state = machine.resting_state();
        debug!(state = ?machine.state, "discovery finished");
    } else {
        warn!(state = ?machine.state, "discovery finished outside the discovering state");
    }
}
