// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for the Bluetooth collaborators the
// printer engine consumes.
//
// All methods are blocking. The engine calls the slow ones (bonding, stream
// open/write/close) from `tokio::task::spawn_blocking`.

use std::sync::Arc;

use etiqueta_core::error::Result;
use etiqueta_core::types::{BondState, DeviceRecord};
use uuid::Uuid;

/// Unified bridge that groups every platform capability the engine needs.
pub trait PlatformBridge:
    RadioAdapter + PermissionCheck + DeviceScanner + BondedDevices + SerialConnector + PairingAgent
{
    /// Human-readable platform name (e.g. "Android 14", "Linux (BlueZ RFCOMM)").
    fn platform_name(&self) -> &str;
}

/// The local Bluetooth adapter.
pub trait RadioAdapter: Send + Sync {
    /// Whether the device has a Bluetooth adapter at all.
    fn is_present(&self) -> bool;

    /// Whether the adapter is present and switched on.
    fn is_enabled(&self) -> bool;

    /// Ask the platform to show its "turn Bluetooth on" prompt.
    fn request_enable(&self) -> Result<()>;
}

/// Runtime permission state (scan + connect, or the legacy location trio).
pub trait PermissionCheck: Send + Sync {
    fn has_permissions(&self) -> bool;
}

/// Event produced by a platform scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A device answered the inquiry. May repeat for the same address.
    DeviceFound(DeviceRecord),
    /// The inquiry ran to completion.
    Finished,
}

/// Receives scan events. Invoked from a platform thread.
pub type ScanCallback = Arc<dyn Fn(ScanEvent) + Send + Sync>;

/// Inquiry scan for nearby devices.
pub trait DeviceScanner: Send + Sync {
    /// Start a scan, delivering events to `on_event` until it finishes or is
    /// cancelled. Replaces any previously registered callback.
    fn start_scan(&self, on_event: ScanCallback) -> Result<()>;

    /// Cancel the running scan and drop the callback. Safe when idle.
    fn cancel_scan(&self);
}

/// Devices already bonded with this host.
pub trait BondedDevices: Send + Sync {
    fn bonded_devices(&self) -> Result<Vec<DeviceRecord>>;
}

/// An open serial byte stream to one device.
pub trait SerialLink: Send {
    /// Write the whole buffer. A short write is reported as an error.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Close the output side of the stream.
    fn close_output(&mut self) -> Result<()>;

    /// Close the underlying socket/port.
    fn close(&mut self) -> Result<()>;
}

/// Opens serial streams keyed by a service record UUID.
pub trait SerialConnector: Send + Sync {
    /// Start bonding with `device`. Returns once the platform accepted the
    /// request; completion shows up through [`PairingAgent::bond_state`].
    fn create_bond(&self, device: &DeviceRecord) -> Result<()>;

    /// Open a stream to `device` on the given service. Blocks until the link
    /// is up or fails.
    fn open_stream(&self, device: &DeviceRecord, service: Uuid) -> Result<Box<dyn SerialLink>>;
}

/// An in-band pairing prompt raised by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRequest {
    /// Address of the device asking to pair.
    pub address: String,
    /// Passkey shown by the platform for confirmation variants, if any.
    pub passkey: Option<u32>,
}

/// What to do with a pairing prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingReply {
    /// Supply this PIN and stop the system dialog from appearing.
    SupplyPin(String),
    /// Let the platform handle the prompt normally.
    PassThrough,
}

/// Handles pairing prompts on behalf of the user.
pub trait PairingHandler: Send + Sync {
    fn on_pairing_request(&self, request: &PairingRequest) -> PairingReply;
}

/// Pairing-request interception and bond-state queries.
pub trait PairingAgent: Send + Sync {
    /// Install `handler` for pairing prompts. Replaces any previous handler.
    fn register_pairing_handler(&self, handler: Arc<dyn PairingHandler>) -> Result<()>;

    /// Remove the installed handler. Returns
    /// [`EtiquetaError::NotRegistered`](etiqueta_core::EtiquetaError::NotRegistered)
    /// when none is installed.
    fn unregister_pairing_handler(&self) -> Result<()>;

    /// Current bond state of `address` as the platform sees it.
    fn bond_state(&self, address: &str) -> Result<BondState>;
}
