// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub bridge for targets without a Bluetooth backend.
//
// The adapter reports itself absent, so the engine turns every operation
// into a precondition failure before reaching the other methods.

use std::sync::Arc;

use etiqueta_core::error::{EtiquetaError, Result};
use etiqueta_core::types::{BondState, DeviceRecord};
use uuid::Uuid;

use crate::traits::*;

/// No-op bridge returned on unsupported platforms.
pub struct StubBridge;

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        "Unsupported (stub)"
    }
}

impl RadioAdapter for StubBridge {
    fn is_present(&self) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn request_enable(&self) -> Result<()> {
        tracing::warn!("RadioAdapter::request_enable called on stub bridge");
        Err(EtiquetaError::PlatformUnavailable)
    }
}

impl PermissionCheck for StubBridge {
    fn has_permissions(&self) -> bool {
        false
    }
}

impl DeviceScanner for StubBridge {
    fn start_scan(&self, _on_event: ScanCallback) -> Result<()> {
        tracing::warn!("DeviceScanner::start_scan called on stub bridge");
        Err(EtiquetaError::PlatformUnavailable)
    }

    fn cancel_scan(&self) {}
}

impl BondedDevices for StubBridge {
    fn bonded_devices(&self) -> Result<Vec<DeviceRecord>> {
        Err(EtiquetaError::PlatformUnavailable)
    }
}

impl SerialConnector for StubBridge {
    fn create_bond(&self, _device: &DeviceRecord) -> Result<()> {
        Err(EtiquetaError::PlatformUnavailable)
    }

    fn open_stream(&self, _device: &DeviceRecord, _service: Uuid) -> Result<Box<dyn SerialLink>> {
        tracing::warn!("SerialConnector::open_stream called on stub bridge");
        Err(EtiquetaError::PlatformUnavailable)
    }
}

impl PairingAgent for StubBridge {
    fn register_pairing_handler(&self, _handler: Arc<dyn PairingHandler>) -> Result<()> {
        Err(EtiquetaError::PlatformUnavailable)
    }

    fn unregister_pairing_handler(&self) -> Result<()> {
        Err(EtiquetaError::NotRegistered)
    }

    fn bond_state(&self, _address: &str) -> Result<BondState> {
        Err(EtiquetaError::PlatformUnavailable)
    }
}
