// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Automatic PIN entry for the connect attempt in flight.
//
// Armed only while connecting to an unbonded printer. Prompts for that
// address get the configured PIN and the system dialog is suppressed;
// prompts for any other address are left to the platform.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use etiqueta_bridge::traits::{PairingHandler, PairingReply, PairingRequest, PlatformBridge};
use etiqueta_core::error::{EtiquetaError, Result};
use tracing::{debug, info, warn};

/// Answers pairing prompts for exactly one address.
#[derive(Debug)]
pub struct PinResponder {
    address: String,
    pin: String,
}

impl PinResponder {
    pub fn new(address: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            pin: pin.into(),
        }
    }
}

impl PairingHandler for PinResponder {
    fn on_pairing_request(&self, request: &PairingRequest) -> PairingReply {
        if request.address != self.address {
            debug!(address = %request.address, "pairing prompt for another device; passing through");
            return PairingReply::PassThrough;
        }
        info!(address = %request.address, "supplying pairing PIN");
        PairingReply::SupplyPin(self.pin.clone())
    }
}

/// Arms and disarms the [`PinResponder`] on the platform's pairing agent.
pub struct PairingHandshake {
    bridge: Arc<dyn PlatformBridge>,
    pin: String,
    armed: AtomicBool,
}

impl PairingHandshake {
    pub fn new(bridge: Arc<dyn PlatformBridge>, pin: impl Into<String>) -> Self {
        Self {
            bridge,
            pin: pin.into(),
            armed: AtomicBool::new(false),
        }
    }

    /// Install the responder for `address`, replacing any previous one.
    pub fn arm(&self, address: &str) -> Result<()> {
        let responder = Arc::new(PinResponder::new(address, self.pin.clone()));
        self.bridge.register_pairing_handler(responder)?;
        self.armed.store(true, Ordering::SeqCst);
        debug!(address, "pairing handshake armed");
        Ok(())
    }

    /// Remove the responder. Safe to call any number of times.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
        match self.bridge.unregister_pairing_handler() {
            Ok(()) => debug!("pairing handshake disarmed"),
            Err(EtiquetaError::NotRegistered) => {}
            Err(e) => warn!(error = %e, "failed to unregister pairing handler"),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etiqueta_bridge::mock::MockBridge;

    const ADDR: &str = "00:11:22:33:44:55";

    #[test]
    fn responder_supplies_pin_for_target_only() {
        let responder = PinResponder::new(ADDR, "1234");
        let own = PairingRequest {
            address: ADDR.into(),
            passkey: None,
        };
        let other = PairingRequest {
            address: "66:77:88:99:AA:BB".into(),
            passkey: Some(123456),
        };
        assert_eq!(
            responder.on_pairing_request(&own),
            PairingReply::SupplyPin("1234".into())
        );
        assert_eq!(responder.on_pairing_request(&other), PairingReply::PassThrough);
    }

    #[test]
    fn arm_then_disarm_twice() {
        let bridge = Arc::new(MockBridge::new());
        let handshake = PairingHandshake::new(bridge.clone(), "0000");

        handshake.arm(ADDR).expect("arm");
        assert!(handshake.is_armed());
        assert!(bridge.handler_registered());
        assert_eq!(
            bridge.raise_pairing_request(ADDR),
            Some(PairingReply::SupplyPin("0000".into()))
        );

        handshake.disarm();
        handshake.disarm();
        assert!(!handshake.is_armed());
        assert!(!bridge.handler_registered());
        assert_eq!(bridge.raise_pairing_request(ADDR), None);
    }
}
