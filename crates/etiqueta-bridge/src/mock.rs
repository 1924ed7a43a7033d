// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scriptable in-memory bridge for tests and demos.
//
// Radio, permission and bond state are plain flags. Scans are driven by the
// test through `emit_scan`. Bonding raises a pairing prompt against the
// registered handler and succeeds only if it answers with `expected_pin`.
// With `defer_bonding` the prompt is raised only after the bond state has
// been polled a number of times, the way real platforms complete bonds.
// Every opened link records the bytes written to it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use etiqueta_core::error::{EtiquetaError, Result};
use etiqueta_core::types::{BondState, DeviceRecord};
use uuid::Uuid;

use crate::traits::*;

/// Observable state of one opened link.
#[derive(Debug, Default, Clone)]
pub struct LinkRecord {
    pub address: String,
    pub service: Uuid,
    pub written: Vec<u8>,
    pub flushes: usize,
    pub output_closed: bool,
    pub closed: bool,
}

#[derive(Default)]
struct MockState {
    present: bool,
    enabled: bool,
    permissions: bool,
    enable_requests: usize,
    bonded: Vec<DeviceRecord>,
    bond_states: HashMap<String, BondState>,
    bond_requests: Vec<String>,
    expected_pin: String,
    bond_polls: Option<usize>,
    pending_bonds: HashMap<String, (DeviceRecord, usize)>,
    pairing_replies: Vec<PairingReply>,
    pairing_handler: Option<Arc<dyn PairingHandler>>,
    scan_callback: Option<ScanCallback>,
    scans_started: usize,
    scans_cancelled: usize,
    open_failures: HashMap<String, String>,
    open_delays: HashMap<String, Duration>,
    write_failure: Option<String>,
    write_delay: Option<Duration>,
    close_failure: Option<String>,
    links: Vec<Arc<Mutex<LinkRecord>>>,
}

/// In-memory [`PlatformBridge`].
pub struct MockBridge {
    state: Mutex<MockState>,
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBridge {
    /// A ready platform: adapter present and enabled, permissions granted.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                present: true,
                enabled: true,
                permissions: true,
                expected_pin: "0000".into(),
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock poisoned")
    }

    // -- scripting ----------------------------------------------------------

    pub fn set_present(&self, present: bool) {
        self.state().present = present;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state().enabled = enabled;
    }

    pub fn set_permissions(&self, granted: bool) {
        self.state().permissions = granted;
    }

    /// Add a device to the bonded list and mark it bonded.
    pub fn add_bonded(&self, device: DeviceRecord) {
        let mut state = self.state();
        state
            .bond_states
            .insert(device.address.clone(), BondState::Bonded);
        state.bonded.push(device);
    }

    /// PIN the simulated printer accepts during bonding.
    pub fn set_expected_pin(&self, pin: &str) {
        self.state().expected_pin = pin.to_owned();
    }

    /// Make `create_bond` return at once with the device in `Bonding`. The
    /// bond settles on the `polls`-th following `bond_state` query.
    pub fn defer_bonding(&self, polls: usize) {
        self.state().bond_polls = Some(polls);
    }

    pub fn fail_open(&self, address: &str, reason: &str) {
        self.state()
            .open_failures
            .insert(address.to_owned(), reason.to_owned());
    }

    pub fn delay_open(&self, address: &str, delay: Duration) {
        self.state()
            .open_delays
            .insert(address.to_owned(), delay);
    }

    /// Make every write fail after half the buffer went out.
    pub fn fail_writes(&self, reason: &str) {
        self.state().write_failure = Some(reason.to_owned());
    }

    pub fn delay_writes(&self, delay: Duration) {
        self.state().write_delay = Some(delay);
    }

    pub fn fail_close(&self, reason: &str) {
        self.state().close_failure = Some(reason.to_owned());
    }

    /// Deliver a scan event to the registered callback, if any.
    /// Returns whether a callback was registered.
    pub fn emit_scan(&self, event: ScanEvent) -> bool {
        let callback = self.state().scan_callback.clone();
        match callback {
            Some(cb) => {
                cb(event);
                true
            }
            None => false,
        }
    }

    /// Raise a pairing prompt as the platform would.
    pub fn raise_pairing_request(&self, address: &str) -> Option<PairingReply> {
        let handler = self.state().pairing_handler.clone()?;
        let reply = handler.on_pairing_request(&PairingRequest {
            address: address.to_owned(),
            passkey: None,
        });
        self.state().pairing_replies.push(reply.clone());
        Some(reply)
    }

    // -- observation --------------------------------------------------------

    pub fn scans_started(&self) -> usize {
        self.state().scans_started
    }

    pub fn scans_cancelled(&self) -> usize {
        self.state().scans_cancelled
    }

    pub fn scan_active(&self) -> bool {
        self.state().scan_callback.is_some()
    }

    pub fn enable_requests(&self) -> usize {
        self.state().enable_requests
    }

    pub fn bond_requests(&self) -> Vec<String> {
        self.state().bond_requests.clone()
    }

    pub fn pairing_replies(&self) -> Vec<PairingReply> {
        self.state().pairing_replies.clone()
    }

    pub fn handler_registered(&self) -> bool {
        self.state().pairing_handler.is_some()
    }

    /// Snapshot of every link opened so far, oldest first.
    pub fn links(&self) -> Vec<LinkRecord> {
        self.state()
            .links
            .iter()
            .map(|l| l.lock().expect("link lock poisoned").clone())
            .collect()
    }

    /// Links that were opened and not yet closed.
    pub fn open_links(&self) -> Vec<LinkRecord> {
        self.links().into_iter().filter(|l| !l.closed).collect()
    }

    /// Distinct addresses with a live link.
    pub fn connected_addresses(&self) -> HashSet<String> {
        self.open_links().into_iter().map(|l| l.address).collect()
    }
}

impl PlatformBridge for MockBridge {
    fn platform_name(&self) -> &str {
        "Mock"
    }
}

impl RadioAdapter for MockBridge {
    fn is_present(&self) -> bool {
        self.state().present
    }

    fn is_enabled(&self) -> bool {
        let state = self.state();
        state.present && state.enabled
    }

    fn request_enable(&self) -> Result<()> {
        let mut state = self.state();
        if !state.present {
            return Err(EtiquetaError::AdapterMissing);
        }
        state.enable_requests += 1;
        state.enabled = true;
        Ok(())
    }
}

impl PermissionCheck for MockBridge {
    fn has_permissions(&self) -> bool {
        self.state().permissions
    }
}

impl DeviceScanner for MockBridge {
    fn start_scan(&self, on_event: ScanCallback) -> Result<()> {
        let mut state = self.state();
        state.scans_started += 1;
        state.scan_callback = Some(on_event);
        Ok(())
    }

    fn cancel_scan(&self) {
        let mut state = self.state();
        state.scans_cancelled += 1;
        state.scan_callback = None;
    }
}

impl BondedDevices for MockBridge {
    fn bonded_devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.state().bonded.clone())
    }
}

impl MockBridge {
    /// Raise the pairing prompt and settle the bond on its answer.
    fn complete_bond(&self, device: &DeviceRecord) -> Result<()> {
        let reply = self.raise_pairing_request(&device.address);
        let expected = self.state().expected_pin.clone();
        let accepted = matches!(reply, Some(PairingReply::SupplyPin(ref pin)) if *pin == expected);

        let mut state = self.state();
        if accepted {
            state
                .bond_states
                .insert(device.address.clone(), BondState::Bonded);
            let mut bonded = device.clone();
            bonded.bond_state = BondState::Bonded;
            state.bonded.push(bonded);
            Ok(())
        } else {
            state
                .bond_states
                .insert(device.address.clone(), BondState::Unbonded);
            Err(EtiquetaError::Pairing(format!(
                "{} rejected the pairing credential",
                device.address
            )))
        }
    }
}

impl SerialConnector for MockBridge {
    fn create_bond(&self, device: &DeviceRecord) -> Result<()> {
        {
            let mut state = self.state();
            state.bond_requests.push(device.address.clone());
            state
                .bond_states
                .insert(device.address.clone(), BondState::Bonding);
            if let Some(polls) = state.bond_polls {
                state
                    .pending_bonds
                    .insert(device.address.clone(), (device.clone(), polls));
                return Ok(());
            }
        }
        self.complete_bond(device)
    }

    fn open_stream(&self, device: &DeviceRecord, service: Uuid) -> Result<Box<dyn SerialLink>> {
        let delay = self.state().open_delays.get(&device.address).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state();
        if let Some(reason) = state.open_failures.get(&device.address) {
            return Err(EtiquetaError::Connect(reason.clone()));
        }
        if state.bond_states.get(&device.address) != Some(&BondState::Bonded) {
            return Err(EtiquetaError::Connect(format!(
                "{} is not bonded",
                device.address
            )));
        }

        let record = Arc::new(Mutex::new(LinkRecord {
            address: device.address.clone(),
            service,
            ..LinkRecord::default()
        }));
        state.links.push(Arc::clone(&record));
        Ok(Box::new(MockLink {
            record,
            write_failure: state.write_failure.clone(),
            write_delay: state.write_delay,
            close_failure: state.close_failure.clone(),
        }))
    }
}

impl PairingAgent for MockBridge {
    fn register_pairing_handler(&self, handler: Arc<dyn PairingHandler>) -> Result<()> {
        self.state().pairing_handler = Some(handler);
        Ok(())
    }

    fn unregister_pairing_handler(&self) -> Result<()> {
        self.state()
            .pairing_handler
            .take()
            .map(|_| ())
            .ok_or(EtiquetaError::NotRegistered)
    }

    fn bond_state(&self, address: &str) -> Result<BondState> {
        let due = {
            let mut state = self.state();
            match state.pending_bonds.remove(address) {
                Some((device, 0)) => Some(device),
                Some((device, left)) => {
                    state
                        .pending_bonds
                        .insert(address.to_owned(), (device, left - 1));
                    None
                }
                None => None,
            }
        };
        if let Some(device) = due {
            let _ = self.complete_bond(&device);
        }

        Ok(self
            .state()
            .bond_states
            .get(address)
            .copied()
            .unwrap_or(BondState::Unbonded))
    }
}

struct MockLink {
    record: Arc<Mutex<LinkRecord>>,
    write_failure: Option<String>,
    write_delay: Option<Duration>,
    close_failure: Option<String>,
}

impl MockLink {
    fn record(&self) -> MutexGuard<'_, LinkRecord> {
        self.record.lock().expect("link lock poisoned")
    }
}

impl SerialLink for MockLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }
        if self.record().closed {
            return Err(EtiquetaError::Write("link closed".into()));
        }
        match &self.write_failure {
            Some(reason) => {
                let half = bytes.len() / 2;
                self.record().written.extend_from_slice(&bytes[..half]);
                Err(EtiquetaError::Write(reason.clone()))
            }
            None => {
                self.record().written.extend_from_slice(bytes);
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.record().flushes += 1;
        Ok(())
    }

    fn close_output(&mut self) -> Result<()> {
        self.record().output_closed = true;
        match &self.close_failure {
            Some(reason) => Err(EtiquetaError::Close(reason.clone())),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.record().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPin(&'static str);

    impl PairingHandler for FixedPin {
        fn on_pairing_request(&self, _request: &PairingRequest) -> PairingReply {
            PairingReply::SupplyPin(self.0.into())
        }
    }

    #[test]
    fn bonding_succeeds_with_expected_pin() {
        let bridge = MockBridge::new();
        let device = DeviceRecord::new("00:11:22:33:44:55", "PT-260", BondState::Unbonded);
        bridge
            .register_pairing_handler(Arc::new(FixedPin("0000")))
            .expect("register");
        bridge.create_bond(&device).expect("bond");
        assert_eq!(
            bridge.bond_state(&device.address).expect("state"),
            BondState::Bonded
        );
    }

    #[test]
    fn deferred_bond_settles_after_polls() {
        let bridge = MockBridge::new();
        bridge.defer_bonding(2);
        let device = DeviceRecord::new("00:11:22:33:44:55", "PT-260", BondState::Unbonded);
        bridge
            .register_pairing_handler(Arc::new(FixedPin("0000")))
            .expect("register");
        bridge.create_bond(&device).expect("accepted");

        assert!(bridge.pairing_replies().is_empty());
        assert_eq!(bridge.bond_state(&device.address).expect("state"), BondState::Bonding);
        assert_eq!(bridge.bond_state(&device.address).expect("state"), BondState::Bonding);
        assert_eq!(bridge.bond_state(&device.address).expect("state"), BondState::Bonded);
        assert_eq!(bridge.pairing_replies().len(), 1);
    }

    #[test]
    fn bonding_fails_without_handler() {
        let bridge = MockBridge::new();
        let device = DeviceRecord::new("00:11:22:33:44:55", "", BondState::Unbonded);
        assert!(bridge.create_bond(&device).is_err());
        assert_eq!(
            bridge.bond_state(&device.address).expect("state"),
            BondState::Unbonded
        );
    }

    #[test]
    fn failing_write_records_partial_bytes() {
        let bridge = MockBridge::new();
        let device = DeviceRecord::new("00:11:22:33:44:55", "", BondState::Bonded);
        bridge.add_bonded(device.clone());
        bridge.fail_writes("broken pipe");
        let mut link = bridge
            .open_stream(&device, etiqueta_core::SPP_UUID)
            .expect("open");
        assert!(link.write_all(&[1, 2, 3, 4]).is_err());
        assert_eq!(bridge.links()[0].written, vec![1, 2]);
    }

    #[test]
    fn double_unregister_reports_not_registered() {
        let bridge = MockBridge::new();
        bridge
            .register_pairing_handler(Arc::new(FixedPin("0000")))
            .expect("register");
        assert!(bridge.unregister_pairing_handler().is_ok());
        assert!(matches!(
            bridge.unregister_pairing_handler(),
            Err(EtiquetaError::NotRegistered)
        ));
    }
}
