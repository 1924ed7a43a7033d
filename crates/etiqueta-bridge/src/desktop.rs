// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Linux desktop bridge over BlueZ RFCOMM TTY bindings.
//
// The printer must be bound to an RFCOMM device first:
//
//     $ bluetoothctl pair 00:11:62:XX:XX:XX
//     $ sudo rfcomm bind 0 00:11:62:XX:XX:XX 1
//
// which creates `/dev/rfcomm0`. Bound devices are read from
// `/proc/net/rfcomm` and opened through the `serialport` crate. Inquiry
// scanning needs the BlueZ D-Bus API, which this bridge does not speak: a
// "scan" reports the bound devices and then finishes.
//
// Pairing prompts are answered by the BlueZ agent, so a registered handler
// is kept for bookkeeping only.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use etiqueta_core::error::{EtiquetaError, Result};
use etiqueta_core::types::{BondState, DeviceRecord, SPP_UUID};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::traits::*;

const SYSFS_BLUETOOTH: &str = "/sys/class/bluetooth";
const SYSFS_RFKILL: &str = "/sys/class/rfkill";
const PROC_RFCOMM: &str = "/proc/net/rfcomm";

/// Baud rate for the RFCOMM TTY. RFCOMM ignores it but the TTY layer wants one.
const RFCOMM_BAUD: u32 = 115_200;

/// Per-write timeout on the TTY.
const PORT_TIMEOUT: Duration = Duration::from_secs(10);

/// One line of `/proc/net/rfcomm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfcommBinding {
    /// Device node name, e.g. `rfcomm0`.
    pub device: String,
    /// Remote address, upper-case.
    pub address: String,
    pub channel: u8,
}

impl RfcommBinding {
    pub fn device_path(&self) -> String {
        format!("/dev/{}", self.device)
    }
}

/// Parse the kernel RFCOMM table.
///
/// Format: `rfcomm0: 00:11:22:33:44:55 channel 1 clean`. On newer kernels the
/// local adapter address precedes the remote one; the last address-shaped
/// token before `channel` is taken as the remote.
pub fn parse_rfcomm_table(contents: &str) -> Vec<RfcommBinding> {
    contents
        .lines()
        .filter_map(|line| {
            let (device, rest) = line.split_once(':')?;
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            let channel_at = tokens.iter().position(|t| *t == "channel")?;
            let address = tokens[..channel_at]
                .iter()
                .rev()
                .find(|t| etiqueta_core::is_valid_address(t))?;
            let channel = tokens.get(channel_at + 1)?.parse().ok()?;
            Some(RfcommBinding {
                device: device.trim().to_owned(),
                address: address.to_uppercase(),
                channel,
            })
        })
        .collect()
}

/// Parse `Paired: yes|no` out of `bluetoothctl info` output.
fn parse_paired(info: &str) -> Option<bool> {
    info.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Paired:"))
        .map(|value| value.trim() == "yes")
}

/// Linux implementation of the Etiqueta bridge.
pub struct DesktopBridge {
    /// Bumped on every scan start/cancel so a late scan thread goes quiet.
    scan_generation: Arc<AtomicU64>,
    pairing_handler: Mutex<Option<Arc<dyn PairingHandler>>>,
}

impl DesktopBridge {
    pub fn new() -> Self {
        Self {
            scan_generation: Arc::new(AtomicU64::new(0)),
            pairing_handler: Mutex::new(None),
        }
    }

    fn bindings(&self) -> Result<Vec<RfcommBinding>> {
        match fs::read_to_string(PROC_RFCOMM) {
            Ok(contents) => Ok(parse_rfcomm_table(&contents)),
            // No rfcomm module loaded means nothing is bound.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(EtiquetaError::Io(e)),
        }
    }

    fn binding_for(&self, address: &str) -> Result<Option<RfcommBinding>> {
        let wanted = address.to_uppercase();
        Ok(self.bindings()?.into_iter().find(|b| b.address == wanted))
    }

    fn bluetoothctl(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("bluetoothctl")
            .args(args)
            .output()
            .map_err(|e| EtiquetaError::Bridge(format!("failed to run bluetoothctl: {e}")))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for DesktopBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBridge for DesktopBridge {
    fn platform_name(&self) -> &str {
        "Linux (BlueZ RFCOMM)"
    }
}

impl RadioAdapter for DesktopBridge {
    fn is_present(&self) -> bool {
        fs::read_dir(SYSFS_BLUETOOTH)
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| e.file_name().to_string_lossy().starts_with("hci"))
            })
            .unwrap_or(false)
    }

    fn is_enabled(&self) -> bool {
        self.is_present() && !bluetooth_rfkill_blocked(Path::new(SYSFS_RFKILL))
    }

    fn request_enable(&self) -> Result<()> {
        info!("requesting adapter power on");
        let stdout = self.bluetoothctl(&["power", "on"])?;
        if stdout.contains("succeeded") {
            Ok(())
        } else {
            Err(EtiquetaError::Bridge(format!(
                "power on refused: {}",
                stdout.trim()
            )))
        }
    }
}

/// Whether any Bluetooth rfkill switch is soft- or hard-blocked.
fn bluetooth_rfkill_blocked(root: &Path) -> bool {
    let Ok(entries) = fs::read_dir(root) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let dir = entry.path();
        let kind = fs::read_to_string(dir.join("type")).unwrap_or_default();
        if kind.trim() != "bluetooth" {
            return false;
        }
        ["soft", "hard"].iter().any(|flag| {
            fs::read_to_string(dir.join(flag))
                .map(|v| v.trim() == "1")
                .unwrap_or(false)
        })
    })
}

impl PermissionCheck for DesktopBridge {
    /// Desktop access control is file-mode based; a missing `dialout`
    /// membership surfaces as `PermissionDenied` when the port is opened.
    fn has_permissions(&self) -> bool {
        true
    }
}

impl DeviceScanner for DesktopBridge {
    fn start_scan(&self, on_event: ScanCallback) -> Result<()> {
        let generation = self.scan_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.scan_generation);
        let devices = self.bonded_devices()?;

        std::thread::Builder::new()
            .name("rfcomm-scan".into())
            .spawn(move || {
                for device in devices {
                    if current.load(Ordering::SeqCst) != generation {
                        debug!("rfcomm scan cancelled");
                        return;
                    }
                    on_event(ScanEvent::DeviceFound(device));
                }
                if current.load(Ordering::SeqCst) == generation {
                    on_event(ScanEvent::Finished);
                }
            })
            .map_err(|e| EtiquetaError::Bridge(format!("spawn scan thread: {e}")))?;
        Ok(())
    }

    fn cancel_scan(&self) {
        self.scan_generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl BondedDevices for DesktopBridge {
    fn bonded_devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self
            .bindings()?
            .into_iter()
            .map(|b| DeviceRecord::new(b.address, b.device, BondState::Bonded))
            .collect())
    }
}

impl SerialConnector for DesktopBridge {
    fn create_bond(&self, device: &DeviceRecord) -> Result<()> {
        info!(address = %device.address, "pairing via bluetoothctl");
        let stdout = self.bluetoothctl(&["pair", &device.address])?;
        if stdout.contains("Pairing successful") || stdout.contains("AlreadyExists") {
            Ok(())
        } else {
            Err(EtiquetaError::Pairing(stdout.trim().to_owned()))
        }
    }

    fn open_stream(&self, device: &DeviceRecord, service: Uuid) -> Result<Box<dyn SerialLink>> {
        if service != SPP_UUID {
            warn!(%service, "RFCOMM bindings always use the SPP channel; service ignored");
        }
        let binding = self.binding_for(&device.address)?.ok_or_else(|| {
            EtiquetaError::Connect(format!(
                "{} is not bound to an RFCOMM device (run `rfcomm bind`)",
                device.address
            ))
        })?;
        let path = binding.device_path();
        debug!(path = %path, channel = binding.channel, "opening RFCOMM tty");

        let port = serialport::new(&path, RFCOMM_BAUD)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|e| EtiquetaError::Connect(format!("open {path}: {e}")))?;

        info!(address = %device.address, path = %path, "RFCOMM stream open");
        Ok(Box::new(RfcommLink { port: Some(port) }))
    }
}

impl PairingAgent for DesktopBridge {
    fn register_pairing_handler(&self, handler: Arc<dyn PairingHandler>) -> Result<()> {
        *self
            .pairing_handler
            .lock()
            .map_err(|_| EtiquetaError::Bridge("pairing handler lock poisoned".into()))? =
            Some(handler);
        Ok(())
    }

    fn unregister_pairing_handler(&self) -> Result<()> {
        self.pairing_handler
            .lock()
            .map_err(|_| EtiquetaError::Bridge("pairing handler lock poisoned".into()))?
            .take()
            .map(|_| ())
            .ok_or(EtiquetaError::NotRegistered)
    }

    fn bond_state(&self, address: &str) -> Result<BondState> {
        if self.binding_for(address)?.is_some() {
            return Ok(BondState::Bonded);
        }
        let info = self.bluetoothctl(&["info", address])?;
        Ok(match parse_paired(&info) {
            Some(true) => BondState::Bonded,
            _ => BondState::Unbonded,
        })
    }
}

/// An open `/dev/rfcommN` port.
struct RfcommLink {
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl RfcommLink {
    fn port(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| EtiquetaError::Write("port already closed".into()))
    }
}

impl SerialLink for RfcommLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port()?
            .write_all(bytes)
            .map_err(|e| EtiquetaError::Write(e.to_string()))
    }

    fn flush(&mut self) -> Result<()> {
        self.port()?
            .flush()
            .map_err(|e| EtiquetaError::Write(format!("flush: {e}")))
    }

    fn close_output(&mut self) -> Result<()> {
        // A TTY has no half-close; drain what is queued instead.
        match self.port.as_mut() {
            Some(port) => port
                .flush()
                .map_err(|e| EtiquetaError::Close(format!("drain: {e}"))),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the port closes the file descriptor.
        self.port.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classic_rfcomm_table() {
        let table = "rfcomm0: 00:11:62:AA:BB:CC channel 1 clean\n\
                     rfcomm1: 00:11:62:dd:ee:ff channel 3 connected\n";
        let bindings = parse_rfcomm_table(table);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].device, "rfcomm0");
        assert_eq!(bindings[0].address, "00:11:62:AA:BB:CC");
        assert_eq!(bindings[0].channel, 1);
        assert_eq!(bindings[1].address, "00:11:62:DD:EE:FF");
        assert_eq!(bindings[1].device_path(), "/dev/rfcomm1");
    }

    #[test]
    fn parses_table_with_local_address() {
        let table = "rfcomm0: 5C:F3:70:00:00:01 -> 00:11:62:AA:BB:CC channel 1 clean";
        let bindings = parse_rfcomm_table(table);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].address, "00:11:62:AA:BB:CC");
    }

    #[test]
    fn skips_malformed_lines() {
        let table = "garbage\nrfcomm0: not-an-address channel 1\nrfcomm2: 00:11:22:33:44:55 channel x";
        assert!(parse_rfcomm_table(table).is_empty());
    }

    #[test]
    fn paired_flag_from_bluetoothctl_info() {
        let info = "Device 00:11:62:AA:BB:CC (public)\n\tName: PT-260\n\tPaired: yes\n\tTrusted: no";
        assert_eq!(parse_paired(info), Some(true));
        assert_eq!(parse_paired("\tPaired: no"), Some(false));
        assert_eq!(parse_paired("Device not available"), None);
    }

    #[test]
    fn unregister_without_handler_reports_not_registered() {
        let bridge = DesktopBridge::new();
        assert!(matches!(
            bridge.unregister_pairing_handler(),
            Err(EtiquetaError::NotRegistered)
        ));
    }

    #[test]
    fn rfkill_missing_root_is_not_blocked() {
        assert!(!bluetooth_rfkill_blocked(Path::new("/nonexistent/rfkill")));
    }
}
