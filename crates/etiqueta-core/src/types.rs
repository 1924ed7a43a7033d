// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Etiqueta printer engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, EtiquetaError};

/// Bluetooth Serial Port Profile service class UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5F9B_34FB);

/// Pairing trust state of a peer device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondState {
    Unbonded,
    Bonding,
    Bonded,
}

/// Identity of a discoverable or paired peer.
///
/// An immutable snapshot taken when the platform reported the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Hardware address, e.g. `00:11:22:33:44:55`. Unique per device.
    pub address: String,
    /// Human-readable name. May be empty.
    pub display_name: String,
    pub bond_state: BondState,
}

impl DeviceRecord {
    pub fn new(
        address: impl Into<String>,
        display_name: impl Into<String>,
        bond_state: BondState,
    ) -> Self {
        Self {
            address: address.into(),
            display_name: display_name.into(),
            bond_state,
        }
    }

    /// Name for list rows: the display name, or the address when unnamed.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.address
        } else {
            &self.display_name
        }
    }

    pub fn is_bonded(&self) -> bool {
        self.bond_state == BondState::Bonded
    }
}

/// Validate a Bluetooth MAC address (`XX:XX:XX:XX:XX:XX`, hex, any case).
pub fn is_valid_address(address: &str) -> bool {
    let parts: Vec<&str> = address.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Printer command language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Binary escape-code protocol (ESC/POS).
    #[default]
    EscPos,
    /// Line-oriented label script (TSPL).
    Tspl,
}

impl Dialect {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::EscPos => "ESC/POS",
            Self::Tspl => "TSPL",
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = EtiquetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "escpos" | "esc/pos" | "binary" => Ok(Self::EscPos),
            "tspl" | "text" => Ok(Self::Tspl),
            other => Err(EtiquetaError::Config(format!("unknown dialect '{other}'"))),
        }
    }
}

/// A label to print: text plus an optional barcode payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJob {
    pub label_text: String,
    pub barcode_text: Option<String>,
}

impl PrintJob {
    pub fn new(label_text: impl Into<String>) -> Self {
        Self {
            label_text: label_text.into(),
            barcode_text: None,
        }
    }

    /// Attach a barcode. Blank payloads are treated as "no barcode".
    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        let barcode = barcode.into();
        self.barcode_text = if barcode.trim().is_empty() {
            None
        } else {
            Some(barcode)
        };
        self
    }

    /// Whether the job carries printable label text.
    pub fn has_label(&self) -> bool {
        !self.label_text.trim().is_empty()
    }
}

/// Encoded printer command stream. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCommand {
    dialect: Dialect,
    bytes: Vec<u8>,
}

impl EncodedCommand {
    pub fn new(dialect: Dialect, bytes: Vec<u8>) -> Self {
        Self { dialect, bytes }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Notifications delivered to the UI, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterEvent {
    RadioStateChanged {
        enabled: bool,
    },
    DeviceDiscovered(DeviceRecord),
    ConnectionStateChanged {
        connected: bool,
        device: Option<DeviceRecord>,
    },
    PrintSucceeded,
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl PrinterEvent {
    pub fn error(err: &EtiquetaError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn disconnected() -> Self {
        Self::ConnectionStateChanged {
            connected: false,
            device: None,
        }
    }
}

/// Lifecycle states of the printer engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Discovering,
    Connecting,
    Connected,
    /// Transient sub-state of `Connected` while a job is on the wire.
    Printing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spp_uuid_matches_well_known_value() {
        assert_eq!(
            SPP_UUID.to_string().to_uppercase(),
            "00001101-0000-1000-8000-00805F9B34FB"
        );
    }

    #[test]
    fn valid_addresses() {
        assert!(is_valid_address("00:11:22:33:44:55"));
        assert!(is_valid_address("aa:bb:cc:dd:ee:ff"));
        assert!(!is_valid_address("00:11:22:33:44"));
        assert!(!is_valid_address("00-11-22-33-44-55"));
        assert!(!is_valid_address("GG:HH:II:JJ:KK:LL"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn label_falls_back_to_address() {
        let named = DeviceRecord::new("00:11:22:33:44:55", "PT-260", BondState::Bonded);
        let unnamed = DeviceRecord::new("00:11:22:33:44:66", "", BondState::Unbonded);
        assert_eq!(named.label(), "PT-260");
        assert_eq!(unnamed.label(), "00:11:22:33:44:66");
    }

    #[test]
    fn blank_barcode_is_dropped() {
        let job = PrintJob::new("HELLO").with_barcode("   ");
        assert!(job.barcode_text.is_none());
        let job = PrintJob::new("HELLO").with_barcode("12");
        assert_eq!(job.barcode_text.as_deref(), Some("12"));
    }

    #[test]
    fn dialect_parses_aliases() {
        assert_eq!("tspl".parse::<Dialect>().unwrap(), Dialect::Tspl);
        assert_eq!("ESCPOS".parse::<Dialect>().unwrap(), Dialect::EscPos);
        assert!("zpl".parse::<Dialect>().is_err());
    }
}
