// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EtiquetaError, Result};
use crate::types::{Dialect, SPP_UUID};

/// Physical label layout used by the TSPL encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelGeometry {
    /// Label width in millimetres (`SIZE`).
    pub width_mm: u32,
    /// Label height in millimetres (`SIZE`).
    pub height_mm: u32,
    /// Gap between labels in millimetres (`GAP`).
    pub gap_mm: u32,
    /// Horizontal offset of every text line, in dots.
    pub x_dots: u32,
    /// Built-in printer font name passed to `TEXT`.
    pub font: String,
}

impl Default for LabelGeometry {
    fn default() -> Self {
        Self {
            width_mm: 50,
            height_mm: 30,
            gap_mm: 2,
            x_dots: 10,
            font: "3".into(),
        }
    }
}

/// Engine settings. Loaded from JSON by front ends; the engine itself never
/// persists anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// PIN supplied automatically when an unbonded printer asks to pair.
    pub pairing_pin: String,
    /// Service record requested when opening the serial channel.
    pub service_uuid: Uuid,
    /// Command language spoken by the target printer.
    pub dialect: Dialect,
    /// Label layout for the TSPL dialect.
    pub label: LabelGeometry,
    /// Deadline for bonding plus opening the stream.
    pub connect_timeout_secs: u64,
    /// Deadline for writing and flushing one job.
    pub write_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pairing_pin: "0000".into(),
            service_uuid: SPP_UUID,
            dialect: Dialect::EscPos,
            label: LabelGeometry::default(),
            connect_timeout_secs: 15,
            write_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pairing_pin.is_empty() || !self.pairing_pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(EtiquetaError::Config(format!(
                "pairing_pin must be numeric, got '{}'",
                self.pairing_pin
            )));
        }
        if self.connect_timeout_secs == 0 || self.write_timeout_secs == 0 {
            return Err(EtiquetaError::Config("timeouts must be non-zero".into()));
        }
        if self.label.width_mm == 0 || self.label.height_mm == 0 {
            return Err(EtiquetaError::Config("label size must be non-zero".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_printer() {
        let config = EngineConfig::default();
        assert_eq!(config.pairing_pin, "0000");
        assert_eq!(config.service_uuid, SPP_UUID);
        assert_eq!(config.dialect, Dialect::EscPos);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_numeric_pin() {
        let config = EngineConfig {
            pairing_pin: "12a4".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EtiquetaError::Config(_))));
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = EngineConfig {
            write_timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("etiqueta.json");
        let config = EngineConfig {
            pairing_pin: "1234".into(),
            dialect: Dialect::Tspl,
            ..EngineConfig::default()
        };
        config.save(&path).expect("save");
        let loaded = EngineConfig::load(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "dialect": "tspl" }"#).expect("write");
        let loaded = EngineConfig::load(&path).expect("load");
        assert_eq!(loaded.dialect, Dialect::Tspl);
        assert_eq!(loaded.pairing_pin, "0000");
    }
}
