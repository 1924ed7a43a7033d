// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Etiqueta — Core types, error taxonomy and engine configuration shared by
// the bridge, print and CLI crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod types;

pub use config::{EngineConfig, LabelGeometry};
pub use error::{ErrorKind, EtiquetaError};
pub use types::*;
