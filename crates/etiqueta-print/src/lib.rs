// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Etiqueta — Printer connection and protocol engine.
//!
//! Discovers Bluetooth serial printers, connects to one (pairing in-band when
//! needed) and sends label jobs encoded as ESC/POS or TSPL.
//!
//! The [`Engine`] is the entry point. Its components, leaves first:
//! [`DeviceRegistry`], [`DiscoverySession`], [`PairingHandshake`],
//! [`TransportConnection`] and the stateless [`encoder`].

pub mod discovery;
pub mod encoder;
pub mod engine;
pub mod events;
pub mod pairing;
pub mod registry;
pub mod transport;

pub use discovery::DiscoverySession;
pub use engine::{Engine, OperationHandle};
pub use events::{EventSink, EventStream};
pub use pairing::{PairingHandshake, PinResponder};
pub use registry::DeviceRegistry;
pub use transport::{ConnectOutcome, TransportConnection};
