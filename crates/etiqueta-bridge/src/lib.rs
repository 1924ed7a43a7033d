// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Etiqueta — Native Bluetooth bridge abstractions.
//!
//! Defines the platform collaborator traits consumed by the printer engine
//! and picks an implementation for the target operating system. The engine
//! receives the bridge by injection; nothing here is a global singleton.

pub mod traits;

#[cfg(target_os = "linux")]
pub mod desktop;

#[cfg(not(target_os = "linux"))]
pub mod stub;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::sync::Arc;

/// Builds the bridge implementation for the target operating system.
pub fn platform_bridge() -> Arc<dyn traits::PlatformBridge> {
    #[cfg(target_os = "linux")]
    {
        // Linux: BlueZ with RFCOMM TTY bindings (`rfcomm bind`).
        Arc::new(desktop::DesktopBridge::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        // Everything else reports the capability as unavailable.
        Arc::new(stub::StubBridge)
    }
}
