// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Deduplicating store of devices seen during one discovery session.

use std::collections::HashMap;

use etiqueta_core::types::DeviceRecord;

/// Devices keyed by hardware address. First record wins.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` if its address is new. Returns whether it was stored.
    pub fn register(&mut self, record: DeviceRecord) -> bool {
        if self.devices.contains_key(&record.address) {
            return false;
        }
        self.devices.insert(record.address.clone(), record);
        true
    }

    pub fn lookup(&self, address: &str) -> Option<&DeviceRecord> {
        self.devices.get(address)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
