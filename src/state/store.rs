// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Owner of all printer statuses and the light state.

use crate::registry::{DeviceId, Registry};

use super::{DeviceSnapshot, DeviceStatus, Snapshot};

/// Status of every printer, indexed by [`DeviceId`], plus the light state.
///
/// The store itself is not synchronized; the engine keeps it behind its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    devices: Vec<DeviceStatus>,
    light: bool,
}

impl StateStore {
    /// Creates the store for every printer in the registry.
    ///
    /// Initial power and light states follow the configured defaults.
    #[must_use]
    pub fn new(registry: &Registry) -> Self {
        Self {
            devices: registry
                .devices()
                .iter()
                .map(|d| DeviceStatus::new(d.default_power_state().unwrap_or(false)))
                .collect(),
            light: registry.light().default_state(),
        }
    }

    /// Returns the status of a printer.
    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<&DeviceStatus> {
        self.devices.get(id.index())
    }

    /// Returns the status of a printer for mutation.
    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut DeviceStatus> {
        self.devices.get_mut(id.index())
    }

    /// Returns the light state.
    #[must_use]
    pub fn light(&self) -> bool {
        self.light
    }

    /// Records a successful light write.
    pub fn set_light(&mut self, on: bool) {
        self.light = on;
    }

    /// Returns the number of printers currently online.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.devices.iter().filter(|s| s.online()).count()
    }

    /// Copies the current state for rendering.
    #[must_use]
    pub fn snapshot(&self, registry: &Registry) -> Snapshot {
        let devices = registry
            .devices()
            .iter()
            .zip(&self.devices)
            .map(|(device, status)| DeviceSnapshot {
                name: device.name().to_string(),
                online: status.online(),
                idle: status.idle(),
                powered: status.powered(),
                standby_pending: status.pending_standby().is_some(),
                state: status.state(),
            })
            .collect();

        Snapshot {
            devices,
            light: self.light,
        }
    }
}
