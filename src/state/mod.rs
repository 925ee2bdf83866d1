// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Printer and light state.
//!
//! The [`StateStore`] owns one [`DeviceStatus`] per registered printer and the
//! light state. Only the standby engine mutates it; everyone else reads a
//! [`Snapshot`].

mod device_status;
mod store;

use serde::Serialize;

pub use device_status::{DeviceState, DeviceStatus};
pub use store::StateStore;

/// Point-in-time view of one printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    /// Printer name.
    pub name: String,
    /// Last known connectivity.
    pub online: bool,
    /// Whether the printer may be powered off.
    pub idle: bool,
    /// Last successfully written power state.
    pub powered: bool,
    /// Whether a standby power-off is scheduled.
    pub standby_pending: bool,
    /// Derived state.
    pub state: DeviceState,
}

/// Point-in-time view of the whole hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Printers in configuration order.
    pub devices: Vec<DeviceSnapshot>,
    /// Light state.
    pub light: bool,
}

impl Snapshot {
    /// Returns the view of the printer with the given name.
    #[must_use]
    pub fn device(&self, name: &str) -> Option<&DeviceSnapshot> {
        self.devices.iter().find(|d| d.name == name)
    }
}
