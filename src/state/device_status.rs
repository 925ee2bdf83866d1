// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-printer mutable status.

use serde::Serialize;

use crate::timer::TimerToken;

/// Observable state of a printer, derived from its status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceState {
    /// No connectivity message has been received yet.
    Unknown,
    /// Connected and safe to power off.
    OnlineIdle,
    /// Connected and printing.
    OnlineBusy,
    /// Disconnected from the bus.
    Offline,
}

impl DeviceState {
    /// Returns a short human-readable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::OnlineIdle => "idle",
            Self::OnlineBusy => "printing",
            Self::Offline => "offline",
        }
    }
}

/// Tracked status of one printer.
///
/// A fresh status is offline, idle and unpowered, with no standby timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    seen: bool,
    online: bool,
    idle: bool,
    powered: bool,
    pending_standby: Option<TimerToken>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            seen: false,
            online: false,
            idle: true,
            powered: false,
            pending_standby: None,
        }
    }
}

impl DeviceStatus {
    /// Creates a status with the given initial power state.
    #[must_use]
    pub fn new(powered: bool) -> Self {
        Self {
            powered,
            ..Self::default()
        }
    }

    /// Returns the last known connectivity.
    #[must_use]
    pub fn online(&self) -> bool {
        self.online
    }

    /// Records a connectivity message.
    pub fn set_online(&mut self, online: bool) {
        self.seen = true;
        self.online = online;
    }

    /// Returns `true` if the printer may be powered off.
    #[must_use]
    pub fn idle(&self) -> bool {
        self.idle
    }

    /// Sets the idle flag.
    pub fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
    }

    /// Returns the last successfully written power state.
    #[must_use]
    pub fn powered(&self) -> bool {
        self.powered
    }

    /// Records a successful power write.
    pub fn set_powered(&mut self, powered: bool) {
        self.powered = powered;
    }

    /// Returns the pending standby timer, if any.
    #[must_use]
    pub fn pending_standby(&self) -> Option<TimerToken> {
        self.pending_standby
    }

    /// Stores a new pending standby timer and returns the one it replaces.
    pub fn replace_standby(&mut self, token: TimerToken) -> Option<TimerToken> {
        self.pending_standby.replace(token)
    }

    /// Clears the pending standby timer and returns it.
    pub fn take_standby(&mut self) -> Option<TimerToken> {
        self.pending_standby.take()
    }

    /// Derives the observable state.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        match (self.seen, self.online, self.idle) {
            (false, _, _) => DeviceState::Unknown,
            (true, false, _) => DeviceState::Offline,
            (true, true, true) => DeviceState::OnlineIdle,
            (true, true, false) => DeviceState::OnlineBusy,
        }
    }
}
