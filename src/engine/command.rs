// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Commands accepted by the engine and their results.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ParseError;
use crate::registry::DeviceId;

/// Reason given when a busy printer is asked to power off.
pub const BUSY_REASON: &str = "can not shutdown printer while it is printing";

/// What a command does.
///
/// # Examples
///
/// ```
/// use noodle_hub::engine::Action;
///
/// assert_eq!("power_off".parse::<Action>().unwrap(), Action::PowerOff);
/// assert_eq!(Action::from(true), Action::PowerOn);
/// assert!("reboot".parse::<Action>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Switch on.
    PowerOn,
    /// Switch off.
    PowerOff,
    /// Flip the current state.
    Toggle,
}

impl Action {
    /// Returns the form value of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerOn => "power_on",
            Self::PowerOff => "power_off",
            Self::Toggle => "toggle",
        }
    }

    /// Resolves the action against the current state.
    #[must_use]
    pub const fn desired(self, current: bool) -> bool {
        match self {
            Self::PowerOn => true,
            Self::PowerOff => false,
            Self::Toggle => !current,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "power_on" => Ok(Self::PowerOn),
            "power_off" => Ok(Self::PowerOff),
            "toggle" => Ok(Self::Toggle),
            _ => Err(ParseError::UnknownAction(s.to_string())),
        }
    }
}

impl From<bool> for Action {
    fn from(on: bool) -> Self {
        if on { Self::PowerOn } else { Self::PowerOff }
    }
}

/// What a command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// A printer (both of its lines).
    Device(DeviceId),
    /// The lighting circuit.
    Light,
}

/// A request to change power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    /// What to act on.
    pub target: Target,
    /// What to do.
    pub action: Action,
}

impl Command {
    /// Creates a command for a printer.
    #[must_use]
    pub const fn device(id: DeviceId, action: Action) -> Self {
        Self {
            target: Target::Device(id),
            action,
        }
    }

    /// Creates a command for the lights.
    #[must_use]
    pub const fn light(action: Action) -> Self {
        Self {
            target: Target::Light,
            action,
        }
    }
}

/// Outcome of a state-changing operation.
///
/// Operations never fail with an error; a refused or failed change comes back
/// as a rejected result with a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChangeResult {
    /// Whether the change was carried out.
    pub accepted: bool,
    /// Human-readable explanation, empty for plain successes.
    pub reason: String,
}

impl StateChangeResult {
    /// Creates an accepted result.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: String::new(),
        }
    }

    /// Creates a rejected result.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for StateChangeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.accepted, self.reason.is_empty()) {
            (true, _) => f.write_str("ok"),
            (false, true) => f.write_str("rejected"),
            (false, false) => write!(f, "rejected: {}", self.reason),
        }
    }
}
