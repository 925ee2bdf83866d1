// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPIO output lines.
//!
//! The engine drives every relay through the [`PowerLine`] trait. Two
//! implementations are provided:
//!
//! - [`SysfsLine`]: a line exported through the Linux sysfs GPIO interface
//! - [`MemoryLine`]: an in-memory line for dry runs and tests
//!
//! Lines speak electrical levels. The mapping from a logical "on" to a level is
//! the [`Polarity`] of the installation; relay boards are commonly active-low.

mod memory;
mod sysfs;

use serde::{Deserialize, Serialize};

pub use memory::{MemoryLine, MemoryLineProvider};
pub use sysfs::{SysfsLine, SysfsLineProvider};

use crate::error::GpioError;

/// A binary output line.
pub trait PowerLine: Send + std::fmt::Debug {
    /// Returns the GPIO number of this line.
    fn number(&self) -> u32;

    /// Drives the line to the given electrical level.
    ///
    /// # Errors
    ///
    /// Returns error if the hardware write fails.
    fn set(&mut self, level: bool) -> Result<(), GpioError>;
}

/// Electrical polarity of the output lines.
///
/// # Examples
///
/// ```
/// use noodle_hub::gpio::Polarity;
///
/// assert!(!Polarity::ActiveLow.level(true));
/// assert!(Polarity::ActiveHigh.level(true));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    /// A low level switches the load on.
    #[default]
    ActiveLow,
    /// A high level switches the load on.
    ActiveHigh,
}

impl Polarity {
    /// Returns the electrical level that puts the load in the given state.
    #[must_use]
    pub const fn level(self, on: bool) -> bool {
        match self {
            Self::ActiveLow => !on,
            Self::ActiveHigh => on,
        }
    }
}

/// Opens output lines for the hub.
///
/// The binary chooses between real sysfs lines and in-memory lines with this
/// trait so the rest of the wiring stays the same.
pub trait LineProvider {
    /// Requests the given GPIO number as an output line.
    ///
    /// # Errors
    ///
    /// Returns error if the line cannot be requested.
    fn open(&self, number: u32) -> Result<Box<dyn PowerLine>, GpioError>;
}
