// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Output lines exported through the Linux sysfs GPIO interface.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::GpioError;

use super::{LineProvider, PowerLine};

/// A GPIO line driven through `/sys/class/gpio/gpioN/value`.
#[derive(Debug)]
pub struct SysfsLine {
    number: u32,
    value_path: PathBuf,
}

impl SysfsLine {
    /// Exports the line (if needed) and configures it as an output.
    ///
    /// # Errors
    ///
    /// Returns [`GpioError::Request`] if the line cannot be exported or its
    /// direction cannot be set.
    pub fn open(base: &Path, number: u32) -> Result<Self, GpioError> {
        let line_dir = base.join(format!("gpio{number}"));
        let request_err = |source| GpioError::Request {
            line: number,
            source,
        };

        if !line_dir.exists() {
            match fs::write(base.join("export"), number.to_string()) {
                Ok(()) => {}
                // Exported concurrently by someone else.
                Err(e) if e.kind() == ErrorKind::ResourceBusy => {}
                Err(e) => return Err(request_err(e)),
            }
        }

        fs::write(line_dir.join("direction"), "out").map_err(request_err)?;
        tracing::debug!(line = number, path = %line_dir.display(), "Requested output line");

        Ok(Self {
            number,
            value_path: line_dir.join("value"),
        })
    }
}

impl PowerLine for SysfsLine {
    fn number(&self) -> u32 {
        self.number
    }

    fn set(&mut self, level: bool) -> Result<(), GpioError> {
        let value = if level { "1" } else { "0" };
        fs::write(&self.value_path, value).map_err(|source| GpioError::Write {
            line: self.number,
            source,
        })
    }
}

/// Opens [`SysfsLine`]s below a sysfs GPIO base directory.
#[derive(Debug, Clone)]
pub struct SysfsLineProvider {
    base: PathBuf,
}

impl SysfsLineProvider {
    /// Creates a provider for the given base directory (usually `/sys/class/gpio`).
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl LineProvider for SysfsLineProvider {
    fn open(&self, number: u32) -> Result<Box<dyn PowerLine>, GpioError> {
        Ok(Box::new(SysfsLine::open(&self.base, number)?))
    }
}
