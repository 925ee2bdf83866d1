// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory output line.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::GpioError;

use super::{LineProvider, PowerLine};

/// An output line that only records its level.
///
/// Clones share the same state, so a test can keep one clone as a probe while
/// the engine owns the other.
///
/// # Examples
///
/// ```
/// use noodle_hub::gpio::{MemoryLine, PowerLine};
///
/// let mut line = MemoryLine::new(17);
/// let probe = line.clone();
///
/// line.set(true).unwrap();
/// assert!(probe.level());
/// assert_eq!(probe.write_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryLine {
    number: u32,
    inner: Arc<MemoryLineInner>,
}

#[derive(Debug, Default)]
struct MemoryLineInner {
    level: AtomicBool,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryLine {
    /// Creates a new line at low level.
    #[must_use]
    pub fn new(number: u32) -> Self {
        Self {
            number,
            inner: Arc::new(MemoryLineInner::default()),
        }
    }

    /// Returns the current electrical level.
    #[must_use]
    pub fn level(&self) -> bool {
        self.inner.level.load(Ordering::Acquire)
    }

    /// Returns how many successful writes the line received.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::Acquire)
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::Release);
    }
}

impl PowerLine for MemoryLine {
    fn number(&self) -> u32 {
        self.number
    }

    fn set(&mut self, level: bool) -> Result<(), GpioError> {
        if self.inner.failing.load(Ordering::Acquire) {
            return Err(GpioError::Unavailable(self.number));
        }
        self.inner.level.store(level, Ordering::Release);
        self.inner.writes.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(line = self.number, level, "Memory line written");
        Ok(())
    }
}

/// Provides in-memory lines, used by `--dry-run` and tests.
///
/// The provider remembers every line it opened so callers can inspect them
/// with [`MemoryLineProvider::line`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLineProvider {
    opened: Arc<Mutex<HashMap<u32, MemoryLine>>>,
}

impl MemoryLineProvider {
    /// Creates a provider with no open lines.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a probe for a line opened earlier.
    #[must_use]
    pub fn line(&self, number: u32) -> Option<MemoryLine> {
        self.opened.lock().get(&number).cloned()
    }
}

impl LineProvider for MemoryLineProvider {
    fn open(&self, number: u32) -> Result<Box<dyn PowerLine>, GpioError> {
        let line = self
            .opened
            .lock()
            .entry(number)
            .or_insert_with(|| MemoryLine::new(number))
            .clone();
        Ok(Box::new(line))
    }
}
