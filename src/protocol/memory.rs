// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory bus that records traffic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::BusError;

use super::Bus;

/// A message published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Destination topic.
    pub topic: String,
    /// Payload.
    pub payload: String,
}

/// A bus that records subscriptions and publishes instead of sending them.
///
/// Clones share the same log, so a test can keep one as a probe.
///
/// # Examples
///
/// ```
/// use noodle_hub::protocol::{Bus, MemoryBus};
///
/// let bus = MemoryBus::new();
/// bus.publish("octoprint/lights/state", "1").unwrap();
/// assert_eq!(bus.published_to("octoprint/lights/state"), vec!["1"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    inner: Arc<MemoryBusInner>,
}

#[derive(Debug, Default)]
struct MemoryBusInner {
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<Published>>,
    failing: AtomicBool,
}

impl MemoryBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every subscribed topic in subscription order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.subscriptions.lock().clone()
    }

    /// Returns every published message in order.
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.inner.published.lock().clone()
    }

    /// Returns the payloads published to one topic, in order.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.inner
            .published
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.clone())
            .collect()
    }

    /// Forgets every published message.
    pub fn clear(&self) {
        self.inner.published.lock().clear();
    }

    /// Makes subsequent publishes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::Release);
    }
}

impl Bus for MemoryBus {
    fn subscribe(&self, topic: &str) -> Result<(), BusError> {
        self.inner.subscriptions.lock().push(topic.to_string());
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        if self.inner.failing.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        self.inner.published.lock().push(Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}
