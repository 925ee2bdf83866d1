// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message bus plumbing.
//!
//! The engine publishes through the [`Bus`] trait and receives inbound
//! messages through its [`TopicRouter`]. Implementations:
//!
//! - [`MqttBus`]: rumqttc-backed broker connection (feature `mqtt`)
//! - [`MemoryBus`]: records traffic, for dry runs and tests

mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;
mod topic_router;

pub use memory::{MemoryBus, Published};
#[cfg(feature = "mqtt")]
pub use mqtt::{DEFAULT_REQUEST_CAPACITY, InboundMessage, MqttBus, MqttBusBuilder, MqttBusConfig};
pub use topic_router::{Route, TopicRouter};

use crate::error::BusError;

/// Topic-based publish/subscribe transport.
///
/// Both operations must return without waiting on the network; they are
/// called while the engine holds its state lock.
pub trait Bus: Send + Sync + std::fmt::Debug {
    /// Subscribes to a topic.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription cannot be queued.
    fn subscribe(&self, topic: &str) -> Result<(), BusError>;

    /// Publishes a payload to a topic.
    ///
    /// # Errors
    ///
    /// Returns error if the message cannot be queued.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError>;
}
