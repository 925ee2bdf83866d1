// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT transport.
//!
//! [`MqttBus`] implements [`Bus`] on top of a rumqttc connection. A background
//! task drives the event loop and forwards every inbound publish to a channel
//! handed out once by [`MqttBus::take_messages`].
//!
//! The connection is established (and acknowledged) before
//! [`MqttBusBuilder::build`] returns. Afterwards the event loop reconnects on
//! its own and re-issues every subscription on each `ConnAck`, since sessions
//! are clean.
//!
//! Subscribes and publishes share one request queue. Publishes never wait for
//! room; a subscribe that finds the queue full is finished by a spawned task.
//!
//! # Examples
//!
//! ```no_run
//! use noodle_hub::protocol::{Bus, MqttBus};
//!
//! # async fn example() -> Result<(), noodle_hub::error::BusError> {
//! let bus = MqttBus::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("user", "password")
//!     .build()
//!     .await?;
//!
//! bus.subscribe("octoprint/lights/cmd")?;
//! let mut messages = bus.take_messages().expect("receiver taken once");
//! while let Some(message) = messages.recv().await {
//!     println!("{} -> {}", message.topic, message.payload);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, ClientError, EventLoop, MqttOptions, QoS};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::error::BusError;

use super::Bus;

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Delay before polling again after a transport error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capacity of the inbound message channel.
const MESSAGE_CHANNEL_CAPACITY: usize = 64;

/// Default capacity of the outgoing request queue shared by subscribes and
/// publishes. A farm subscribes four topics per printer at startup.
pub const DEFAULT_REQUEST_CAPACITY: usize = 1024;

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// UTF-8 payload.
    pub payload: String,
}

/// Configuration for an MQTT connection.
#[derive(Debug, Clone)]
pub struct MqttBusConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
    request_capacity: usize,
}

impl Default for MqttBusConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            keep_alive: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(10),
            request_capacity: DEFAULT_REQUEST_CAPACITY,
        }
    }
}

/// An MQTT connection implementing [`Bus`].
///
/// `MqttBus` is cheaply cloneable (via `Arc`).
#[derive(Clone)]
pub struct MqttBus {
    inner: Arc<MqttBusInner>,
}

struct MqttBusInner {
    client: AsyncClient,
    runtime: Handle,
    config: MqttBusConfig,
    connected: AtomicBool,
    shutting_down: AtomicBool,
    /// Every topic subscribed so far, re-issued after reconnects.
    topics: Mutex<Vec<String>>,
    messages: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
}

impl MqttBus {
    /// Creates a new builder for configuring an MQTT connection.
    #[must_use]
    pub fn builder() -> MqttBusBuilder {
        MqttBusBuilder::default()
    }

    /// Returns whether the broker connection is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the host address of the broker.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Returns the port of the broker.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Takes the receiver of inbound messages.
    ///
    /// Returns `None` if it was already taken.
    #[must_use]
    pub fn take_messages(&self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inner.messages.lock().take()
    }

    /// Returns the number of tracked subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.topics.lock().len()
    }

    /// Disconnects from the broker and stops the event loop.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be queued.
    pub async fn disconnect(&self) -> Result<(), BusError> {
        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            "Disconnecting from MQTT broker"
        );
        self.inner.shutting_down.store(true, Ordering::Release);
        self.inner.client.disconnect().await?;
        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn resubscribe(&self) {
        let topics = self.inner.topics.lock().clone();
        for topic in &topics {
            if let Err(e) = self.request_subscribe(topic) {
                tracing::warn!(topic = %topic, error = %e, "Failed to resubscribe");
            }
        }
        if !topics.is_empty() {
            tracing::info!(count = topics.len(), "Resubscribed topics");
        }
    }

    /// Queues a subscribe request, waiting on the runtime when the request
    /// queue is full.
    fn request_subscribe(&self, topic: &str) -> Result<(), BusError> {
        match self.inner.client.try_subscribe(topic, QoS::AtMostOnce) {
            Ok(()) => Ok(()),
            Err(ClientError::TryRequest(_)) => {
                tracing::debug!(topic = %topic, "Request queue full, deferring subscribe");
                let client = self.inner.client.clone();
                let topic = topic.to_string();
                self.inner.runtime.spawn(async move {
                    if let Err(e) = client.subscribe(topic.as_str(), QoS::AtMostOnce).await {
                        tracing::warn!(topic = %topic, error = %e, "Deferred subscribe failed");
                    }
                });
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Bus for MqttBus {
    fn subscribe(&self, topic: &str) -> Result<(), BusError> {
        self.request_subscribe(topic)?;
        self.inner.topics.lock().push(topic.to_string());
        tracing::debug!(topic = %topic, "Subscribed");
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        tracing::debug!(topic = %topic, payload = %payload, "Publishing");
        self.inner
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_owned())?;
        Ok(())
    }
}

impl std::fmt::Debug for MqttBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBus")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builder for creating an MQTT connection.
#[derive(Debug, Default)]
pub struct MqttBusBuilder {
    config: MqttBusConfig,
}

impl MqttBusBuilder {
    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 60 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Sets the capacity of the outgoing request queue
    /// (default: [`DEFAULT_REQUEST_CAPACITY`]).
    #[must_use]
    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.config.request_capacity = capacity.max(1);
        self
    }

    /// Connects to the broker and waits for the acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Host is not set
    /// - Connection fails
    /// - Connection times out
    pub async fn build(self) -> Result<MqttBus, BusError> {
        if self.config.host.is_empty() {
            return Err(BusError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("noodle_hub_{}_{}", std::process::id(), counter);

        let mut mqtt_options = MqttOptions::new(&client_id, &self.config.host, self.config.port);
        mqtt_options.set_keep_alive(self.config.keep_alive);
        mqtt_options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, self.config.request_capacity);
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);

        let bus = MqttBus {
            inner: Arc::new(MqttBusInner {
                client,
                runtime: Handle::current(),
                config: self.config.clone(),
                connected: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                topics: Mutex::new(Vec::new()),
                messages: Mutex::new(Some(message_rx)),
            }),
        };

        let (connack_tx, connack_rx) = oneshot::channel();
        let loop_bus = bus.clone();
        tokio::spawn(async move {
            handle_bus_events(event_loop, loop_bus, connack_tx, message_tx).await;
        });

        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    host = %self.config.host,
                    port = %self.config.port,
                    "Connected to MQTT broker"
                );
                Ok(bus)
            }
            Ok(Err(_)) => Err(BusError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            )),
            Err(_) => {
                bus.inner.shutting_down.store(true, Ordering::Release);
                Err(BusError::ConnectionFailed(format!(
                    "MQTT connection timeout after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }
}

/// Drives the rumqttc event loop.
///
/// Before the first `ConnAck` any error ends the loop, which fails the
/// builder. Afterwards errors are logged and polling resumes after
/// [`RECONNECT_DELAY`], which makes rumqttc reconnect.
async fn handle_bus_events(
    mut event_loop: EventLoop,
    bus: MqttBus,
    connack_tx: oneshot::Sender<()>,
    message_tx: mpsc::Sender<InboundMessage>,
) {
    use rumqttc::{Event, Packet};

    let mut connack_tx = Some(connack_tx);

    loop {
        if bus.inner.shutting_down.load(Ordering::Acquire) {
            break;
        }

        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT connection acknowledged");
                bus.inner.connected.store(true, Ordering::Release);
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                } else {
                    bus.resubscribe();
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::trace!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Ok(payload) = String::from_utf8(publish.payload.to_vec()) else {
                    tracing::warn!(topic = %publish.topic, "Dropping non UTF-8 payload");
                    continue;
                };
                tracing::debug!(topic = %publish.topic, payload = %payload, "MQTT message received");
                let message = InboundMessage {
                    topic: publish.topic.to_string(),
                    payload,
                };
                if message_tx.send(message).await.is_err() {
                    tracing::trace!("Inbound message receiver dropped");
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker sent disconnect");
                bus.inner.connected.store(false, Ordering::Release);
            }
            Ok(_) => {}
            Err(e) => {
                bus.inner.connected.store(false, Ordering::Release);
                if connack_tx.is_some() || bus.inner.shutting_down.load(Ordering::Acquire) {
                    tracing::error!(error = %e, "MQTT event loop stopped");
                    break;
                }
                tracing::warn!(
                    error = %e,
                    retry_secs = RECONNECT_DELAY.as_secs(),
                    "MQTT connection lost, reconnecting"
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
