// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registry entries for printers and the lighting circuit.

use std::fmt;

use crate::config::PrinterConfig;

/// Stable identifier of a printer: its slot in the registry.
///
/// Identifiers are assigned in configuration order and stay valid for the
/// lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(usize);

impl DeviceId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bus topics a printer participates in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    /// Inbound connectivity topic.
    pub connected: String,
    /// Inbound print progress topic.
    pub progress: String,
    /// Inbound printer power command topic.
    pub power_command: String,
    /// Inbound controller board command topic.
    pub rpi_command: String,
    /// Outbound printer power state topic.
    pub power_state: String,
    /// Outbound controller board state topic.
    pub rpi_state: String,
}

impl DeviceTopics {
    /// Computes the topics of a printer from its resolved prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use noodle_hub::registry::DeviceTopics;
    ///
    /// let topics = DeviceTopics::resolve("octoprint/", "prusa_one", "prusa1/mqtt", "prusa1/progress");
    /// assert_eq!(topics.connected, "octoprint/prusa1/mqtt");
    /// assert_eq!(topics.power_command, "octoprint/prusa_one/power/cmd");
    /// assert_eq!(topics.rpi_state, "octoprint/prusa_one/rpi/state");
    /// ```
    #[must_use]
    pub fn resolve(prefix: &str, mqtt_name: &str, connected: &str, progress: &str) -> Self {
        Self {
            connected: format!("{prefix}{connected}"),
            progress: format!("{prefix}{progress}"),
            power_command: format!("{prefix}{mqtt_name}/power/cmd"),
            rpi_command: format!("{prefix}{mqtt_name}/rpi/cmd"),
            power_state: format!("{prefix}{mqtt_name}/power/state"),
            rpi_state: format!("{prefix}{mqtt_name}/rpi/state"),
        }
    }
}

/// A printer and its two controlled lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    id: DeviceId,
    name: String,
    mqtt_name: String,
    prefix: String,
    raspi_gpio: u32,
    power_gpio: u32,
    default_power_state: Option<bool>,
    topics: DeviceTopics,
}

impl Device {
    pub(crate) fn from_config(id: DeviceId, config: &PrinterConfig, global_prefix: &str) -> Self {
        let prefix = config
            .mqtt_prefix
            .clone()
            .unwrap_or_else(|| global_prefix.to_string());
        let topics = DeviceTopics::resolve(
            &prefix,
            &config.mqtt_name,
            &config.mqtt_connected_topic,
            &config.mqtt_print_progress_topic,
        );
        Self {
            id,
            name: config.name.clone(),
            mqtt_name: config.mqtt_name.clone(),
            prefix,
            raspi_gpio: config.raspi_gpio,
            power_gpio: config.power_gpio,
            default_power_state: config.default_power_state,
            topics,
        }
    }

    /// Returns the device identifier.
    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Returns the unique printer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the topic-naming key.
    #[must_use]
    pub fn mqtt_name(&self) -> &str {
        &self.mqtt_name
    }

    /// Returns the effective topic prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the GPIO line of the controller board.
    #[must_use]
    pub fn raspi_gpio(&self) -> u32 {
        self.raspi_gpio
    }

    /// Returns the GPIO line of the printer power relay.
    #[must_use]
    pub fn power_gpio(&self) -> u32 {
        self.power_gpio
    }

    /// Returns the power state applied at startup, if any.
    #[must_use]
    pub fn default_power_state(&self) -> Option<bool> {
        self.default_power_state
    }

    /// Returns the bus topics of this printer.
    #[must_use]
    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }
}

/// The lighting circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightCircuit {
    gpio: u32,
    default_state: bool,
    command_topic: String,
    state_topic: String,
}

impl LightCircuit {
    pub(crate) fn new(gpio: u32, default_state: bool, prefix: &str) -> Self {
        Self {
            gpio,
            default_state,
            command_topic: format!("{prefix}lights/cmd"),
            state_topic: format!("{prefix}lights/state"),
        }
    }

    /// Returns the GPIO line of the light relay.
    #[must_use]
    pub fn gpio(&self) -> u32 {
        self.gpio
    }

    /// Returns the light state applied at startup.
    #[must_use]
    pub fn default_state(&self) -> bool {
        self.default_state
    }

    /// Returns the inbound command topic.
    #[must_use]
    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }

    /// Returns the outbound state topic.
    #[must_use]
    pub fn state_topic(&self) -> &str {
        &self.state_topic
    }
}
