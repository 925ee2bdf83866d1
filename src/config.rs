// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration file types.
//!
//! The configuration is a JSON document with kebab-case keys:
//!
//! ```json
//! {
//!   "mqtt-host": "broker.lan",
//!   "mqtt-prefix": "octoprint/",
//!   "standby-timeout": 300,
//!   "lights-gpio": 4,
//!   "printers": [
//!     {
//!       "name": "prusa1",
//!       "mqtt-name": "prusa_one",
//!       "mqtt-connected-topic": "prusa1/mqtt",
//!       "mqtt-print-progress-topic": "prusa1/event/PrinterStateChanged",
//!       "raspi-gpio": 17,
//!       "power-gpio": 27
//!     }
//!   ]
//! }
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gpio::Polarity;

/// Top-level configuration of the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// MQTT broker host.
    pub mqtt_host: String,
    /// MQTT broker port.
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,
    /// Global topic prefix, prepended verbatim (include the trailing `/`).
    #[serde(default)]
    pub mqtt_prefix: String,
    /// Optional MQTT username.
    #[serde(default)]
    pub mqtt_username: Option<String>,
    /// Optional MQTT password.
    #[serde(default)]
    pub mqtt_password: Option<String>,
    /// Seconds a printer stays powered after it became idle.
    pub standby_timeout: u64,
    /// GPIO line of the lighting circuit.
    pub lights_gpio: u32,
    /// Light state applied at startup.
    #[serde(default)]
    pub default_light_state: bool,
    /// Switch lights on with the first online printer and off with the last.
    #[serde(default)]
    pub light_follows_printers: bool,
    /// Electrical polarity of every output line.
    #[serde(default)]
    pub gpio_polarity: Polarity,
    /// Base directory of the sysfs GPIO interface.
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: PathBuf,
    /// Address the web form listens on.
    #[serde(default = "default_web_listen")]
    pub web_listen: SocketAddr,
    /// Fallback log filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Printers, in display order.
    pub printers: Vec<PrinterConfig>,
}

/// Configuration of a single printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PrinterConfig {
    /// Unique name, used by the web form.
    pub name: String,
    /// Name used to build the command and state topics.
    pub mqtt_name: String,
    /// Overrides the global prefix for this printer.
    #[serde(default)]
    pub mqtt_prefix: Option<String>,
    /// Connectivity topic suffix.
    pub mqtt_connected_topic: String,
    /// Print progress topic suffix.
    pub mqtt_print_progress_topic: String,
    /// GPIO line powering the controller board.
    pub raspi_gpio: u32,
    /// GPIO line driving the printer power relay.
    pub power_gpio: u32,
    /// Power state applied to both lines at startup; lines untouched if unset.
    #[serde(default)]
    pub default_power_state: Option<bool>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_gpio_chip() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

fn default_web_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Loads the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Invalid`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&contents)
    }

    /// Parses the configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the document does not match.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Returns the standby timeout as a duration.
    #[must_use]
    pub fn standby_timeout(&self) -> Duration {
        Duration::from_secs(self.standby_timeout)
    }

    /// Returns the MQTT credentials, if both username and password are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.mqtt_username, &self.mqtt_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}
