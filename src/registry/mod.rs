// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static catalog of printers and the lighting circuit.
//!
//! The [`Registry`] is built once from the [`Config`] and never changes
//! afterwards. Construction validates the configuration and fails on the
//! first problem found.
//!
//! # Examples
//!
//! ```
//! use noodle_hub::config::Config;
//! use noodle_hub::registry::Registry;
//!
//! let config = Config::from_json(r#"{
//!     "mqtt-host": "broker.lan",
//!     "mqtt-prefix": "octoprint/",
//!     "standby-timeout": 300,
//!     "lights-gpio": 4,
//!     "printers": [{
//!         "name": "prusa1",
//!         "mqtt-name": "prusa_one",
//!         "mqtt-connected-topic": "prusa1/mqtt",
//!         "mqtt-print-progress-topic": "prusa1/progress",
//!         "raspi-gpio": 17,
//!         "power-gpio": 27
//!     }]
//! }"#).unwrap();
//!
//! let registry = Registry::from_config(&config).unwrap();
//! let prusa = registry.find("prusa1").unwrap();
//! assert_eq!(prusa.topics().power_command, "octoprint/prusa_one/power/cmd");
//! ```

mod device;

use std::collections::HashMap;
use std::collections::hash_map::Entry;

pub use device::{Device, DeviceId, DeviceTopics, LightCircuit};

use crate::config::Config;
use crate::error::ConfigError;

/// Name under which the lighting circuit is addressed.
pub const LIGHTS: &str = "lights";

/// Catalog of all controlled devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    devices: Vec<Device>,
    light: LightCircuit,
}

impl Registry {
    /// Builds the registry from the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a printer has an empty name or MQTT name,
    /// if two printers share a name, or if a GPIO line is assigned twice
    /// (including the light line).
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut names: HashMap<&str, usize> = HashMap::new();
        let mut gpios: HashMap<u32, String> = HashMap::new();
        claim_gpio(&mut gpios, config.lights_gpio, LIGHTS.to_string())?;

        let mut devices = Vec::with_capacity(config.printers.len());
        for (index, printer) in config.printers.iter().enumerate() {
            if printer.name.is_empty() {
                return Err(ConfigError::EmptyField {
                    index,
                    field: "name",
                });
            }
            if printer.mqtt_name.is_empty() {
                return Err(ConfigError::EmptyField {
                    index,
                    field: "mqtt-name",
                });
            }
            if names.insert(printer.name.as_str(), index).is_some() {
                return Err(ConfigError::DuplicateName(printer.name.clone()));
            }
            if printer.name == LIGHTS {
                return Err(ConfigError::Invalid(format!(
                    "printer name {LIGHTS:?} is reserved for the lighting circuit"
                )));
            }

            claim_gpio(&mut gpios, printer.raspi_gpio, format!("{} raspi", printer.name))?;
            claim_gpio(&mut gpios, printer.power_gpio, format!("{} power", printer.name))?;

            let device = Device::from_config(DeviceId::new(index), printer, &config.mqtt_prefix);
            tracing::debug!(
                printer = %device.name(),
                connected = %device.topics().connected,
                progress = %device.topics().progress,
                power_cmd = %device.topics().power_command,
                rpi_cmd = %device.topics().rpi_command,
                "Registered printer"
            );
            devices.push(device);
        }

        let light = LightCircuit::new(
            config.lights_gpio,
            config.default_light_state,
            &config.mqtt_prefix,
        );
        tracing::debug!(
            cmd = %light.command_topic(),
            state = %light.state_topic(),
            "Registered lights"
        );

        Ok(Self { devices, light })
    }

    /// Returns all printers in configuration order.
    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Returns the number of printers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if no printer is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Returns the printer with the given identifier.
    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id.index())
    }

    /// Looks up a printer by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == name)
    }

    /// Returns the lighting circuit.
    #[must_use]
    pub fn light(&self) -> &LightCircuit {
        &self.light
    }
}

fn claim_gpio(gpios: &mut HashMap<u32, String>, gpio: u32, owner: String) -> Result<(), ConfigError> {
    match gpios.entry(gpio) {
        Entry::Occupied(first) => Err(ConfigError::DuplicateGpio {
            gpio,
            first: first.get().clone(),
            second: owner,
        }),
        Entry::Vacant(slot) => {
            slot.insert(owner);
            Ok(())
        }
    }
}
