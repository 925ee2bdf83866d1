// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inbound topic routing.
//!
//! The [`TopicRouter`] is an explicit handler table built once from the
//! registry. Each inbound topic maps to exactly one [`Route`], which names the
//! handler and the printer it applies to.
//!
//! ```text
//! MQTT Message: octoprint/prusa1/mqtt → connected
//!                     ↓
//!             TopicRouter.route()
//!                     ↓
//!         Route::Connectivity(prusa1)
//!                     ↓
//!        Engine connectivity handler
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use crate::error::ConfigError;
use crate::registry::{DeviceId, Registry};

/// Handler an inbound topic is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Connectivity message of a printer.
    Connectivity(DeviceId),
    /// Print progress message of a printer.
    Progress(DeviceId),
    /// Power command for a printer.
    PowerCommand(DeviceId),
    /// Controller board command for a printer.
    RpiCommand(DeviceId),
    /// Light command.
    LightsCommand,
}

impl Route {
    /// Returns the printer this route applies to.
    #[must_use]
    pub fn device(self) -> Option<DeviceId> {
        match self {
            Self::Connectivity(id)
            | Self::Progress(id)
            | Self::PowerCommand(id)
            | Self::RpiCommand(id) => Some(id),
            Self::LightsCommand => None,
        }
    }

    const fn kind(self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity",
            Self::Progress(_) => "progress",
            Self::PowerCommand(_) => "power command",
            Self::RpiCommand(_) => "rpi command",
            Self::LightsCommand => "lights command",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device() {
            Some(id) => write!(f, "{} {id}", self.kind()),
            None => f.write_str(self.kind()),
        }
    }
}

/// Maps inbound topics to handlers.
#[derive(Debug, Clone, Default)]
pub struct TopicRouter {
    routes: HashMap<String, Route>,
}

impl TopicRouter {
    /// Builds the handler table for every printer and the lights.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTopic`] if two routes resolve to the
    /// same topic.
    pub fn from_registry(registry: &Registry) -> Result<Self, ConfigError> {
        let mut router = Self::default();
        let mut labels: HashMap<String, String> = HashMap::new();

        for device in registry.devices() {
            let id = device.id();
            let topics = device.topics();
            for (topic, route) in [
                (&topics.connected, Route::Connectivity(id)),
                (&topics.progress, Route::Progress(id)),
                (&topics.power_command, Route::PowerCommand(id)),
                (&topics.rpi_command, Route::RpiCommand(id)),
            ] {
                let label = format!("{} {}", device.name(), route.kind());
                router.insert(&mut labels, topic, route, label)?;
            }
        }

        let lights = registry.light().command_topic();
        router.insert(
            &mut labels,
            lights,
            Route::LightsCommand,
            Route::LightsCommand.kind().to_string(),
        )?;

        Ok(router)
    }

    fn insert(
        &mut self,
        labels: &mut HashMap<String, String>,
        topic: &str,
        route: Route,
        label: String,
    ) -> Result<(), ConfigError> {
        match self.routes.entry(topic.to_string()) {
            Entry::Occupied(_) => Err(ConfigError::DuplicateTopic {
                topic: topic.to_string(),
                first: labels.get(topic).cloned().unwrap_or_default(),
                second: label,
            }),
            Entry::Vacant(slot) => {
                tracing::debug!(topic = %topic, route = %label, "Bound topic");
                slot.insert(route);
                labels.insert(topic.to_string(), label);
                Ok(())
            }
        }
    }

    /// Returns the route bound to a topic.
    #[must_use]
    pub fn route(&self, topic: &str) -> Option<Route> {
        self.routes.get(topic).copied()
    }

    /// Returns every bound topic, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    /// Returns the number of bound topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no topic is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn registry(json_printers: &str) -> Registry {
        let config = Config::from_json(&format!(
            r#"{{
                "mqtt-host": "broker.lan",
                "mqtt-prefix": "octoprint/",
                "standby-timeout": 300,
                "lights-gpio": 4,
                "printers": {json_printers}
            }}"#
        ))
        .unwrap();
        Registry::from_config(&config).unwrap()
    }

    const TWO_PRINTERS: &str = r#"[
        {"name": "prusa1", "mqtt-name": "p1", "mqtt-connected-topic": "p1/mqtt",
         "mqtt-print-progress-topic": "p1/progress", "raspi-gpio": 17, "power-gpio": 27},
        {"name": "prusa2", "mqtt-name": "p2", "mqtt-prefix": "lab/", "mqtt-connected-topic": "p2/mqtt",
         "mqtt-print-progress-topic": "p2/progress", "raspi-gpio": 22, "power-gpio": 23}
    ]"#;

    #[test]
    fn routes_every_inbound_topic() {
        let registry = registry(TWO_PRINTERS);
        let router = TopicRouter::from_registry(&registry).unwrap();
        let p1 = registry.find("prusa1").unwrap().id();
        let p2 = registry.find("prusa2").unwrap().id();

        assert_eq!(router.len(), 9);
        assert_eq!(router.route("octoprint/p1/mqtt"), Some(Route::Connectivity(p1)));
        assert_eq!(router.route("octoprint/p1/progress"), Some(Route::Progress(p1)));
        assert_eq!(router.route("octoprint/p1/power/cmd"), Some(Route::PowerCommand(p1)));
        assert_eq!(router.route("lab/p2/rpi/cmd"), Some(Route::RpiCommand(p2)));
        assert_eq!(router.route("octoprint/lights/cmd"), Some(Route::LightsCommand));
    }

    #[test]
    fn unknown_and_state_topics_are_not_routed() {
        let router = TopicRouter::from_registry(&registry(TWO_PRINTERS)).unwrap();
        assert_eq!(router.route("octoprint/p1/power/state"), None);
        assert_eq!(router.route("octoprint/p2/mqtt"), None);
        assert_eq!(router.route(""), None);
    }

    #[test]
    fn topics_are_sorted() {
        let router = TopicRouter::from_registry(&registry(TWO_PRINTERS)).unwrap();
        let topics = router.topics();
        let mut sorted = topics.clone();
        sorted.sort_unstable();
        assert_eq!(topics, sorted);
        assert!(topics.contains(&"lab/p2/mqtt"));
    }

    #[test]
    fn shared_connectivity_topic_fails() {
        let registry = registry(
            r#"[
            {"name": "prusa1", "mqtt-name": "p1", "mqtt-connected-topic": "shared",
             "mqtt-print-progress-topic": "p1/progress", "raspi-gpio": 17, "power-gpio": 27},
            {"name": "prusa2", "mqtt-name": "p2", "mqtt-connected-topic": "shared",
             "mqtt-print-progress-topic": "p2/progress", "raspi-gpio": 22, "power-gpio": 23}
        ]"#,
        );
        let result = TopicRouter::from_registry(&registry);
        assert_eq!(
            result.unwrap_err(),
            ConfigError::DuplicateTopic {
                topic: "octoprint/shared".to_string(),
                first: "prusa1 connectivity".to_string(),
                second: "prusa2 connectivity".to_string(),
            }
        );
    }

    #[test]
    fn route_display() {
        let registry = registry(TWO_PRINTERS);
        let id = registry.find("prusa1").unwrap().id();
        assert_eq!(Route::Progress(id).to_string(), "progress #0");
        assert_eq!(Route::LightsCommand.to_string(), "lights command");
    }
}
