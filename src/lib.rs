// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Noodle Hub - power control for a farm of networked 3D printers.
//!
//! The hub switches the controller board and the power supply of each printer
//! and a shared lighting circuit. It listens to printer status messages on an
//! MQTT bus, powers printers off after they have been idle for a configured
//! time, and never powers off a printer that is printing.
//!
//! # Architecture
//!
//! - [`config`]: JSON configuration file
//! - [`registry`]: static printer catalog and topic names
//! - [`gpio`]: output lines driving the relays
//! - [`protocol`]: message bus and inbound topic routing
//! - [`telemetry`]: inbound payload parsers
//! - [`timer`]: keyed deferred callbacks
//! - [`state`]: per-printer status and snapshots
//! - [`engine`]: the standby state machine and command façade
//! - `web`: operator page and JSON status (feature `web`)
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use noodle_hub::{Action, Config, Engine, Registry};
//! use noodle_hub::gpio::MemoryLineProvider;
//! use noodle_hub::protocol::MemoryBus;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> noodle_hub::Result<()> {
//! let config = Config::from_json(r#"{
//!     "mqtt-host": "localhost",
//!     "mqtt-prefix": "farm/",
//!     "standby-timeout": 300,
//!     "lights-gpio": 4,
//!     "printers": [{
//!         "name": "prusa1",
//!         "mqtt-name": "prusa1",
//!         "mqtt-connected-topic": "octoprint/prusa1/mqtt",
//!         "mqtt-print-progress-topic": "octoprint/prusa1/event/PrintProgress",
//!         "raspi-gpio": 17,
//!         "power-gpio": 27
//!     }]
//! }"#)?;
//!
//! let bus = MemoryBus::new();
//! let engine = Engine::builder(Registry::from_config(&config)?)
//!     .with_config(&config)
//!     .build(Arc::new(bus.clone()), &MemoryLineProvider::new())?;
//!
//! engine.handle_message("farm/octoprint/prusa1/mqtt", "connected");
//! engine.handle_message("farm/octoprint/prusa1/event/PrintProgress", r#"{"state_id":"PRINTING"}"#);
//!
//! let result = engine.submit_command("prusa1", Action::PowerOff);
//! assert!(!result.accepted);
//! assert_eq!(result.reason, "can not shutdown printer while it is printing");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod gpio;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod telemetry;
pub mod timer;
#[cfg(feature = "web")]
pub mod web;

pub use config::{Config, PrinterConfig};
pub use engine::{Action, Command, Engine, EngineBuilder, StateChangeResult, Target};
pub use error::{BusError, ConfigError, Error, GpioError, ParseError, Result};
pub use gpio::{LineProvider, Polarity, PowerLine};
pub use protocol::Bus;
pub use registry::{Device, DeviceId, Registry};
pub use state::{DeviceState, Snapshot};
