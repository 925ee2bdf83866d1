// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the noodle hub.
//!
//! Configuration problems are fatal at startup. Everything that can go wrong
//! at runtime (bus, GPIO, payload parsing) is reported through these types to
//! the layer that logs it; the standby engine itself never returns an error to
//! its callers, it answers with a [`StateChangeResult`](crate::engine::StateChangeResult).

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error occurred on the message bus.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Error occurred while driving a GPIO line.
    #[error("gpio error: {0}")]
    Gpio(#[from] GpioError),

    /// Error occurred while parsing an inbound payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O error outside of GPIO handling (sockets, config file).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine was built outside of a tokio runtime.
    #[error("no tokio runtime available for standby timers")]
    NoRuntime,
}

/// Errors detected while loading the configuration or building the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {message}")]
    Read {
        /// Path of the configuration file.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// The configuration file is not valid.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A printer has an empty name.
    #[error("printer #{index} has an empty {field}")]
    EmptyField {
        /// Position of the printer in the configuration list.
        index: usize,
        /// Name of the empty field.
        field: &'static str,
    },

    /// Two printers share the same name.
    #[error("duplicate printer name: {0}")]
    DuplicateName(String),

    /// A GPIO line is assigned more than once.
    #[error("gpio {gpio} assigned to {second} is already used by {first}")]
    DuplicateGpio {
        /// The GPIO line number.
        gpio: u32,
        /// Owner of the first assignment.
        first: String,
        /// Owner of the conflicting assignment.
        second: String,
    },

    /// Two inbound routes resolve to the same topic.
    #[error("topic {topic} is used by both {first} and {second}")]
    DuplicateTopic {
        /// The conflicting topic.
        topic: String,
        /// First route using the topic.
        first: String,
        /// Second route using the topic.
        second: String,
    },
}

/// Errors related to the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The bus has been shut down.
    #[error("bus closed")]
    Closed,
}

/// Errors related to GPIO output lines.
#[derive(Debug, Error)]
pub enum GpioError {
    /// Writing the line failed.
    #[error("failed to write gpio {line}: {source}")]
    Write {
        /// The GPIO line number.
        line: u32,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Requesting the line as an output failed.
    #[error("failed to request gpio {line}: {source}")]
    Request {
        /// The GPIO line number.
        line: u32,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The line rejected the write without an I/O error.
    #[error("gpio {0} is unavailable")]
    Unavailable(u32),
}

/// Errors related to parsing inbound bus payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the payload.
    #[error("missing field in payload: {0}")]
    MissingField(String),

    /// A boolean-like payload had an unexpected value.
    #[error("invalid boolean payload: {0:?}")]
    InvalidBoolean(String),

    /// A command name is not recognized.
    #[error("unknown command: {0:?}")]
    UnknownAction(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_gpio_display() {
        let err = ConfigError::DuplicateGpio {
            gpio: 17,
            first: "prusa1 power".to_string(),
            second: "prusa2 raspi".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "gpio 17 assigned to prusa2 raspi is already used by prusa1 power"
        );
    }

    #[test]
    fn error_from_config_error() {
        let err: Error = ConfigError::DuplicateName("prusa1".to_string()).into();
        assert!(matches!(err, Error::Config(ConfigError::DuplicateName(_))));
    }

    #[test]
    fn parse_error_display() {
        let err = ParseError::MissingField("flags".to_string());
        assert_eq!(err.to_string(), "missing field in payload: flags");
    }

    #[test]
    fn empty_field_display() {
        let err = ConfigError::EmptyField {
            index: 2,
            field: "name",
        };
        assert_eq!(err.to_string(), "printer #2 has an empty name");
    }
}
