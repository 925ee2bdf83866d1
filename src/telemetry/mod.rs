// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsing of inbound bus payloads.
//!
//! Printers report on two topics:
//!
//! - the connectivity topic: `connected` / `disconnected`
//! - the progress topic: a JSON document describing the printer state
//!
//! Command topics carry `0` or `1`.
//!
//! # Examples
//!
//! ```
//! use noodle_hub::telemetry::{parse_command, parse_connectivity};
//!
//! assert_eq!(parse_connectivity("connected").unwrap(), true);
//! assert_eq!(parse_command("0").unwrap(), false);
//! assert!(parse_command("maybe").is_err());
//! ```

mod progress;

pub use progress::{ProgressPayload, ProgressSignal, parse_progress};

use crate::error::ParseError;

/// Parses a connectivity payload.
///
/// Accepts `connected`/`disconnected`, `online`/`offline`, `true`/`false` and
/// `1`/`0`, ignoring case and surrounding whitespace.
///
/// # Errors
///
/// Returns [`ParseError::InvalidBoolean`] for any other payload.
pub fn parse_connectivity(payload: &str) -> Result<bool, ParseError> {
    let value = payload.trim();
    for (text, connected) in [
        ("connected", true),
        ("disconnected", false),
        ("online", true),
        ("offline", false),
        ("true", true),
        ("false", false),
        ("1", true),
        ("0", false),
    ] {
        if value.eq_ignore_ascii_case(text) {
            return Ok(connected);
        }
    }
    Err(ParseError::InvalidBoolean(payload.to_string()))
}

/// Parses a command payload (`1` = on, `0` = off).
///
/// # Errors
///
/// Returns [`ParseError::InvalidBoolean`] for any other payload.
pub fn parse_command(payload: &str) -> Result<bool, ParseError> {
    match payload.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(ParseError::InvalidBoolean(payload.to_string())),
    }
}

/// Formats a state for the outbound state topics.
#[must_use]
pub const fn format_state(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}
