// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parser for print progress messages.

use serde::Deserialize;

use crate::error::ParseError;

/// What a progress message says about the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressSignal {
    /// The printer is not printing and may be powered off.
    Idle,
    /// The printer is printing or otherwise busy.
    Busy,
}

impl ProgressSignal {
    /// Returns `true` for [`ProgressSignal::Idle`].
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Printer state identifiers that mean the printer can be powered off.
///
/// These mirror the flags form: `OPERATIONAL` and `ERROR` are the operational
/// idle states, `FINISHING` matches `finishing == true`, and the closed or
/// offline states match `operational == false`. Every other identifier
/// (`PRINTING`, `PAUSED`, `STARTING`, ...) is busy.
const IDLE_STATE_IDS: &[&str] = &[
    "OPERATIONAL",
    "ERROR",
    "FINISHING",
    "OFFLINE",
    "CLOSED",
    "CLOSED_WITH_ERROR",
];

/// Raw progress payload.
///
/// Two shapes are in use: a flat `{"state_id": "PRINTING"}` event, and a
/// status document carrying `{"state": {"flags": {...}}}` (or top-level
/// `flags`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressPayload {
    #[serde(default)]
    state_id: Option<String>,

    #[serde(default)]
    state: Option<StateBlock>,

    #[serde(default)]
    flags: Option<StateFlags>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StateBlock {
    #[serde(default)]
    flags: Option<StateFlags>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct StateFlags {
    #[serde(default)]
    operational: Option<bool>,

    #[serde(default)]
    finishing: bool,
}

impl ProgressPayload {
    /// Derives the idle/busy signal from the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingField`] if the payload carries neither a
    /// `state_id` nor a `flags` block with an `operational` flag.
    pub fn signal(&self) -> Result<ProgressSignal, ParseError> {
        if let Some(state_id) = &self.state_id {
            let idle = IDLE_STATE_IDS
                .iter()
                .any(|id| id.eq_ignore_ascii_case(state_id.trim()));
            return Ok(if idle {
                ProgressSignal::Idle
            } else {
                ProgressSignal::Busy
            });
        }

        let flags = self
            .state
            .as_ref()
            .and_then(|s| s.flags)
            .or(self.flags)
            .ok_or_else(|| ParseError::MissingField("state.flags".to_string()))?;

        let operational = flags
            .operational
            .ok_or_else(|| ParseError::MissingField("flags.operational".to_string()))?;

        if !operational || flags.finishing {
            Ok(ProgressSignal::Idle)
        } else {
            Ok(ProgressSignal::Busy)
        }
    }
}

/// Parses a progress message into an idle/busy signal.
///
/// # Errors
///
/// Returns error if the payload is not JSON or lacks the state fields.
///
/// # Examples
///
/// ```
/// use noodle_hub::telemetry::{ProgressSignal, parse_progress};
///
/// let busy = parse_progress(r#"{"state_id": "PRINTING"}"#).unwrap();
/// assert_eq!(busy, ProgressSignal::Busy);
///
/// let idle = parse_progress(r#"{"state": {"flags": {"operational": false}}}"#).unwrap();
/// assert_eq!(idle, ProgressSignal::Idle);
/// ```
pub fn parse_progress(payload: &str) -> Result<ProgressSignal, ParseError> {
    let parsed: ProgressPayload = serde_json::from_str(payload)?;
    parsed.signal()
}
