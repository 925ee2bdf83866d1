// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command form decoding.

use thiserror::Error;

use crate::engine::Action;
use crate::registry::LIGHTS;

/// Legacy `cmd` value that toggles the lights regardless of `printer`.
const LEGACY_LIGHTS_CMD: &str = "lights";

/// A decoded command form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRequest {
    /// Printer name, or `lights`.
    pub printer: String,
    /// Requested action.
    pub action: Action,
}

/// Errors in a submitted command form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// A required field is absent or empty.
    #[error("missing form field: {0}")]
    MissingField(&'static str),

    /// The `cmd` field has an unknown value.
    #[error("invalid cmd: {0:?}")]
    InvalidCommand(String),

    /// A field is not valid percent-encoded UTF-8.
    #[error("malformed form encoding: {0}")]
    Encoding(String),
}

/// Decodes an `application/x-www-form-urlencoded` command form.
///
/// # Errors
///
/// Returns error if `cmd` is missing or unknown, or `printer` is missing for
/// a printer command.
///
/// # Examples
///
/// ```
/// use noodle_hub::engine::Action;
/// use noodle_hub::web::parse_form;
///
/// let form = parse_form("printer=prusa1&cmd=power_off").unwrap();
/// assert_eq!(form.printer, "prusa1");
/// assert_eq!(form.action, Action::PowerOff);
///
/// let legacy = parse_form("cmd=lights").unwrap();
/// assert_eq!(legacy.printer, "lights");
/// assert_eq!(legacy.action, Action::Toggle);
/// ```
pub fn parse_form(body: &str) -> Result<FormRequest, FormError> {
    let mut printer = None;
    let mut cmd = None;

    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode(value)?;
        match decode(key)?.as_str() {
            "printer" => printer = Some(value),
            "cmd" => cmd = Some(value),
            _ => {}
        }
    }

    let cmd = cmd
        .filter(|c| !c.is_empty())
        .ok_or(FormError::MissingField("cmd"))?;

    if cmd == LEGACY_LIGHTS_CMD {
        return Ok(FormRequest {
            printer: LIGHTS.to_string(),
            action: Action::Toggle,
        });
    }

    let action = cmd
        .parse::<Action>()
        .map_err(|_| FormError::InvalidCommand(cmd.clone()))?;
    let printer = printer
        .filter(|p| !p.is_empty())
        .ok_or(FormError::MissingField("printer"))?;

    Ok(FormRequest { printer, action })
}

fn decode(raw: &str) -> Result<String, FormError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| FormError::Encoding(e.to_string()))
}
