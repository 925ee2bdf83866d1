// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTML status page.

use std::fmt;

use crate::engine::{Action, StateChangeResult};
use crate::registry::LIGHTS;
use crate::state::Snapshot;

/// Renders the status page with the command form.
///
/// `result` is the outcome of the command just submitted, if any.
#[must_use]
pub fn render_page(snapshot: &Snapshot, result: Option<&StateChangeResult>) -> String {
    StatusPage { snapshot, result }.to_string()
}

struct StatusPage<'a> {
    snapshot: &'a Snapshot,
    result: Option<&'a StateChangeResult>,
}

impl fmt::Display for StatusPage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(concat!(
            "<!DOCTYPE html>\n",
            "<html>\n<head>\n",
            "<meta charset=\"utf-8\">\n",
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
            "<title>Noodle Hub</title>\n",
            "</head>\n<body>\n",
            "<h1>Noodle Hub</h1>\n",
        ))?;

        if let Some(result) = self.result {
            let class = if result.accepted { "ok" } else { "rejected" };
            writeln!(
                f,
                "<p class=\"result {class}\">{}</p>",
                Escaped(&result.to_string())
            )?;
        }

        f.write_str("<table>\n<tr><th>Printer</th><th>State</th><th>Power</th><th>Standby</th><th></th></tr>\n")?;
        for device in &self.snapshot.devices {
            writeln!(
                f,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                Escaped(&device.name),
                device.state.as_str(),
                on_off(device.powered),
                if device.standby_pending { "pending" } else { "-" },
                Buttons(&device.name),
            )?;
        }
        writeln!(
            f,
            "<tr><td>{LIGHTS}</td><td>-</td><td>{}</td><td>-</td><td>{}</td></tr>",
            on_off(self.snapshot.light),
            Buttons(LIGHTS),
        )?;
        f.write_str("</table>\n</body>\n</html>\n")
    }
}

/// One form per row, one submit button per action.
struct Buttons<'a>(&'a str);

impl fmt::Display for Buttons<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<form method=\"post\" action=\"/\"><input type=\"hidden\" name=\"printer\" value=\"{}\">",
            Escaped(self.0)
        )?;
        for action in [Action::PowerOn, Action::PowerOff, Action::Toggle] {
            write!(
                f,
                "<button type=\"submit\" name=\"cmd\" value=\"{action}\">{}</button>",
                label(action)
            )?;
        }
        f.write_str("</form>")
    }
}

/// HTML-escapes text content and attribute values.
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '\'' => f.write_str("&#39;")?,
                c => fmt::Write::write_char(f, c)?,
            }
        }
        Ok(())
    }
}

const fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

const fn label(action: Action) -> &'static str {
    match action {
        Action::PowerOn => "On",
        Action::PowerOff => "Off",
        Action::Toggle => "Toggle",
    }
}
