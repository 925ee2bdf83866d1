// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Standby engine and command façade.
//!
//! The [`Engine`] is the only writer of printer and light state. Bus messages
//! reach it through [`Engine::handle_message`]; operators go through
//! [`Engine::submit`] or [`Engine::submit_command`] and read
//! [`Engine::snapshot`].
//!
//! | Event | Effect |
//! |---|---|
//! | connected / disconnected | updates `online`, optionally drives the lights |
//! | idle progress, printer online | arms the standby timer |
//! | idle progress, printer offline | cancels the standby timer |
//! | busy progress | marks busy, cancels the standby timer |
//! | power off | refused while busy, otherwise both lines off |
//! | standby timer | power off if still current and idle |

mod command;
mod standby;

pub use command::{Action, BUSY_REASON, Command, StateChangeResult, Target};
pub use standby::{DEFAULT_STANDBY_TIMEOUT, Engine, EngineBuilder};
