// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The standby engine.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gpio::{LineProvider, Polarity, PowerLine};
use crate::protocol::{Bus, Route, TopicRouter};
use crate::registry::{DeviceId, LIGHTS, Registry};
use crate::state::{Snapshot, StateStore};
use crate::telemetry::{self, ProgressSignal};
use crate::timer::{TimerService, TimerToken};

use super::command::{Action, BUSY_REASON, Command, StateChangeResult, Target};

/// Default delay between an idle signal and the standby power-off.
pub const DEFAULT_STANDBY_TIMEOUT: Duration = Duration::from_secs(300);

/// Runtime policy knobs taken from the configuration.
#[derive(Debug, Clone, Copy)]
struct Policy {
    standby_timeout: Duration,
    light_follows_printers: bool,
    polarity: Polarity,
}

/// The two output lines of a printer.
#[derive(Debug)]
struct DeviceLines {
    raspi: Box<dyn PowerLine>,
    power: Box<dyn PowerLine>,
}

/// Everything guarded by the engine lock.
#[derive(Debug)]
struct EngineState {
    store: StateStore,
    light: Box<dyn PowerLine>,
    lines: Vec<DeviceLines>,
}

struct EngineInner {
    registry: Registry,
    router: TopicRouter,
    policy: Policy,
    bus: Arc<dyn Bus>,
    timers: TimerService<DeviceId>,
    state: Mutex<EngineState>,
}

/// Builder for [`Engine`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use noodle_hub::{Config, Engine, Registry};
/// use noodle_hub::gpio::MemoryLineProvider;
/// use noodle_hub::protocol::MemoryBus;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> noodle_hub::Result<()> {
/// let config = Config::from_json(r#"{
///     "mqtt-host": "localhost",
///     "standby-timeout": 300,
///     "lights-gpio": 4,
///     "printers": [{
///         "name": "prusa1",
///         "mqtt-name": "prusa1",
///         "mqtt-connected-topic": "octoprint/prusa1/mqtt",
///         "mqtt-print-progress-topic": "octoprint/prusa1/event/PrintProgress",
///         "raspi-gpio": 17,
///         "power-gpio": 27
///     }]
/// }"#)?;
/// let registry = Registry::from_config(&config)?;
///
/// let engine = Engine::builder(registry)
///     .with_config(&config)
///     .standby_timeout(Duration::from_secs(60))
///     .build(Arc::new(MemoryBus::new()), &MemoryLineProvider::new())?;
///
/// assert_eq!(engine.snapshot().devices.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EngineBuilder {
    registry: Registry,
    policy: Policy,
    runtime: Option<Handle>,
}

impl EngineBuilder {
    fn new(registry: Registry) -> Self {
        Self {
            registry,
            policy: Policy {
                standby_timeout: DEFAULT_STANDBY_TIMEOUT,
                light_follows_printers: false,
                polarity: Polarity::default(),
            },
            runtime: None,
        }
    }

    /// Copies the policy settings from a configuration.
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        self.policy = Policy {
            standby_timeout: config.standby_timeout(),
            light_follows_printers: config.light_follows_printers,
            polarity: config.gpio_polarity,
        };
        self
    }

    /// Sets the delay before an idle printer is powered off.
    #[must_use]
    pub fn standby_timeout(mut self, timeout: Duration) -> Self {
        self.policy.standby_timeout = timeout;
        self
    }

    /// Couples the lights to printer connectivity.
    #[must_use]
    pub fn light_follows_printers(mut self, follow: bool) -> Self {
        self.policy.light_follows_printers = follow;
        self
    }

    /// Sets the electrical polarity of all lines.
    #[must_use]
    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.policy.polarity = polarity;
        self
    }

    /// Sets the runtime standby timers are spawned on.
    ///
    /// Defaults to the runtime `build` is called from.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Opens every line, drives the configured defaults and subscribes every
    /// inbound topic on the bus.
    ///
    /// # Errors
    ///
    /// Returns error if two inbound routes share a topic, if a line cannot be
    /// opened or initialised, if a subscription cannot be queued, or if no
    /// runtime is available.
    pub fn build(self, bus: Arc<dyn Bus>, provider: &dyn LineProvider) -> Result<Engine> {
        let Self {
            registry,
            policy,
            runtime,
        } = self;

        let runtime = match runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| Error::NoRuntime)?,
        };
        let router = TopicRouter::from_registry(&registry)?;

        let circuit = registry.light();
        let mut light = provider.open(circuit.gpio())?;
        light.set(policy.polarity.level(circuit.default_state()))?;

        let mut lines = Vec::with_capacity(registry.len());
        for device in registry.devices() {
            let mut raspi = provider.open(device.raspi_gpio())?;
            let mut power = provider.open(device.power_gpio())?;
            if let Some(on) = device.default_power_state() {
                let level = policy.polarity.level(on);
                raspi.set(level)?;
                power.set(level)?;
                tracing::debug!(device = device.name(), on, "Initialised printer lines");
            }
            lines.push(DeviceLines { raspi, power });
        }

        for topic in router.topics() {
            bus.subscribe(topic)?;
        }

        tracing::info!(
            devices = registry.len(),
            topics = router.len(),
            standby_secs = policy.standby_timeout.as_secs(),
            light_follows_printers = policy.light_follows_printers,
            "Standby engine started"
        );

        let store = StateStore::new(&registry);
        Ok(Engine {
            inner: Arc::new(EngineInner {
                registry,
                router,
                policy,
                bus,
                timers: TimerService::new(runtime),
                state: Mutex::new(EngineState { store, light, lines }),
            }),
        })
    }
}

/// Device state machine and standby-timeout engine.
///
/// Consumes connectivity and progress events, applies the standby policy,
/// drives the output lines and republishes state on the bus. All mutation
/// happens under one lock, so the printing guard and the line write of a
/// power-off are atomic.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Starts building an engine for the given registry.
    #[must_use]
    pub fn builder(registry: Registry) -> EngineBuilder {
        EngineBuilder::new(registry)
    }

    /// Returns the device catalog.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Returns the inbound topic table.
    #[must_use]
    pub fn router(&self) -> &TopicRouter {
        &self.inner.router
    }

    /// Returns the configured standby timeout.
    #[must_use]
    pub fn standby_timeout(&self) -> Duration {
        self.inner.policy.standby_timeout
    }

    /// Dispatches an inbound bus message.
    ///
    /// Returns `false` if no handler is bound to the topic. Malformed payloads
    /// are logged and dropped without touching any state.
    pub fn handle_message(&self, topic: &str, payload: &str) -> bool {
        let Some(route) = self.inner.router.route(topic) else {
            tracing::debug!(topic, "No route for topic");
            return false;
        };
        tracing::debug!(topic, %route, "Routing message");

        match route {
            Route::Connectivity(id) => match telemetry::parse_connectivity(payload) {
                Ok(online) => self.handle_connectivity(id, online),
                Err(e) => tracing::warn!(topic, error = %e, "Dropping connectivity message"),
            },
            Route::Progress(id) => match telemetry::parse_progress(payload) {
                Ok(signal) => self.handle_progress(id, signal),
                Err(e) => tracing::warn!(topic, error = %e, "Dropping progress message"),
            },
            Route::PowerCommand(id) | Route::RpiCommand(id) => {
                match telemetry::parse_command(payload) {
                    Ok(on) => {
                        self.submit(Command::device(id, Action::from(on)));
                    }
                    Err(e) => tracing::warn!(topic, error = %e, "Dropping power command"),
                }
            }
            Route::LightsCommand => match telemetry::parse_command(payload) {
                Ok(on) => {
                    self.submit(Command::light(Action::from(on)));
                }
                Err(e) => tracing::warn!(topic, error = %e, "Dropping light command"),
            },
        }
        true
    }

    /// Applies a connectivity event.
    pub fn handle_connectivity(&self, id: DeviceId, online: bool) {
        let inner = &*self.inner;
        let mut state = inner.state.lock();

        let before = state.store.online_count();
        let Some(status) = state.store.get_mut(id) else {
            tracing::warn!(device = %id, "Connectivity for unknown device");
            return;
        };
        status.set_online(online);
        let after = state.store.online_count();

        tracing::info!(
            device = inner.device_name(id),
            online,
            online_count = after,
            "Printer connectivity changed"
        );

        if inner.policy.light_follows_printers {
            if before == 0 && after > 0 {
                inner.write_light(&mut state, true);
            } else if before > 0 && after == 0 {
                inner.write_light(&mut state, false);
            }
        }
    }

    /// Applies a progress event.
    ///
    /// An idle signal for an online printer (re)arms the standby timer; any
    /// other signal cancels it.
    pub fn handle_progress(&self, id: DeviceId, signal: ProgressSignal) {
        let inner = &*self.inner;
        let mut state = inner.state.lock();
        let Some(status) = state.store.get_mut(id) else {
            tracing::warn!(device = %id, "Progress for unknown device");
            return;
        };

        status.set_idle(signal.is_idle());

        if signal.is_idle() && status.online() {
            let weak = Arc::downgrade(&self.inner);
            let token = inner
                .timers
                .schedule(id, inner.policy.standby_timeout, move |token| {
                    fire_standby(&weak, id, token);
                });
            status.replace_standby(token);
            tracing::info!(
                device = inner.device_name(id),
                %token,
                timeout_secs = inner.policy.standby_timeout.as_secs(),
                "Printer idle, standby armed"
            );
        } else {
            let cancelled = status.take_standby().is_some();
            if cancelled {
                inner.timers.cancel(&id);
            }
            tracing::info!(
                device = inner.device_name(id),
                idle = signal.is_idle(),
                online = status.online(),
                cancelled,
                "Printer progress changed"
            );
        }
    }

    /// Executes a command.
    pub fn submit(&self, command: Command) -> StateChangeResult {
        let inner = &*self.inner;
        let mut state = inner.state.lock();

        let result = match command.target {
            Target::Device(id) => {
                let Some(status) = state.store.get(id) else {
                    return StateChangeResult::rejected(format!("unknown device: {id}"));
                };
                let on = command.action.desired(status.powered());
                inner.change_power(&mut state, id, on)
            }
            Target::Light => {
                let on = command.action.desired(state.store.light());
                inner.write_light(&mut state, on)
            }
        };

        tracing::info!(
            device = inner.target_name(command.target),
            action = %command.action,
            %result,
            "Command executed"
        );
        result
    }

    /// Executes a command addressed by printer name (or `lights`).
    pub fn submit_command(&self, name: &str, action: Action) -> StateChangeResult {
        match self.resolve_target(name) {
            Some(target) => self.submit(Command { target, action }),
            None => {
                tracing::info!(device = name, %action, "Command for unknown device");
                StateChangeResult::rejected(format!("unknown device: {name}"))
            }
        }
    }

    /// Resolves a printer name, or `lights`, to a command target.
    #[must_use]
    pub fn resolve_target(&self, name: &str) -> Option<Target> {
        if name == LIGHTS {
            return Some(Target::Light);
        }
        self.inner
            .registry
            .find(name)
            .map(|device| Target::Device(device.id()))
    }

    /// Returns a consistent copy of all printer and light state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let state = self.inner.state.lock();
        state.store.snapshot(&self.inner.registry)
    }

    /// Cancels every pending standby timer.
    pub fn shutdown(&self) {
        let inner = &*self.inner;
        let mut state = inner.state.lock();
        for device in inner.registry.devices() {
            if let Some(status) = state.store.get_mut(device.id()) {
                status.take_standby();
            }
        }
        inner.timers.cancel_all();
        tracing::info!("Standby engine stopped");
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("devices", &self.inner.registry.len())
            .field("policy", &self.inner.policy)
            .field("timers", &self.inner.timers)
            .finish_non_exhaustive()
    }
}

fn fire_standby(weak: &Weak<EngineInner>, id: DeviceId, token: TimerToken) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut state = inner.state.lock();
    let Some(status) = state.store.get_mut(id) else {
        return;
    };

    if status.pending_standby() != Some(token) {
        tracing::debug!(device = %id, %token, "Ignoring stale standby timer");
        return;
    }
    status.take_standby();
    inner.timers.complete(&id, token);

    if !status.idle() {
        tracing::info!(device = inner.device_name(id), "Standby skipped, printer busy");
        return;
    }

    tracing::info!(device = inner.device_name(id), %token, "Standby timeout reached");
    let result = inner.change_power(&mut state, id, false);
    if !result.accepted {
        tracing::warn!(device = inner.device_name(id), %result, "Standby power-off failed");
    }
}

impl EngineInner {
    fn device_name(&self, id: DeviceId) -> &str {
        self.registry.get(id).map_or("?", |d| d.name())
    }

    fn target_name(&self, target: Target) -> &str {
        match target {
            Target::Device(id) => self.device_name(id),
            Target::Light => LIGHTS,
        }
    }

    /// Drives both lines of a printer, guarded by the printing check.
    fn change_power(&self, state: &mut EngineState, id: DeviceId, on: bool) -> StateChangeResult {
        let Some(device) = self.registry.get(id) else {
            return StateChangeResult::rejected(format!("unknown device: {id}"));
        };
        let idle = state.store.get(id).is_some_and(|s| s.idle());
        if !on && !idle {
            tracing::info!(device = device.name(), "Refusing power-off while printing");
            return StateChangeResult::rejected(BUSY_REASON);
        }

        let Some(lines) = state.lines.get_mut(id.index()) else {
            return StateChangeResult::rejected(format!("unknown device: {id}"));
        };
        let level = self.policy.polarity.level(on);
        if let Err(e) = lines.raspi.set(level).and_then(|()| lines.power.set(level)) {
            tracing::error!(device = device.name(), on, error = %e, "Power write failed");
            return StateChangeResult::rejected(format!("gpio write failed: {e}"));
        }

        if let Some(status) = state.store.get_mut(id) {
            status.set_powered(on);
            if !on && status.take_standby().is_some() {
                self.timers.cancel(&id);
            }
        }
        tracing::info!(device = device.name(), on, "Printer power changed");

        let payload = telemetry::format_state(on);
        let topics = device.topics();
        self.publish(&topics.power_state, payload);
        self.publish(&topics.rpi_state, payload);
        StateChangeResult::accepted()
    }

    fn write_light(&self, state: &mut EngineState, on: bool) -> StateChangeResult {
        if let Err(e) = state.light.set(self.policy.polarity.level(on)) {
            tracing::error!(on, error = %e, "Light write failed");
            return StateChangeResult::rejected(format!("gpio write failed: {e}"));
        }
        state.store.set_light(on);
        tracing::info!(on, "Lights changed");

        self.publish(self.registry.light().state_topic(), telemetry::format_state(on));
        StateChangeResult::accepted()
    }

    fn publish(&self, topic: &str, payload: &str) {
        if let Err(e) = self.bus.publish(topic, payload) {
            tracing::warn!(topic, payload, error = %e, "Failed to publish state");
        }
    }
}
