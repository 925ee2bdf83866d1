// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the standby engine, driven through virtual time.

use std::sync::Arc;
use std::time::Duration;

use noodle_hub::engine::BUSY_REASON;
use noodle_hub::gpio::MemoryLineProvider;
use noodle_hub::protocol::MemoryBus;
use noodle_hub::{Action, Config, ConfigError, DeviceState, Engine, Registry};
use tokio::time::sleep;

const CONNECTED: &str = "octoprint/prusa1/mqtt";
const PROGRESS: &str = "octoprint/prusa1/event/PrintProgress";
const POWER_STATE: &str = "prusa1/power/state";
const RPI_STATE: &str = "prusa1/rpi/state";

const PRINTING: &str = r#"{"state_id":"PRINTING"}"#;
const OPERATIONAL: &str = r#"{"state_id":"OPERATIONAL"}"#;

fn config_json(light_follows_printers: bool) -> String {
    format!(
        r#"{{
            "mqtt-host": "localhost",
            "standby-timeout": 300,
            "lights-gpio": 4,
            "light-follows-printers": {light_follows_printers},
            "printers": [
                {{
                    "name": "prusa1",
                    "mqtt-name": "prusa1",
                    "mqtt-connected-topic": "octoprint/prusa1/mqtt",
                    "mqtt-print-progress-topic": "octoprint/prusa1/event/PrintProgress",
                    "raspi-gpio": 17,
                    "power-gpio": 27
                }},
                {{
                    "name": "prusa2",
                    "mqtt-name": "prusa2",
                    "mqtt-connected-topic": "octoprint/prusa2/mqtt",
                    "mqtt-print-progress-topic": "octoprint/prusa2/event/PrintProgress",
                    "raspi-gpio": 22,
                    "power-gpio": 23
                }}
            ]
        }}"#
    )
}

struct Harness {
    engine: Engine,
    bus: MemoryBus,
    lines: MemoryLineProvider,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(&Config::from_json(&config_json(false)).unwrap())
    }

    fn with_config(config: &Config) -> Self {
        let bus = MemoryBus::new();
        let lines = MemoryLineProvider::new();
        let registry = Registry::from_config(config).unwrap();
        let engine = Engine::builder(registry)
            .with_config(config)
            .build(Arc::new(bus.clone()), &lines)
            .unwrap();
        Self { engine, bus, lines }
    }

    fn send(&self, topic: &str, payload: &str) {
        assert!(self.engine.handle_message(topic, payload), "unrouted {topic}");
    }

    fn idle(&self) -> bool {
        self.engine.snapshot().device("prusa1").unwrap().idle
    }

    fn powered(&self) -> bool {
        self.engine.snapshot().device("prusa1").unwrap().powered
    }

    fn standby_pending(&self) -> bool {
        self.engine.snapshot().device("prusa1").unwrap().standby_pending
    }
}

// ============================================================================
// Safety guard
// ============================================================================

mod power_off_guard {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn refused_while_printing() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, PRINTING);
        h.bus.clear();

        let result = h.engine.submit_command("prusa1", Action::PowerOff);

        assert!(!result.accepted);
        assert_eq!(result.reason, BUSY_REASON);
        assert!(h.powered());
        assert!(h.bus.published().is_empty());
        assert_eq!(h.lines.line(27).unwrap().write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_when_idle() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);

        let result = h.engine.submit_command("prusa1", Action::PowerOff);

        assert!(result.accepted);
        assert!(!h.powered());
        // active-low: off is high
        assert!(h.lines.line(17).unwrap().level());
        assert!(h.lines.line(27).unwrap().level());
        assert_eq!(h.bus.published_to(POWER_STATE), vec!["1", "0"]);
        assert_eq!(h.bus.published_to(RPI_STATE), vec!["1", "0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_off_is_guarded() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, PRINTING);

        let result = h.engine.submit_command("prusa1", Action::Toggle);
        assert_eq!(result.reason, BUSY_REASON);
        assert!(h.powered());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_follows_powered() {
        let h = Harness::new();
        assert!(h.engine.submit_command("prusa1", Action::Toggle).accepted);
        assert!(h.powered());
        assert!(h.engine.submit_command("prusa1", Action::Toggle).accepted);
        assert!(!h.powered());
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_twice() {
        let h = Harness::new();

        assert!(h.engine.submit_command("prusa1", Action::PowerOn).accepted);
        assert!(h.engine.submit_command("prusa1", Action::PowerOn).accepted);

        assert!(h.powered());
        assert_eq!(h.bus.published_to(POWER_STATE), vec!["1", "1"]);
        let power = h.lines.line(27).unwrap();
        assert!(!power.level());
        assert_eq!(power.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_cancels_nothing() {
        let h = Harness::new();
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, OPERATIONAL);

        h.engine.submit_command("prusa1", Action::PowerOn);
        assert!(h.standby_pending());
    }
}

// ============================================================================
// Standby timer
// ============================================================================

mod standby_timer {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn idle_powers_off_after_timeout() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, OPERATIONAL);
        assert!(h.standby_pending());

        sleep(Duration::from_secs(299)).await;
        assert!(h.powered());

        sleep(Duration::from_secs(2)).await;
        assert!(!h.powered());
        assert!(!h.standby_pending());
        assert_eq!(h.bus.published_to(POWER_STATE), vec!["1", "0"]);
        assert_eq!(h.bus.published_to(RPI_STATE), vec!["1", "0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_idle_keeps_one_timer() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);
        h.send(CONNECTED, "connected");

        for _ in 0..3 {
            h.send(PROGRESS, OPERATIONAL);
            sleep(Duration::from_secs(200)).await;
        }
        assert!(h.powered());

        sleep(Duration::from_secs(101)).await;
        assert!(!h.powered());
        assert_eq!(h.bus.published_to(POWER_STATE), vec!["1", "0"]);

        sleep(Duration::from_secs(600)).await;
        assert_eq!(h.bus.published_to(POWER_STATE), vec!["1", "0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_cancels_timer() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, OPERATIONAL);
        sleep(Duration::from_secs(100)).await;

        h.send(PROGRESS, PRINTING);
        assert!(!h.standby_pending());

        sleep(Duration::from_secs(600)).await;
        assert!(h.powered());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_power_off_cancels_timer() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, OPERATIONAL);

        assert!(h.engine.submit_command("prusa1", Action::PowerOff).accepted);
        assert!(!h.standby_pending());

        sleep(Duration::from_secs(600)).await;
        assert_eq!(h.bus.published_to(POWER_STATE), vec!["1", "0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_while_offline_schedules_nothing() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, OPERATIONAL);
        h.send(CONNECTED, "disconnected");

        h.send(PROGRESS, OPERATIONAL);
        assert!(h.idle());
        assert!(!h.standby_pending());

        sleep(Duration::from_secs(600)).await;
        assert!(h.powered());
    }

    #[tokio::test(start_paused = true)]
    async fn timers_are_per_device() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);
        h.engine.submit_command("prusa2", Action::PowerOn);
        h.send(CONNECTED, "connected");
        h.send("octoprint/prusa2/mqtt", "connected");

        h.send(PROGRESS, OPERATIONAL);
        h.send("octoprint/prusa2/event/PrintProgress", PRINTING);

        sleep(Duration::from_secs(301)).await;
        let snapshot = h.engine.snapshot();
        assert!(!snapshot.device("prusa1").unwrap().powered);
        assert!(snapshot.device("prusa2").unwrap().powered);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_timers() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, OPERATIONAL);

        h.engine.shutdown();
        assert!(!h.standby_pending());

        sleep(Duration::from_secs(600)).await;
        assert!(h.powered());
    }
}

// ============================================================================
// Inbound messages
// ============================================================================

mod inbound {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn progress_flags_forms() {
        let h = Harness::new();
        h.send(CONNECTED, "connected");

        h.send(PROGRESS, r#"{"state":{"flags":{"operational":true,"finishing":false}}}"#);
        assert!(!h.idle());

        h.send(PROGRESS, r#"{"state":{"flags":{"operational":true,"finishing":true}}}"#);
        assert!(h.idle());

        h.send(PROGRESS, r#"{"flags":{"operational":true}}"#);
        assert!(!h.idle());

        h.send(PROGRESS, r#"{"flags":{"operational":false}}"#);
        assert!(h.idle());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_state_id_forms() {
        let h = Harness::new();
        h.send(CONNECTED, "connected");

        h.send(PROGRESS, PRINTING);
        assert!(!h.idle());
        h.send(PROGRESS, r#"{"state_id":"ERROR"}"#);
        assert!(h.idle());
        h.send(PROGRESS, r#"{"state_id":"PAUSED"}"#);
        assert!(!h.idle());
        h.send(PROGRESS, OPERATIONAL);
        assert!(h.idle());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_progress_changes_nothing() {
        let h = Harness::new();
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, OPERATIONAL);
        let before = h.engine.snapshot();

        h.send(PROGRESS, "not json");
        h.send(PROGRESS, r#"{"progress":{"completion":12}}"#);
        h.send(PROGRESS, r#"{"state":{"flags":{"printing":true}}}"#);

        assert_eq!(h.engine.snapshot(), before);
        assert!(h.standby_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_progress_keeps_busy() {
        let h = Harness::new();
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, PRINTING);

        h.send(PROGRESS, "{");
        assert!(!h.idle());
        assert!(!h.standby_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_keeps_idle_flag() {
        let h = Harness::new();
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, PRINTING);

        h.send(CONNECTED, "disconnected");

        let snapshot = h.engine.snapshot();
        let device = snapshot.device("prusa1").unwrap();
        assert!(!device.online);
        assert!(!device.idle);
        assert_eq!(device.state, DeviceState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_payload_variants() {
        let h = Harness::new();
        assert_eq!(
            h.engine.snapshot().device("prusa1").unwrap().state,
            DeviceState::Unknown
        );

        for (payload, online) in [("ONLINE", true), ("0", false), ("true", true), ("offline", false)] {
            h.send(CONNECTED, payload);
            assert_eq!(h.engine.snapshot().device("prusa1").unwrap().online, online);
        }

        h.send(CONNECTED, "maybe");
        assert!(!h.engine.snapshot().device("prusa1").unwrap().online);
    }

    #[tokio::test(start_paused = true)]
    async fn power_and_rpi_commands_drive_both_lines() {
        let h = Harness::new();

        h.send("prusa1/power/cmd", "1");
        assert!(h.powered());
        assert!(!h.lines.line(17).unwrap().level());

        h.send("prusa1/rpi/cmd", "0");
        assert!(!h.powered());
        assert!(h.lines.line(27).unwrap().level());

        h.send("prusa1/power/cmd", "on");
        assert!(!h.powered());
    }

    #[tokio::test(start_paused = true)]
    async fn bus_power_off_is_guarded() {
        let h = Harness::new();
        h.send("prusa1/power/cmd", "1");
        h.send(CONNECTED, "connected");
        h.send(PROGRESS, PRINTING);

        h.send("prusa1/power/cmd", "0");
        assert!(h.powered());
    }
}

// ============================================================================
// Lights
// ============================================================================

mod lights {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn toggle_flips_state() {
        let h = Harness::new();
        assert!(h.engine.submit_command("lights", Action::Toggle).accepted);
        assert!(h.engine.snapshot().light);
        assert!(h.engine.submit_command("lights", Action::Toggle).accepted);
        assert!(!h.engine.snapshot().light);
        assert_eq!(h.bus.published_to("lights/state"), vec!["1", "0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn not_coupled_by_default() {
        let h = Harness::new();
        h.send(CONNECTED, "connected");
        assert!(!h.engine.snapshot().light);
        assert!(h.bus.published_to("lights/state").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn follow_printers() {
        let config = Config::from_json(&config_json(true)).unwrap();
        let h = Harness::with_config(&config);

        h.send(CONNECTED, "connected");
        assert!(h.engine.snapshot().light);
        h.send("octoprint/prusa2/mqtt", "connected");
        h.send(CONNECTED, "disconnected");
        assert!(h.engine.snapshot().light);

        h.send("octoprint/prusa2/mqtt", "disconnected");
        assert!(!h.engine.snapshot().light);
        assert_eq!(h.bus.published_to("lights/state"), vec!["1", "0"]);
    }
}

// ============================================================================
// Failures
// ============================================================================

mod failures {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn gpio_failure_is_rejected() {
        let h = Harness::new();
        h.lines.line(27).unwrap().set_failing(true);

        let result = h.engine.submit_command("prusa1", Action::PowerOn);

        assert!(!result.accepted);
        assert!(result.reason.starts_with("gpio write failed"));
        assert!(!h.powered());
        assert!(h.bus.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn light_failure_keeps_state() {
        let h = Harness::new();
        h.lines.line(4).unwrap().set_failing(true);

        let result = h.engine.submit_command("lights", Action::PowerOn);
        assert!(!result.accepted);
        assert!(!h.engine.snapshot().light);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_still_accepted() {
        let h = Harness::new();
        h.bus.set_failing(true);

        let result = h.engine.submit_command("prusa1", Action::PowerOn);

        assert!(result.accepted);
        assert!(h.powered());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_device() {
        let h = Harness::new();
        let result = h.engine.submit_command("ender3", Action::PowerOn);
        assert!(!result.accepted);
        assert!(result.reason.contains("unknown device"));
    }
}

// ============================================================================
// Timer racing other events
// ============================================================================

mod standby_race {
    use std::sync::atomic::{AtomicBool, Ordering};

    use noodle_hub::gpio::{LineProvider, PowerLine};
    use noodle_hub::GpioError;

    use super::*;

    /// Holds one write on a line until released.
    #[derive(Debug, Clone, Default)]
    struct Gate {
        armed: Arc<AtomicBool>,
        entered: Arc<AtomicBool>,
        released: Arc<AtomicBool>,
    }

    impl Gate {
        async fn wait_entered(&self) {
            while !self.entered.load(Ordering::Acquire) {
                sleep(Duration::from_millis(5)).await;
            }
        }
    }

    #[derive(Debug)]
    struct GatedLine {
        inner: Box<dyn PowerLine>,
        gate: Gate,
    }

    impl PowerLine for GatedLine {
        fn number(&self) -> u32 {
            self.inner.number()
        }

        fn set(&mut self, level: bool) -> Result<(), GpioError> {
            if self.gate.armed.swap(false, Ordering::AcqRel) {
                self.gate.entered.store(true, Ordering::Release);
                while !self.gate.released.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            self.inner.set(level)
        }
    }

    /// Memory lines where writes to `gated` pass through a [`Gate`].
    struct GatedProvider {
        lines: MemoryLineProvider,
        gated: u32,
        gate: Gate,
    }

    impl LineProvider for GatedProvider {
        fn open(&self, number: u32) -> Result<Box<dyn PowerLine>, GpioError> {
            let inner = self.lines.open(number)?;
            if number == self.gated {
                Ok(Box::new(GatedLine {
                    inner,
                    gate: self.gate.clone(),
                }))
            } else {
                Ok(inner)
            }
        }
    }

    fn config_with_timeout(secs: u64) -> Config {
        let json = config_json(false).replace(
            "\"standby-timeout\": 300",
            &format!("\"standby-timeout\": {secs}"),
        );
        Config::from_json(&json).unwrap()
    }

    /// A timer that fires while a manual power-off holds the engine is
    /// already running and cannot be aborted; it must not act afterwards.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timer_fired_during_power_off_is_stale() {
        let config = config_with_timeout(1);
        let bus = MemoryBus::new();
        let gate = Gate::default();
        let provider = GatedProvider {
            lines: MemoryLineProvider::new(),
            gated: 17,
            gate: gate.clone(),
        };
        let engine = Engine::builder(Registry::from_config(&config).unwrap())
            .with_config(&config)
            .build(Arc::new(bus.clone()), &provider)
            .unwrap();

        assert!(engine.submit_command("prusa1", Action::PowerOn).accepted);
        engine.handle_message(CONNECTED, "connected");
        engine.handle_message(PROGRESS, OPERATIONAL);
        sleep(Duration::from_millis(500)).await;

        gate.armed.store(true, Ordering::Release);
        let off = {
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || engine.submit_command("prusa1", Action::PowerOff))
        };
        gate.wait_entered().await;

        // Past the deadline: the timer callback is now waiting on the engine.
        sleep(Duration::from_millis(1000)).await;
        gate.released.store(true, Ordering::Release);

        assert!(off.await.unwrap().accepted);
        sleep(Duration::from_millis(200)).await;

        let snapshot = engine.snapshot();
        let prusa1 = snapshot.device("prusa1").unwrap();
        assert!(!prusa1.powered);
        assert!(!prusa1.standby_pending);
        assert_eq!(bus.published_to(POWER_STATE), vec!["1", "0"]);
        assert_eq!(bus.published_to(RPI_STATE), vec!["1", "0"]);
    }

    /// Busy arriving at the instant a zero timeout fires: whichever wins,
    /// nothing changes once the busy event has been handled.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn busy_at_timer_deadline() {
        let config = config_with_timeout(0);

        for _ in 0..50 {
            let h = Harness::with_config(&config);
            h.engine.submit_command("prusa1", Action::PowerOn);
            h.send(CONNECTED, "connected");
            h.send(PROGRESS, OPERATIONAL);
            h.send(PROGRESS, PRINTING);

            let powered = h.powered();
            let published = h.bus.published_to(POWER_STATE);
            assert!(!h.standby_pending());

            sleep(Duration::from_millis(10)).await;
            assert_eq!(h.powered(), powered);
            assert_eq!(h.bus.published_to(POWER_STATE), published);
            assert!(!h.idle());
        }
    }
}

// ============================================================================
// Scenario
// ============================================================================

mod scenario {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn print_then_manual_power_off() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);

        h.send(CONNECTED, "connected");
        h.send(PROGRESS, PRINTING);
        assert!(!h.engine.submit_command("prusa1", Action::PowerOff).accepted);

        h.send(PROGRESS, OPERATIONAL);
        assert_eq!(
            h.engine.snapshot().device("prusa1").unwrap().state,
            DeviceState::OnlineIdle
        );
        assert!(h.engine.submit_command("prusa1", Action::PowerOff).accepted);
        assert_eq!(h.bus.published_to(POWER_STATE).last().unwrap(), "0");
    }

    #[tokio::test(start_paused = true)]
    async fn print_then_standby() {
        let h = Harness::new();
        h.engine.submit_command("prusa1", Action::PowerOn);

        h.send(CONNECTED, "connected");
        h.send(PROGRESS, PRINTING);
        sleep(Duration::from_secs(1000)).await;
        assert!(h.powered());

        h.send(PROGRESS, OPERATIONAL);
        sleep(Duration::from_secs(301)).await;

        assert!(!h.powered());
        assert_eq!(h.bus.published_to(POWER_STATE), vec!["1", "0"]);
        assert_eq!(h.bus.published_to(RPI_STATE), vec!["1", "0"]);
    }
}

// ============================================================================
// Registry validation
// ============================================================================

mod registry {
    use super::*;

    #[test]
    fn overlapping_gpio_is_rejected() {
        let json = config_json(false).replace("\"power-gpio\": 23", "\"power-gpio\": 27");
        let config = Config::from_json(&json).unwrap();

        let result = Registry::from_config(&config);
        assert!(matches!(result, Err(ConfigError::DuplicateGpio { gpio: 27, .. })));
    }

    #[test]
    fn light_gpio_overlap_is_rejected() {
        let json = config_json(false).replace("\"raspi-gpio\": 22", "\"raspi-gpio\": 4");
        let config = Config::from_json(&json).unwrap();

        let result = Registry::from_config(&config);
        assert!(matches!(result, Err(ConfigError::DuplicateGpio { gpio: 4, .. })));
    }
}
