//! Rate synchronization loop.
//!
//! The simulator only advances its clock at 1x regardless of the simulation
//! rate. Each tick converts the time elapsed at the current rate into whole
//! seconds and adds them to the seconds offset in the simulator's memory.

mod drift;

pub use drift::DriftAccumulator;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::autoapp::{RateCrossingHook, crosses_real_time};
use crate::bridge::{SimBridge, variables};
use crate::clock::Clock;
use crate::control::ControlCommand;
use crate::error::Result;
use crate::memory::{ReadMemory, WriteMemory};
use crate::state::SharedState;

/// Per-session rate bookkeeping
#[derive(Debug, Clone, Default)]
pub struct RateState {
    /// Rate observed on the last tick; `None` before the first tick
    pub current_rate: Option<f64>,
    /// Last non-zero rate the auxiliary application was aligned with
    pub running_rate: Option<f64>,
    pub drift: DriftAccumulator,
    /// Last value read from or written to the offset, for reporting only
    pub last_applied_offset: f32,
}

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub rate: f64,
    /// Whether the bridge still reported itself connected
    pub bridge_ok: bool,
    /// Whole seconds added to the offset this tick
    pub correction: i64,
    /// Offset value after the tick
    pub offset: f32,
    pub command: Option<ControlCommand>,
}

pub struct RateSynchronizer {
    address: u64,
    last_tick: Duration,
    state: RateState,
    hook: Option<Arc<dyn RateCrossingHook>>,
}

impl RateSynchronizer {
    /// Start synchronizing the offset at `address`; `now` is the clock reading
    /// the first tick measures from.
    pub fn new(address: u64, now: Duration) -> Self {
        Self {
            address,
            last_tick: now,
            state: RateState::default(),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn RateCrossingHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn state(&self) -> &RateState {
        &self.state
    }

    /// Run one tick. Memory errors end the session and are returned unchanged.
    pub fn tick<P, B, C>(
        &mut self,
        process: &P,
        bridge: &mut B,
        clock: &C,
        shared: &SharedState,
    ) -> Result<TickReport>
    where
        P: ReadMemory + WriteMemory + ?Sized,
        B: SimBridge + ?Sized,
        C: Clock + ?Sized,
    {
        let now = clock.now();
        let wall_delta = now.saturating_sub(self.last_tick).as_secs_f64();
        self.last_tick = now;

        let command = shared.take_command();
        let mut reset = false;
        if let Some(command) = command {
            reset = self.apply_command(command, process, bridge, clock, shared)?;
        }

        let ok = bridge.is_ok();
        let paused = bridge.is_paused();
        shared.lock().bridge_status = format!("OK: {ok} - Paused: {paused}");

        let rate = self.observe_rate(bridge, paused, shared);

        let correction = if reset || !ok {
            0
        } else {
            self.state.drift.accumulate(wall_delta, rate)
        };

        let current = process.read_f32(self.address)?;
        let offset = if correction != 0 {
            let updated = current + correction as f32;
            process.write_f32(self.address, updated)?;
            shared.info(format!("Setting new seconds offset: {}", updated as i64));
            updated
        } else {
            current
        };
        self.state.last_applied_offset = offset;

        let absolute_time = bridge.get_variable(variables::ABSOLUTE_TIME);
        {
            let mut state = shared.lock();
            state.seconds_offset = offset as i64;
            if absolute_time.is_some() {
                state.reported_absolute_time = absolute_time;
            }
        }

        Ok(TickReport {
            rate,
            bridge_ok: ok,
            correction,
            offset,
            command,
        })
    }

    /// Returns whether the command reset the offset.
    fn apply_command<P, B, C>(
        &mut self,
        command: ControlCommand,
        process: &P,
        bridge: &mut B,
        clock: &C,
        shared: &SharedState,
    ) -> Result<bool>
    where
        P: ReadMemory + WriteMemory + ?Sized,
        B: SimBridge + ?Sized,
        C: Clock + ?Sized,
    {
        match command {
            ControlCommand::Pause => {
                shared.info("Forcing pause...");
                bridge.set_paused(true)?;
                Ok(false)
            }
            ControlCommand::Resume => {
                shared.info("Forcing resume...");
                bridge.set_paused(false)?;
                Ok(false)
            }
            ControlCommand::ResetToLiveTime | ControlCommand::ResetToAbsoluteTime(_) => {
                let Some(target) = command.reset_target(clock.utc_now()) else {
                    return Ok(false);
                };
                let current = process.read_f32(self.address)?;
                process.write_f32(self.address, target as f32)?;
                self.state.drift.clear();
                shared.info(format!(
                    "{}: seconds offset {} -> {}",
                    command, current as i64, target as i64
                ));
                Ok(true)
            }
        }
    }

    fn observe_rate<B: SimBridge + ?Sized>(
        &mut self,
        bridge: &mut B,
        paused: bool,
        shared: &SharedState,
    ) -> f64 {
        let previous = self.state.current_rate;

        let (rate, annotation) = if paused {
            (0.0, " (Paused)")
        } else if bridge
            .get_variable(variables::IS_SLEW_ACTIVE)
            .is_some_and(|slew| slew != 0.0)
        {
            (0.0, " (Slew Mode Active)")
        } else {
            match bridge.get_variable(variables::SIMULATION_RATE) {
                Some(rate) => (rate.max(0.0), ""),
                None => {
                    debug!("Simulation rate unavailable, keeping previous value");
                    (previous.unwrap_or(1.0), "")
                }
            }
        };

        if previous == Some(rate) {
            return rate;
        }

        self.state.current_rate = Some(rate);
        let display = format!("{rate}x{annotation}");
        shared.info(format!("Current simulation rate: {display}"));
        {
            let mut state = shared.lock();
            state.rate_display = display;
            state.current_rate = Some(rate);
        }

        // A pause keeps the rate from before it, so 8x -> pause -> 1x still crosses
        let crossed = match self.state.running_rate {
            None => previous.is_none(),
            Some(running) => crosses_real_time(running, rate),
        };
        if rate != 0.0 {
            self.state.running_rate = Some(rate);
        } else if previous.is_none() {
            self.state.running_rate = Some(1.0);
        }
        if crossed
            && let Some(hook) = &self.hook
            && let Some(app) = shared.autoapp_target()
        {
            hook.on_crossing(rate, &app, shared);
        }

        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::events;
    use crate::bridge::mock::MockBridge;
    use crate::clock::ManualClock;
    use crate::memory::{MockMemory, MockMemoryBuilder};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    const BASE: u64 = 0x1_4000_0000;
    const OFFSET: u64 = BASE + 0x80;
    const TICK: Duration = Duration::from_millis(250);

    struct Fixture {
        memory: MockMemory,
        bridge: MockBridge,
        clock: ManualClock,
        shared: SharedState,
        sync: RateSynchronizer,
    }

    impl Fixture {
        fn new(rate: f64, offset: f32) -> Self {
            let memory = MockMemoryBuilder::new(BASE, 0x100).build();
            memory.put_f32(OFFSET, offset);
            let clock = ManualClock::new();
            let sync = RateSynchronizer::new(OFFSET, clock.now());
            Self {
                memory,
                bridge: MockBridge::new().with_variable(variables::SIMULATION_RATE, rate),
                clock,
                shared: SharedState::new(),
                sync,
            }
        }

        fn tick_after(&mut self, wall: Duration) -> TickReport {
            self.clock.advance(wall);
            self.sync
                .tick(&self.memory, &mut self.bridge, &self.clock, &self.shared)
                .unwrap()
        }

        fn run_for(&mut self, wall: Duration) -> i64 {
            let ticks = (wall.as_millis() / TICK.as_millis()) as usize;
            (0..ticks).map(|_| self.tick_after(TICK).correction).sum()
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        calls: Mutex<Vec<(f64, PathBuf)>>,
    }

    impl RateCrossingHook for RecordingHook {
        fn on_crossing(&self, rate: f64, app: &Path, _shared: &SharedState) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((rate, app.to_path_buf()));
            }
        }
    }

    #[test]
    fn test_exact_correction_scenario() {
        let mut fx = Fixture::new(2.0, 100.0);
        fx.tick_after(Duration::from_millis(250));
        fx.tick_after(Duration::from_millis(250));
        let report = fx.tick_after(Duration::from_millis(100));
        assert_eq!(report.correction, 0);
        assert_eq!(fx.memory.write_count(), 0);

        let report = fx.tick_after(Duration::from_millis(500));
        assert_eq!(report.correction, 1);
        assert_eq!(report.offset, 101.0);
        assert_eq!(fx.memory.f32_at(OFFSET), 101.0);
        assert!((fx.sync.state().drift.pending() - 0.1).abs() < 1e-9);
        assert_eq!(fx.shared.snapshot().seconds_offset, 101);
    }

    #[test]
    fn test_freeze_scenario_does_not_catch_up() {
        let mut fx = Fixture::new(1.0, 0.0);
        assert_eq!(fx.run_for(Duration::from_secs(10)), 0);

        fx.shared.submit_command(ControlCommand::Pause);
        let paused_total = fx.run_for(Duration::from_secs(5));
        assert_eq!(paused_total, -5);
        assert!(fx.bridge.paused());

        fx.shared.submit_command(ControlCommand::Resume);
        assert_eq!(fx.run_for(Duration::from_secs(10)), 0);
        assert!(!fx.bridge.paused());
        assert_eq!(fx.memory.f32_at(OFFSET), -5.0);
    }

    #[test]
    fn test_correction_rereads_externally_mutated_value() {
        let mut fx = Fixture::new(5.0, 0.0);
        let report = fx.tick_after(Duration::from_millis(250));
        assert_eq!(report.correction, 1);
        assert_eq!(report.offset, 1.0);

        // The simulator's own time UI moves the clock
        fx.memory.put_f32(OFFSET, 3600.0);

        let report = fx.tick_after(Duration::from_millis(250));
        assert_eq!(report.correction, 1);
        assert_eq!(report.offset, 3601.0);
        assert_eq!(fx.memory.f32_at(OFFSET), 3601.0);
    }

    #[test]
    fn test_repeated_pause_commands_match_single_pause() {
        let mut once = Fixture::new(3.0, 0.0);
        let mut repeated = Fixture::new(3.0, 0.0);

        once.shared.submit_command(ControlCommand::Pause);
        for _ in 0..6 {
            repeated.shared.submit_command(ControlCommand::Pause);
            once.tick_after(TICK);
            repeated.tick_after(TICK);
        }

        assert_eq!(once.sync.state().drift, repeated.sync.state().drift);
        assert_eq!(once.memory.f32_at(OFFSET), repeated.memory.f32_at(OFFSET));
        assert!(repeated.bridge.paused());
        assert_eq!(repeated.bridge.count(events::PAUSE_SET), 6);
    }

    #[test]
    fn test_missing_rate_keeps_previous_value() {
        let mut fx = Fixture::new(4.0, 0.0);
        fx.tick_after(TICK);
        fx.bridge
            .script_variable(variables::SIMULATION_RATE, &[None, None]);

        assert_eq!(fx.tick_after(TICK).rate, 4.0);
        assert_eq!(fx.tick_after(TICK).rate, 4.0);
    }

    #[test]
    fn test_first_tick_defaults_to_real_time_without_rate() {
        let mut fx = Fixture::new(1.0, 0.0);
        fx.bridge = MockBridge::new();
        let report = fx.tick_after(TICK);
        assert_eq!(report.rate, 1.0);
        assert_eq!(report.correction, 0);
    }

    #[test]
    fn test_slew_freezes_rate() {
        let mut fx = Fixture::new(2.0, 0.0);
        fx.bridge.set_variable(variables::IS_SLEW_ACTIVE, 1.0);
        let report = fx.tick_after(TICK);
        assert_eq!(report.rate, 0.0);
        assert_eq!(fx.shared.snapshot().rate_display, "0x (Slew Mode Active)");
    }

    #[test]
    fn test_rate_display_and_bridge_status() {
        let mut fx = Fixture::new(2.0, 0.0);
        fx.tick_after(TICK);
        let snapshot = fx.shared.snapshot();
        assert_eq!(snapshot.rate_display, "2x");
        assert_eq!(snapshot.bridge_status, "OK: true - Paused: false");

        fx.shared.submit_command(ControlCommand::Pause);
        fx.tick_after(TICK);
        assert_eq!(fx.shared.snapshot().rate_display, "0x (Paused)");
    }

    #[test]
    fn test_rate_change_is_logged_once() {
        let mut fx = Fixture::new(2.0, 0.0);
        fx.tick_after(TICK);
        fx.tick_after(TICK);
        fx.tick_after(TICK);
        let rate_lines = fx
            .shared
            .drain_logs()
            .into_iter()
            .filter(|line| line.contains("Current simulation rate"))
            .count();
        assert_eq!(rate_lines, 1);
    }

    #[test]
    fn test_reset_to_live_time() {
        let mut fx = Fixture::new(2.0, 5400.0);
        fx.tick_after(Duration::from_millis(500));
        fx.shared.submit_command(ControlCommand::ResetToLiveTime);

        let report = fx.tick_after(TICK);
        assert_eq!(report.command, Some(ControlCommand::ResetToLiveTime));
        assert_eq!(report.correction, 0);
        assert_eq!(report.offset, 0.0);
        assert_eq!(fx.sync.state().drift.pending(), 0.0);
    }

    #[test]
    fn test_reset_to_absolute_time() {
        let mut fx = Fixture::new(1.0, 0.0);
        let target = fx.clock.utc_now() + chrono::Duration::hours(-2) + chrono::Duration::milliseconds(250);
        fx.shared
            .submit_command(ControlCommand::ResetToAbsoluteTime(target));

        let report = fx.tick_after(TICK);
        assert_eq!(report.offset, -7200.0);
    }

    #[test]
    fn test_memory_failure_ends_session() {
        let mut fx = Fixture::new(2.0, 0.0);
        fx.memory.set_fail_reads(true);
        fx.clock.advance(TICK);
        let result = fx
            .sync
            .tick(&fx.memory, &mut fx.bridge, &fx.clock, &fx.shared);
        assert!(result.unwrap_err().is_process_io());
    }

    #[test]
    fn test_hook_fires_on_first_tick_and_crossings() {
        let hook = Arc::new(RecordingHook::default());
        let mut fx = Fixture::new(1.0, 0.0);
        fx.sync = RateSynchronizer::new(OFFSET, fx.clock.now()).with_hook(hook.clone());
        let app = PathBuf::from(r"C:\Tools\helper.exe");
        fx.shared.set_autoapp(true, Some(app.clone()));

        fx.tick_after(TICK);
        fx.bridge.set_variable(variables::SIMULATION_RATE, 4.0);
        fx.tick_after(TICK);
        fx.bridge.set_variable(variables::SIMULATION_RATE, 8.0);
        fx.tick_after(TICK);
        fx.shared.submit_command(ControlCommand::Pause);
        fx.tick_after(TICK);
        fx.shared.submit_command(ControlCommand::Resume);
        fx.bridge.set_variable(variables::SIMULATION_RATE, 1.0);
        fx.tick_after(TICK);

        let calls = hook.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![(1.0, app.clone()), (4.0, app.clone()), (1.0, app)]
        );
    }

    #[test]
    fn test_hook_compares_against_rate_before_pause() {
        let hook = Arc::new(RecordingHook::default());
        let mut fx = Fixture::new(1.0, 0.0);
        fx.sync = RateSynchronizer::new(OFFSET, fx.clock.now()).with_hook(hook.clone());
        fx.shared
            .set_autoapp(true, Some(PathBuf::from(r"C:\Tools\helper.exe")));

        fx.tick_after(TICK);
        fx.bridge.set_variable(variables::SIMULATION_RATE, 8.0);
        fx.tick_after(TICK);
        for resume_rate in [1.0, 4.0] {
            fx.shared.submit_command(ControlCommand::Pause);
            fx.tick_after(TICK);
            fx.shared.submit_command(ControlCommand::Resume);
            fx.bridge.set_variable(variables::SIMULATION_RATE, resume_rate);
            fx.tick_after(TICK);
        }
        // Same side of 1x on both ends of a pause
        fx.shared.submit_command(ControlCommand::Pause);
        fx.tick_after(TICK);
        fx.shared.submit_command(ControlCommand::Resume);
        fx.bridge.set_variable(variables::SIMULATION_RATE, 2.0);
        fx.tick_after(TICK);

        let rates: Vec<f64> = hook
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(rate, _)| *rate)
            .collect();
        assert_eq!(rates, vec![1.0, 8.0, 1.0, 4.0]);
    }

    #[test]
    fn test_paused_first_tick_counts_as_real_time() {
        let hook = Arc::new(RecordingHook::default());
        let mut fx = Fixture::new(4.0, 0.0);
        fx.sync = RateSynchronizer::new(OFFSET, fx.clock.now()).with_hook(hook.clone());
        fx.shared
            .set_autoapp(true, Some(PathBuf::from(r"C:\Tools\helper.exe")));

        fx.shared.submit_command(ControlCommand::Pause);
        fx.tick_after(TICK);
        fx.shared.submit_command(ControlCommand::Resume);
        fx.tick_after(TICK);

        let rates: Vec<f64> = hook
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(rate, _)| *rate)
            .collect();
        assert_eq!(rates, vec![0.0, 4.0]);
    }

    #[test]
    fn test_no_correction_when_bridge_is_down() {
        let mut fx = Fixture::new(5.0, 0.0);
        fx.bridge.set_ok(false);
        let report = fx.tick_after(Duration::from_secs(1));
        assert!(!report.bridge_ok);
        assert_eq!(report.correction, 0);
        assert_eq!(fx.memory.write_count(), 0);
        assert_eq!(fx.sync.state().drift.pending(), 0.0);
    }

    #[test]
    fn test_hook_skipped_when_disabled() {
        let hook = Arc::new(RecordingHook::default());
        let mut fx = Fixture::new(2.0, 0.0);
        fx.sync = RateSynchronizer::new(OFFSET, fx.clock.now()).with_hook(hook.clone());

        fx.tick_after(TICK);
        assert!(hook.calls.lock().unwrap().is_empty());
    }
}
