//! In-memory simulator bridge for tests.
//!
//! Clock events mutate the f32 at every registered target address of a shared
//! [`MockMemory`], which is how the real simulator reacts to
//! `CLOCK_MINUTES_DEC`/`CLOCK_MINUTES_INC`.

use std::collections::{HashMap, VecDeque};

use crate::bridge::{BridgeConnector, SimBridge, events};
use crate::error::{Error, Result};
use crate::memory::MockMemory;

#[derive(Debug)]
pub struct MockBridge {
    memory: Option<MockMemory>,
    clock_targets: Vec<u64>,
    step_seconds: f32,
    ok: bool,
    not_ok_polls: u32,
    paused: bool,
    steady: HashMap<String, f64>,
    scripted: HashMap<String, VecDeque<Option<f64>>>,
    fail_events: bool,
    pub fired: Vec<(String, u32)>,
}

impl MockBridge {
    pub fn new() -> Self {
        Self {
            memory: None,
            clock_targets: Vec::new(),
            step_seconds: 60.0,
            ok: true,
            not_ok_polls: 0,
            paused: false,
            steady: HashMap::new(),
            scripted: HashMap::new(),
            fail_events: false,
            fired: Vec::new(),
        }
    }

    /// Make clock events move the offset stored at `targets`.
    pub fn with_clock(mut self, memory: MockMemory, targets: &[u64]) -> Self {
        self.memory = Some(memory);
        self.clock_targets = targets.to_vec();
        self
    }

    /// Seconds a single clock event moves the offset (60 for a well-behaved simulator).
    pub fn with_step_seconds(mut self, seconds: f32) -> Self {
        self.step_seconds = seconds;
        self
    }

    /// Report "not ok" for the first `polls` calls to `is_ok`.
    pub fn not_ok_for(mut self, polls: u32) -> Self {
        self.not_ok_polls = polls;
        self
    }

    pub fn with_variable(mut self, name: &str, value: f64) -> Self {
        self.steady.insert(name.to_string(), value);
        self
    }

    /// Values returned by successive reads, before falling back to the steady value.
    pub fn script_variable(&mut self, name: &str, values: &[Option<f64>]) {
        self.scripted
            .entry(name.to_string())
            .or_default()
            .extend(values.iter().copied());
    }

    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.steady.insert(name.to_string(), value);
    }

    pub fn set_ok(&mut self, ok: bool) {
        self.ok = ok;
    }

    pub fn set_fail_events(&mut self, fail: bool) {
        self.fail_events = fail;
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn count(&self, event: &str) -> usize {
        self.fired.iter().filter(|(name, _)| name == event).count()
    }
}

impl SimBridge for MockBridge {
    fn is_ok(&mut self) -> bool {
        if self.not_ok_polls > 0 {
            self.not_ok_polls -= 1;
            return false;
        }
        self.ok
    }

    fn is_paused(&mut self) -> bool {
        self.paused
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.trigger_event(events::PAUSE_SET, paused as u32)
    }

    fn get_variable(&mut self, name: &str) -> Option<f64> {
        if let Some(queue) = self.scripted.get_mut(name)
            && let Some(value) = queue.pop_front()
        {
            return value;
        }
        self.steady.get(name).copied()
    }

    fn trigger_event(&mut self, name: &str, param: u32) -> Result<()> {
        if self.fail_events {
            return Err(Error::EventFailed {
                event: name.to_string(),
                message: "bridge closed".to_string(),
            });
        }
        self.fired.push((name.to_string(), param));

        let delta = match name {
            events::CLOCK_MINUTES_DEC => -self.step_seconds * param as f32,
            events::CLOCK_MINUTES_INC => self.step_seconds * param as f32,
            events::PAUSE_SET => {
                self.paused = param != 0;
                return Ok(());
            }
            _ => return Ok(()),
        };

        if let Some(memory) = &self.memory {
            for &target in &self.clock_targets {
                memory.add_f32(target, delta);
            }
        }
        Ok(())
    }
}

/// Hands out prepared bridges; fails while the queue is empty.
pub struct MockConnector {
    pub failures_before_connect: u32,
    pub bridges: VecDeque<MockBridge>,
    pub attempts: u32,
}

impl MockConnector {
    pub fn new(bridges: Vec<MockBridge>) -> Self {
        Self {
            failures_before_connect: 0,
            bridges: bridges.into(),
            attempts: 0,
        }
    }
}

impl BridgeConnector for MockConnector {
    type Bridge = MockBridge;

    fn connect(&mut self) -> Result<MockBridge> {
        self.attempts += 1;
        if self.failures_before_connect > 0 {
            self.failures_before_connect -= 1;
            return Err(Error::BridgeUnavailable("simulator not running".to_string()));
        }
        self.bridges
            .pop_front()
            .ok_or_else(|| Error::BridgeUnavailable("no more mock bridges".to_string()))
    }
}
