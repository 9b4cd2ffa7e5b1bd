//! Clock-event verification of candidate addresses.
//!
//! A minute decrement moves the true seconds offset by exactly -60. Firing two
//! decrements and two increments and watching the candidate follow along is the
//! only proof we accept that an address is the one we are looking for.

use std::time::Duration;

use tracing::debug;

use crate::bridge::{SimBridge, events};
use crate::clock::Clock;
use crate::error::Result;
use crate::memory::ReadMemory;
use crate::memory::layout::clock::SECONDS_PER_STEP;

/// Fires clock events and remembers how far the in-sim clock has been moved, so
/// it can be put back.
pub struct ClockNudger<'a, B: SimBridge + ?Sized, C: Clock + ?Sized> {
    bridge: &'a mut B,
    clock: &'a C,
    settle: Duration,
    net_minutes: i32,
}

impl<'a, B: SimBridge + ?Sized, C: Clock + ?Sized> ClockNudger<'a, B, C> {
    pub fn new(bridge: &'a mut B, clock: &'a C, settle: Duration) -> Self {
        Self {
            bridge,
            clock,
            settle,
            net_minutes: 0,
        }
    }

    pub fn decrement(&mut self) -> Result<()> {
        self.fire(-1)
    }

    pub fn increment(&mut self) -> Result<()> {
        self.fire(1)
    }

    /// Minutes the clock has been moved since this nudger was created
    pub fn net_minutes(&self) -> i32 {
        self.net_minutes
    }

    /// Fire whatever events bring the net movement back to `net_minutes`.
    pub fn return_to(&mut self, net_minutes: i32) -> Result<()> {
        let delta = net_minutes - self.net_minutes;
        if delta == 0 {
            return Ok(());
        }
        self.fire(delta)
    }

    pub fn restore(&mut self) -> Result<()> {
        self.return_to(0)
    }

    fn fire(&mut self, minutes: i32) -> Result<()> {
        let event = if minutes < 0 {
            events::CLOCK_MINUTES_DEC
        } else {
            events::CLOCK_MINUTES_INC
        };
        self.bridge.trigger_event(event, minutes.unsigned_abs())?;
        self.net_minutes += minutes;
        self.clock.sleep(self.settle);
        Ok(())
    }
}

/// Run the decrement/decrement/increment/increment protocol against `address`.
///
/// Returns `Ok(false)` for a rejected candidate, after putting the clock back.
/// Errors are reserved for a failing bridge.
pub fn verify_candidate<R, B, C>(
    reader: &R,
    nudger: &mut ClockNudger<'_, B, C>,
    address: u64,
) -> Result<bool>
where
    R: ReadMemory + ?Sized,
    B: SimBridge + ?Sized,
    C: Clock + ?Sized,
{
    let initial = match reader.read_f32(address) {
        Ok(value) if value.is_finite() => value,
        Ok(value) => {
            debug!("Candidate 0x{:X} holds non-finite value {}", address, value);
            return Ok(false);
        }
        Err(e) => {
            debug!("Candidate 0x{:X} is unreadable: {}", address, e);
            return Ok(false);
        }
    };

    let start = nudger.net_minutes();
    let steps: [(i32, f32); 4] = [
        (-1, initial - SECONDS_PER_STEP),
        (-1, initial - 2.0 * SECONDS_PER_STEP),
        (1, initial - SECONDS_PER_STEP),
        (1, initial),
    ];

    for (direction, expected) in steps {
        if direction < 0 {
            nudger.decrement()?;
        } else {
            nudger.increment()?;
        }

        let observed = reader.read_f32(address).ok();
        if observed != Some(expected) {
            debug!(
                "Candidate 0x{:X} rejected: expected {}, observed {:?}",
                address, expected, observed
            );
            nudger.return_to(start)?;
            return Ok(false);
        }
    }

    Ok(true)
}
