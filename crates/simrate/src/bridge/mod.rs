//! Event/request bridge to the running simulator.
//!
//! The rest of the crate only talks to the simulator through [`SimBridge`]: reading
//! simulation variables, firing key events and toggling pause. On Windows the
//! bridge is backed by SimConnect; tests use an in-memory simulation.

mod simconnect;

#[cfg(test)]
pub mod mock;

pub use simconnect::{SimConnectBridge, SimConnectConnector};

use std::time::Duration;

use tracing::debug;

use crate::clock::Clock;
use crate::error::{Error, Result};

/// Key events fired through the bridge
pub mod events {
    /// Moves the in-sim clock back one minute
    pub const CLOCK_MINUTES_DEC: &str = "CLOCK_MINUTES_DEC";
    /// Moves the in-sim clock forward one minute
    pub const CLOCK_MINUTES_INC: &str = "CLOCK_MINUTES_INC";
    /// Sets the pause state (1 = paused, 0 = running)
    pub const PAUSE_SET: &str = "PAUSE_SET";
}

/// Simulation variables read through the bridge
pub mod variables {
    pub const SIMULATION_RATE: &str = "SIMULATION RATE";
    pub const IS_SLEW_ACTIVE: &str = "IS SLEW ACTIVE";
    /// Seconds since 1/1/0001 in sim time
    pub const ABSOLUTE_TIME: &str = "ABSOLUTE TIME";

    /// SimConnect unit name for a variable
    pub fn units(name: &str) -> &'static str {
        match name {
            ABSOLUTE_TIME => "seconds",
            IS_SLEW_ACTIVE => "bool",
            _ => "number",
        }
    }
}

pub trait SimBridge {
    /// Whether the bridge is connected and the simulator answers.
    fn is_ok(&mut self) -> bool;

    fn is_paused(&mut self) -> bool;

    fn set_paused(&mut self, paused: bool) -> Result<()>;

    /// Current value of a simulation variable, or `None` if the simulator did
    /// not answer this time.
    fn get_variable(&mut self, name: &str) -> Option<f64>;

    fn trigger_event(&mut self, name: &str, param: u32) -> Result<()>;
}

/// Opens bridge connections; polled by the supervisor until the simulator accepts one.
pub trait BridgeConnector {
    type Bridge: SimBridge;

    fn connect(&mut self) -> Result<Self::Bridge>;
}

/// Connect and poll until the simulator answers, giving up after `polls` checks.
///
/// The bridge reports ready asynchronously after the connection is opened, so
/// one check right after connecting is usually too early.
pub fn wait_until_ready<BC, C>(
    connector: &mut BC,
    clock: &C,
    poll: Duration,
    polls: u32,
) -> Result<BC::Bridge>
where
    BC: BridgeConnector + ?Sized,
    C: Clock + ?Sized,
{
    let mut pending: Option<BC::Bridge> = None;
    for attempt in 0..polls {
        if attempt > 0 {
            clock.sleep(poll);
        }

        let mut bridge = match pending.take() {
            Some(bridge) => bridge,
            None => match connector.connect() {
                Ok(bridge) => bridge,
                Err(e) => {
                    debug!("Bridge connect attempt {} failed: {}", attempt + 1, e);
                    continue;
                }
            },
        };
        if bridge.is_ok() {
            return Ok(bridge);
        }
        pending = Some(bridge);
    }

    Err(Error::BridgeUnavailable(format!(
        "simulator did not answer after {polls} polls"
    )))
}
