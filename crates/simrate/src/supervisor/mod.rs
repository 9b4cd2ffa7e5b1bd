//! Connection supervisor.
//!
//! Drives one attach/discover/synchronize cycle after another:
//!
//! ```text
//! WaitingForProcess -> WaitingForBridge -> [Settling] -> LocatingOffset -> Synchronizing
//!        ^                                                                       |
//!        +------------------------- (cooldown) <---------------------------------+
//! ```
//!
//! Each call to [`Supervisor::step`] performs one poll or one tick, so tests can
//! walk the machine state by state. Only an access-denied attach in
//! non-interactive mode is fatal; everything else is retried.

use std::sync::Arc;
use std::time::Duration;

use strum::Display;

use crate::autoapp::RateCrossingHook;
use crate::bridge::{BridgeConnector, SimBridge};
use crate::clock::Clock;
use crate::config::{PRODUCT_NAME, SyncConfig};
use crate::error::{Error, Result};
use crate::memory::{ProcessProvider, ReadMemory};
use crate::offset::{OffsetLocator, OffsetProfileSet};
use crate::stop::StopToken;
use crate::state::{ConnectionStatus, SharedState};
use crate::sync::RateSynchronizer;

/// Everything tied to one attached process; dropped on disconnect.
pub struct Session<P, B> {
    pub process: P,
    pub bridge: B,
    pub base_address: u64,
}

enum Phase<P, B> {
    WaitingForProcess,
    WaitingForBridge {
        process: P,
        bridge: Option<B>,
        waited: bool,
    },
    Settling {
        session: Session<P, B>,
        remaining: Duration,
    },
    LocatingOffset {
        session: Session<P, B>,
        attempts: u32,
    },
    Synchronizing {
        session: Session<P, B>,
        sync: RateSynchronizer,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PhaseKind {
    WaitingForProcess,
    WaitingForBridge,
    Settling,
    LocatingOffset,
    Synchronizing,
}

pub struct Supervisor<PP, BC, C>
where
    PP: ProcessProvider,
    BC: BridgeConnector,
    C: Clock,
{
    config: SyncConfig,
    profiles: OffsetProfileSet,
    provider: PP,
    connector: BC,
    clock: C,
    shared: SharedState,
    stop: Arc<StopToken>,
    hook: Option<Arc<dyn RateCrossingHook>>,
    phase: Phase<PP::Process, BC::Bridge>,
    announced_wait: bool,
    announced_denied: bool,
}

impl<PP, BC, C> Supervisor<PP, BC, C>
where
    PP: ProcessProvider,
    BC: BridgeConnector,
    C: Clock,
{
    pub fn new(
        config: SyncConfig,
        profiles: OffsetProfileSet,
        provider: PP,
        connector: BC,
        clock: C,
        shared: SharedState,
    ) -> Self {
        Self {
            config,
            profiles,
            provider,
            connector,
            clock,
            shared,
            stop: Arc::new(StopToken::new()),
            hook: None,
            phase: Phase::WaitingForProcess,
            announced_wait: false,
            announced_denied: false,
        }
    }

    /// Return from `run` once `stop` is set.
    pub fn with_stop_token(mut self, stop: Arc<StopToken>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn RateCrossingHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn phase_kind(&self) -> PhaseKind {
        match self.phase {
            Phase::WaitingForProcess => PhaseKind::WaitingForProcess,
            Phase::WaitingForBridge { .. } => PhaseKind::WaitingForBridge,
            Phase::Settling { .. } => PhaseKind::Settling,
            Phase::LocatingOffset { .. } => PhaseKind::LocatingOffset,
            Phase::Synchronizing { .. } => PhaseKind::Synchronizing,
        }
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Run until stopped, or until a fatal error.
    pub fn run(&mut self) -> Result<()> {
        self.shared.info("=====================================");
        self.shared
            .info(format!("{} v{}", PRODUCT_NAME, env!("CARGO_PKG_VERSION")));
        self.shared.info("=====================================");

        while !self.stop.is_stopped() {
            self.step()?;
        }
        self.shared.info("Exiting...");
        Ok(())
    }

    /// Advance the state machine by one poll or tick.
    pub fn step(&mut self) -> Result<()> {
        let phase = std::mem::replace(&mut self.phase, Phase::WaitingForProcess);
        self.phase = match phase {
            Phase::WaitingForProcess => self.wait_for_process()?,
            Phase::WaitingForBridge {
                process,
                bridge,
                waited,
            } => self.wait_for_bridge(process, bridge, waited),
            Phase::Settling { session, remaining } => self.settle(session, remaining),
            Phase::LocatingOffset { session, attempts } => self.locate(session, attempts),
            Phase::Synchronizing { session, sync } => self.synchronize(session, sync),
        };
        Ok(())
    }

    fn wait_for_process(&mut self) -> Result<Phase<PP::Process, BC::Bridge>> {
        self.shared.set_status(ConnectionStatus::WaitingForProcess);
        let name = self.config.process_name.clone();

        match self.provider.attach(&name) {
            Ok(process) => {
                self.announced_wait = false;
                if self.announced_denied {
                    self.shared.set_status_detail(None);
                    self.announced_denied = false;
                }
                return Ok(Phase::WaitingForBridge {
                    process,
                    bridge: None,
                    waited: false,
                });
            }
            Err(e) if e.is_access_denied() => {
                if !self.announced_denied {
                    self.shared.error(format!("Could not open {name} process."));
                    self.shared.error(
                        "This tool needs to run at the same elevation level as the simulator.",
                    );
                    self.shared.error(
                        "If you're running the simulator as admin, you'll need to run this tool as admin as well.",
                    );
                    self.shared.set_status_detail(Some(format!(
                        "Access denied to {name}: run this tool at the simulator's elevation level"
                    )));
                    self.announced_denied = true;
                }
                if !self.config.interactive {
                    return Err(e);
                }
            }
            Err(Error::ProcessNotFound(_)) => {
                if !self.announced_wait {
                    self.shared.info(format!("Waiting for {name} to start..."));
                    self.announced_wait = true;
                }
            }
            Err(e) => {
                self.shared.warn(format!("An error occurred: {e}"));
            }
        }

        self.clock.sleep(self.config.process_poll);
        Ok(Phase::WaitingForProcess)
    }

    fn wait_for_bridge(
        &mut self,
        process: PP::Process,
        bridge: Option<BC::Bridge>,
        waited: bool,
    ) -> Phase<PP::Process, BC::Bridge> {
        self.shared.set_status(ConnectionStatus::WaitingForBridge);

        if !process.is_alive() {
            self.shared.info("Simulator process exited while waiting for SimConnect.");
            return Phase::WaitingForProcess;
        }

        let bridge = match bridge {
            Some(bridge) => Some(bridge),
            None => self.connector.connect().ok(),
        };

        if let Some(mut bridge) = bridge {
            if bridge.is_ok() {
                let session = Session {
                    base_address: process.base_address(),
                    process,
                    bridge,
                };
                if waited {
                    return Phase::Settling {
                        session,
                        remaining: self.config.reconnect_settle,
                    };
                }
                return self.begin_locating(session);
            }
            if !waited {
                self.shared.info("Waiting for SimConnect...");
            }
            self.clock.sleep(self.config.bridge_poll);
            return Phase::WaitingForBridge {
                process,
                bridge: Some(bridge),
                waited: true,
            };
        }

        if !waited {
            self.shared.info("Waiting for SimConnect...");
        }
        self.clock.sleep(self.config.bridge_poll);
        Phase::WaitingForBridge {
            process,
            bridge: None,
            waited: true,
        }
    }

    fn settle(
        &mut self,
        session: Session<PP::Process, BC::Bridge>,
        remaining: Duration,
    ) -> Phase<PP::Process, BC::Bridge> {
        if remaining.is_zero() {
            return self.begin_locating(session);
        }

        self.shared.info(format!(
            "Waiting for things to settle down... {} seconds remaining...",
            remaining.as_secs_f64().ceil() as u64
        ));
        let chunk = remaining.min(Duration::from_secs(1));
        self.clock.sleep(chunk);

        let remaining = remaining - chunk;
        if remaining.is_zero() {
            return self.begin_locating(session);
        }
        Phase::Settling { session, remaining }
    }

    fn begin_locating(
        &mut self,
        session: Session<PP::Process, BC::Bridge>,
    ) -> Phase<PP::Process, BC::Bridge> {
        self.shared.set_status(ConnectionStatus::Scanning);
        self.shared
            .info(format!("Base address: 0x{:X}", session.base_address));
        Phase::LocatingOffset {
            session,
            attempts: 0,
        }
    }

    fn locate(
        &mut self,
        mut session: Session<PP::Process, BC::Bridge>,
        attempts: u32,
    ) -> Phase<PP::Process, BC::Bridge> {
        self.shared.set_status(ConnectionStatus::Scanning);

        let result = OffsetLocator::new(
            &session.process,
            &mut session.bridge,
            &self.clock,
            self.config.event_settle,
            &self.profiles,
            &self.shared,
        )
        .locate();

        match result {
            Ok(found) => {
                self.shared.info("=====================================");
                self.shared.info("Initialization complete.");
                self.shared
                    .info("Monitoring for sim rate and pause state changes...");
                {
                    let mut state = self.shared.lock();
                    state.seconds_offset = found.value as i64;
                    state.status = ConnectionStatus::Connected;
                }

                let mut sync = RateSynchronizer::new(found.address, self.clock.now());
                if let Some(hook) = &self.hook {
                    sync = sync.with_hook(hook.clone());
                }
                Phase::Synchronizing { session, sync }
            }
            Err(e) => {
                if !session.process.is_alive() || !session.bridge.is_ok() {
                    self.shared
                        .info(format!("Lost the simulator while locating the offset: {e}"));
                    return self.disconnect();
                }

                let attempts = attempts + 1;
                self.shared.info(format!(
                    "Could not find the seconds offset address. Retrying after {} seconds...",
                    self.config.locate_backoff.as_secs()
                ));
                if attempts == self.config.locate_warning_after {
                    self.shared.warn(format!(
                        "Still no seconds offset after {attempts} attempts. Make sure the in-sim clock is set to live time."
                    ));
                }
                self.clock.sleep(self.config.locate_backoff);
                Phase::LocatingOffset { session, attempts }
            }
        }
    }

    fn synchronize(
        &mut self,
        mut session: Session<PP::Process, BC::Bridge>,
        mut sync: RateSynchronizer,
    ) -> Phase<PP::Process, BC::Bridge> {
        self.clock.sleep(self.config.tick_interval);

        match sync.tick(&session.process, &mut session.bridge, &self.clock, &self.shared) {
            Ok(report) if report.bridge_ok => Phase::Synchronizing { session, sync },
            Ok(_) => {
                self.shared.info("SimConnect connection lost.");
                self.disconnect()
            }
            Err(e) if e.is_process_io() => {
                self.shared
                    .info(format!("{e}. Simulator process likely exited."));
                self.disconnect()
            }
            Err(e) => {
                self.shared.warn(format!("Synchronization stopped: {e}"));
                self.disconnect()
            }
        }
    }

    fn disconnect(&mut self) -> Phase<PP::Process, BC::Bridge> {
        self.shared.set_status(ConnectionStatus::Disconnected);
        self.clock.sleep(self.config.disconnect_cooldown);
        Phase::WaitingForProcess
    }
}
