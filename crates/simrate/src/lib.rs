//! # simrate
//!
//! Keeps the in-sim clock of Microsoft Flight Simulator 2024 in step with the
//! simulation rate.
//!
//! This crate provides:
//! - Windows process memory access and pattern scans
//! - A SimConnect bridge for variables, key events and pause control
//! - Discovery of the seconds-offset value with clock-event verification
//! - The rate synchronization loop and the connection supervisor around it
//! - Shared state for a foreground status display and control commands

pub mod autoapp;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod memory;
pub mod offset;
pub mod state;
pub mod stop;
pub mod supervisor;
pub mod sync;

pub use autoapp::{AutoAppLauncher, RateCrossingHook};
pub use bridge::{BridgeConnector, SimBridge, SimConnectBridge, SimConnectConnector};
pub use clock::{Clock, SystemClock};
pub use config::{SyncConfig, SyncConfigBuilder};
pub use control::ControlCommand;
pub use error::{Error, Result};
pub use memory::{
    MemoryRegion, ProcessHandle, ProcessProvider, ReadMemory, Win32ProcessProvider, WriteMemory,
    find_process_id,
};
pub use offset::{
    LocatedOffset, OffsetLocator, OffsetProfile, OffsetProfileSet, Strategy, StructureLayout,
    builtin_profiles, load_profiles, save_profiles,
};
pub use state::{ConnectionStatus, SharedState, StatusSnapshot};
pub use stop::StopToken;
pub use supervisor::{PhaseKind, Supervisor};
pub use sync::{DriftAccumulator, RateSynchronizer, TickReport};
