//! One-shot offset discovery.

use anyhow::{Context, Result};
use simrate::bridge::wait_until_ready;
use simrate::{OffsetLocator, ProcessHandle, ReadMemory, SharedState, SimConnectConnector, SystemClock};
use tracing::debug;

use crate::commands::Options;

/// Bridge checks before giving up, one per `bridge_poll`
const BRIDGE_POLLS: u32 = 30;

/// Attach once, run every locate strategy and print the verified address.
pub fn run(options: &Options) -> Result<()> {
    let config = options.sync_config(false);
    let profiles = options.offset_profiles()?;

    let process = ProcessHandle::find_and_open(&config.process_name)
        .with_context(|| format!("Failed to attach to {}", config.process_name))?;
    debug!(
        "Attached to {} (pid {}, base 0x{:X}, image size 0x{:X})",
        process.name,
        process.pid,
        process.base_address(),
        process.module_size()
    );

    let clock = SystemClock::new();
    println!("Waiting for SimConnect...");
    let mut bridge = wait_until_ready(
        &mut SimConnectConnector::default(),
        &clock,
        config.bridge_poll,
        BRIDGE_POLLS,
    )
    .context("SimConnect is not available")?;

    let shared = SharedState::new();
    let result = OffsetLocator::new(
        &process,
        &mut bridge,
        &clock,
        config.event_settle,
        &profiles,
        &shared,
    )
    .locate();

    for line in shared.drain_logs() {
        println!("{line}");
    }
    let found = result.context("Offset discovery failed")?;

    println!();
    println!("Address:  0x{:X}", found.address);
    println!(
        "Relative: {}",
        relative_to(found.address, process.base_address(), process.module_size())
    );
    println!("Strategy: {}", found.strategy);
    println!("Value:    {}s", found.value as i64);

    Ok(())
}

/// Describe `address` relative to the module when it lies inside the image.
pub fn relative_to(address: u64, base: u64, module_size: usize) -> String {
    match address.checked_sub(base) {
        Some(offset) if offset < module_size as u64 => format!("module + 0x{:X}", offset),
        _ => "outside module".to_string(),
    }
}
