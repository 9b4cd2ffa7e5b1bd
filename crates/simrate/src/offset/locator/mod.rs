//! Offset locator for the simulator's seconds offset.
//!
//! Strategies run cheapest first and every candidate goes through the same
//! clock-event verification:
//!
//! 1. Known value offsets from the profile table
//! 2. Adjacent pointer pairs referencing a known anchor offset
//! 3. Adjacent pointer pairs referencing the anchor next to the `Weather\Presets`
//!    string in the module image
//! 4. Behavioral differencing (requires the in-sim clock on live time)

mod adjacency;
mod differencing;
mod verify;

pub use adjacency::{adjacent_pointer_candidates, pointer_pattern};
pub use differencing::locate_by_differencing;
pub use verify::{ClockNudger, verify_candidate};

use std::time::Duration;

use strum::Display;
use tracing::debug;

use crate::bridge::SimBridge;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::memory::{ReadMemory, find_in_module, scan_all};
use crate::offset::OffsetProfileSet;
use crate::state::SharedState;

/// How a verified offset was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Strategy {
    #[strum(serialize = "fixed offset")]
    FixedOffset,
    #[strum(serialize = "pointer adjacency")]
    PointerAdjacency,
    #[strum(serialize = "signature")]
    Signature,
    #[strum(serialize = "differencing")]
    Differencing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatedOffset {
    pub address: u64,
    pub strategy: Strategy,
    /// Seconds offset read right after verification
    pub value: f32,
}

pub struct OffsetLocator<'a, R, B, C>
where
    R: ReadMemory + ?Sized,
    B: SimBridge + ?Sized,
    C: Clock + ?Sized,
{
    reader: &'a R,
    nudger: ClockNudger<'a, B, C>,
    profiles: &'a OffsetProfileSet,
    shared: &'a SharedState,
}

impl<'a, R, B, C> OffsetLocator<'a, R, B, C>
where
    R: ReadMemory + ?Sized,
    B: SimBridge + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(
        reader: &'a R,
        bridge: &'a mut B,
        clock: &'a C,
        event_settle: Duration,
        profiles: &'a OffsetProfileSet,
        shared: &'a SharedState,
    ) -> Self {
        Self {
            reader,
            nudger: ClockNudger::new(bridge, clock, event_settle),
            profiles,
            shared,
        }
    }

    /// Run every strategy once.
    ///
    /// Rejected candidates are not errors; `OffsetSearchFailed` means this attempt
    /// is exhausted and may be retried. Bridge failures are returned as is.
    pub fn locate(&mut self) -> Result<LocatedOffset> {
        let base = self.reader.base_address();
        let profile_set = self.profiles;
        let profiles = profile_set.ordered_for(self.reader.module_size());

        for profile in &profiles {
            for &offset in &profile.value_offsets {
                let Some(address) = base.checked_add(offset) else {
                    debug!("Value offset 0x{:X} ({}) is out of range", offset, profile.build);
                    continue;
                };
                debug!("Trying value offset 0x{:X} ({}) at 0x{:X}", offset, profile.build, address);
                if self.verify(address)? {
                    return self.accept(address, Strategy::FixedOffset);
                }
            }
        }

        for profile in &profiles {
            for &offset in &profile.anchor_offsets {
                let Some(anchor) = base.checked_add(offset) else {
                    debug!("Anchor offset 0x{:X} ({}) is out of range", offset, profile.build);
                    continue;
                };
                self.shared.info(format!("Trying offset: 0x{:X}", offset));
                if let Some(address) = self.try_anchor(anchor)? {
                    return self.accept(address, Strategy::PointerAdjacency);
                }
            }
        }

        self.shared.info("Searching for the signature in the module memory...");
        if let Some(address) = self.try_signature()? {
            return self.accept(address, Strategy::Signature);
        }

        self.shared.info(
            "Could not find the seconds offset address using quick methods, attempting to detect offset via events.",
        );
        self.shared
            .info("This requires you to be currently using real time in-sim, otherwise this method will fail.");
        if let Some(address) = locate_by_differencing(self.reader, &mut self.nudger)? {
            return self.accept(address, Strategy::Differencing);
        }

        Err(Error::OffsetSearchFailed(
            "no candidate passed verification".to_string(),
        ))
    }

    fn verify(&mut self, address: u64) -> Result<bool> {
        let verified = verify_candidate(self.reader, &mut self.nudger, address)?;
        if !verified {
            debug!("Verification failed for 0x{:X}", address);
        }
        Ok(verified)
    }

    /// Scan for pointers to `anchor` and verify every adjacent-pair candidate.
    fn try_anchor(&mut self, anchor: u64) -> Result<Option<u64>> {
        debug!("Scanning process memory for pointers to 0x{:X}", anchor);
        let hits = match scan_all(self.reader, &pointer_pattern(anchor)) {
            Ok(hits) => hits,
            Err(e) => {
                debug!("Pointer scan for 0x{:X} failed: {}", anchor, e);
                return Ok(None);
            }
        };
        for hit in &hits {
            debug!("Found at: 0x{:X}", hit);
        }

        let layout = &self.profiles.layout;
        let candidates =
            adjacent_pointer_candidates(&hits, layout.pointer_spacing, layout.value_field_offset);
        for candidate in candidates {
            debug!("Found base combo, candidate 0x{:X}", candidate);
            if self.verify(candidate)? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn try_signature(&mut self) -> Result<Option<u64>> {
        let layout = &self.profiles.layout;
        let position = match find_in_module(self.reader, layout.signature.as_bytes()) {
            Ok(Some(position)) => position,
            Ok(None) => {
                debug!("Signature {:?} not present in module", layout.signature);
                return Ok(None);
            }
            Err(e) => {
                debug!("Signature search failed: {}", e);
                return Ok(None);
            }
        };

        let anchor = position.saturating_sub(layout.signature_back_distance);
        self.shared.info(format!(
            "Trying offset: 0x{:X}",
            anchor.saturating_sub(self.reader.base_address())
        ));
        self.try_anchor(anchor)
    }

    fn accept(&self, address: u64, strategy: Strategy) -> Result<LocatedOffset> {
        let value = self.reader.read_f32(address)?;
        self.shared.info("Verification successful");
        self.shared
            .info(format!("Seconds offset address: 0x{:X} (via {})", address, strategy));
        self.shared
            .info(format!("Current seconds offset: {}", value as i64));
        Ok(LocatedOffset {
            address,
            strategy,
            value,
        })
    }
}
