//! Last-resort discovery by watching memory react to clock events.
//!
//! Only works while the in-sim clock runs on live time (offset 0): one decrement
//! must leave the offset at -60 and a second at -120.

use tracing::debug;

use crate::bridge::SimBridge;
use crate::clock::Clock;
use crate::error::Result;
use crate::memory::layout::clock::{FIRST_DIFFERENCING_VALUE, SECOND_DIFFERENCING_VALUE};
use crate::memory::{ReadMemory, scan_all};
use crate::offset::locator::verify::ClockNudger;

/// Find the offset by differencing. The clock is put back before returning,
/// whatever the outcome.
pub fn locate_by_differencing<R, B, C>(
    reader: &R,
    nudger: &mut ClockNudger<'_, B, C>,
) -> Result<Option<u64>>
where
    R: ReadMemory + ?Sized,
    B: SimBridge + ?Sized,
    C: Clock + ?Sized,
{
    let start = nudger.net_minutes();

    nudger.decrement()?;
    let hits = match scan_all(reader, &FIRST_DIFFERENCING_VALUE.to_le_bytes()) {
        Ok(hits) => hits,
        Err(e) => {
            debug!("Differencing scan failed: {}", e);
            nudger.return_to(start)?;
            return Ok(None);
        }
    };
    debug!("{} locations hold {} after one decrement", hits.len(), FIRST_DIFFERENCING_VALUE);

    if hits.is_empty() {
        nudger.return_to(start)?;
        return Ok(None);
    }

    nudger.decrement()?;
    let two_down = nudger.net_minutes();

    for address in hits {
        if reader.read_f32(address).ok() != Some(SECOND_DIFFERENCING_VALUE) {
            continue;
        }

        nudger.increment()?;
        if reader.read_f32(address).ok() != Some(FIRST_DIFFERENCING_VALUE) {
            debug!("Candidate 0x{:X} did not follow the first increment", address);
            nudger.return_to(two_down)?;
            continue;
        }

        nudger.increment()?;
        if reader.read_f32(address).ok() != Some(0.0) {
            debug!("Candidate 0x{:X} did not return to zero", address);
            nudger.return_to(two_down)?;
            continue;
        }

        return Ok(Some(address));
    }

    nudger.return_to(start)?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::events;
    use crate::bridge::mock::MockBridge;
    use crate::clock::ManualClock;
    use crate::memory::MockMemoryBuilder;
    use std::time::Duration;

    const BASE: u64 = 0x1_4000_0000;
    const HEAP: u64 = 0x2_0000_0000;
    const SETTLE: Duration = Duration::from_millis(500);

    #[test]
    fn test_finds_offset_among_static_decoys() {
        let memory = MockMemoryBuilder::new(BASE, 0x100)
            .region(HEAP, 0x1000)
            .build();
        let target = HEAP + 0x700;
        memory.put_f32(HEAP + 0x40, -60.0);
        memory.put_f32(target, 0.0);
        let mut bridge = MockBridge::new().with_clock(memory.clone(), &[target]);
        let clock = ManualClock::new();

        let mut nudger = ClockNudger::new(&mut bridge, &clock, SETTLE);
        let found = locate_by_differencing(&memory, &mut nudger).unwrap();
        assert_eq!(found, Some(target));
        assert_eq!(nudger.net_minutes(), 0);
        drop(nudger);
        assert_eq!(memory.f32_at(target), 0.0);
    }

    #[test]
    fn test_lowest_matching_address_wins() {
        let memory = MockMemoryBuilder::new(BASE, 0x100)
            .region(HEAP, 0x1000)
            .build();
        let mirror = HEAP + 0x100;
        let target = HEAP + 0x700;
        memory.put_f32(mirror, 0.0);
        memory.put_f32(target, 0.0);
        let mut bridge = MockBridge::new().with_clock(memory.clone(), &[mirror, target]);
        let clock = ManualClock::new();

        let mut nudger = ClockNudger::new(&mut bridge, &clock, SETTLE);
        let found = locate_by_differencing(&memory, &mut nudger).unwrap();
        assert_eq!(found, Some(mirror));
        assert_eq!(nudger.net_minutes(), 0);
    }

    #[test]
    fn test_precondition_not_met_restores_clock() {
        let memory = MockMemoryBuilder::new(BASE, 0x100)
            .region(HEAP, 0x1000)
            .build();
        let target = HEAP + 0x700;
        memory.put_f32(target, 3600.0);
        let mut bridge = MockBridge::new().with_clock(memory.clone(), &[target]);
        let clock = ManualClock::new();

        let mut nudger = ClockNudger::new(&mut bridge, &clock, SETTLE);
        assert_eq!(locate_by_differencing(&memory, &mut nudger).unwrap(), None);
        drop(nudger);

        assert_eq!(memory.f32_at(target), 3600.0);
        assert_eq!(bridge.count(events::CLOCK_MINUTES_DEC), 1);
        assert_eq!(bridge.count(events::CLOCK_MINUTES_INC), 1);
    }

    #[test]
    fn test_decoy_at_minus_sixty_is_filtered_and_clock_restored() {
        let memory = MockMemoryBuilder::new(BASE, 0x100)
            .region(HEAP, 0x1000)
            .build();
        let target = HEAP + 0x700;
        memory.put_f32(HEAP + 0x40, -60.0);
        memory.put_f32(target, 600.0);
        let mut bridge = MockBridge::new().with_clock(memory.clone(), &[target]);
        let clock = ManualClock::new();

        let mut nudger = ClockNudger::new(&mut bridge, &clock, SETTLE);
        assert_eq!(locate_by_differencing(&memory, &mut nudger).unwrap(), None);
        assert_eq!(nudger.net_minutes(), 0);
        drop(nudger);
        assert_eq!(memory.f32_at(target), 600.0);
    }
}
