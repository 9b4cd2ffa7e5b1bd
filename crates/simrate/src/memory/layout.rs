//! Memory layout constants for the simulator's time-offset data
//!
//! The seconds offset is a little-endian `f32` holding the in-sim clock's skew from
//! real world time, in seconds. It lives in a weather/time structure that is
//! referenced by two pointers placed exactly `POINTER_SPACING` bytes apart.

/// Layout of the structure holding the seconds offset
pub mod offset {
    /// Distance between the two adjacent pointers that reference the structure
    pub const POINTER_SPACING: u64 = 0x20;

    /// Position of the seconds offset relative to the second pointer's location
    pub const VALUE_FIELD_OFFSET: u64 = 0x34;

    /// Resource path string embedded in the module image near the structure anchor
    pub const SIGNATURE: &str = r"Weather\Presets";

    /// The anchor address sits this many bytes before the signature
    pub const SIGNATURE_BACK_DISTANCE: u64 = 8;

    /// Size of a pointer in the 64-bit target
    pub const POINTER_SIZE: usize = 8;
}

/// Clock event semantics used as the verification side-channel
pub mod clock {
    /// Seconds added to or removed from the offset by one minute increment/decrement
    pub const SECONDS_PER_STEP: f32 = 60.0;

    /// Offset value after one decrement, when the in-sim clock runs on live time
    pub const FIRST_DIFFERENCING_VALUE: f32 = -SECONDS_PER_STEP;

    /// Offset value after two decrements, when the in-sim clock runs on live time
    pub const SECOND_DIFFERENCING_VALUE: f32 = -2.0 * SECONDS_PER_STEP;
}
