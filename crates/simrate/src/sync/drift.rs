/// Fractional sim-seconds owed to the simulator clock.
///
/// Each tick adds `wall_delta * (rate - 1)`. Whole seconds are released by
/// truncation toward zero so the fractional remainder always carries over.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriftAccumulator {
    pending: f64,
}

impl DriftAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one tick and return the whole-second correction now due (0 if none).
    pub fn accumulate(&mut self, wall_delta: f64, rate: f64) -> i64 {
        self.pending += wall_delta * (rate - 1.0);
        if self.pending.abs() < 1.0 {
            return 0;
        }
        let whole = self.pending.trunc();
        self.pending -= whole;
        whole as i64
    }

    pub fn pending(&self) -> f64 {
        self.pending
    }

    pub fn clear(&mut self) {
        self.pending = 0.0;
    }
}
