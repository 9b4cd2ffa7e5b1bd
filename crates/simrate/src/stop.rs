//! Cooperative stop request shared by the supervisor, the console and the key monitor.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Set once, never cleared. Sleepers on the token wake as soon as it is set.
#[derive(Default)]
pub struct StopToken {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.flag() = true;
        self.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.flag()
    }

    /// Sleep for up to `duration`; returns `true` when woken by `stop`.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (stopped, _) = self
            .wake
            .wait_timeout_while(self.flag(), duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
