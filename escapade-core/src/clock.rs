//! Wall-clock abstraction. Timestamps are milliseconds since the Unix epoch.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

/// Source of wall-clock time. Platform crates provide their own.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Native clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }
}

/// Hand-driven clock for tests and simulations. Clones share one instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    #[must_use]
    pub fn starting_at(now: Millis) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_move_together() {
        let clock = ManualClock::starting_at(1_000);
        let twin = clock.clone();
        clock.advance(250);
        assert_eq!(twin.now_ms(), 1_250);
        twin.set(5);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}
