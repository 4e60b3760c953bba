//! Fixed-rate tick scheduling with a bounded catch-up.

use std::time::{Duration, Instant};

/// Nominal simulation rate.
pub const TICKS_PER_SECOND: u64 = 60;
/// A stall at least this long collapses to a single tick.
pub const MAX_CATCH_UP: Duration = Duration::from_millis(200);

/// Decides how many 60 Hz updates are due at a given instant.
///
/// Short stalls are caught up tick by tick. Once the scheduler falls
/// [`MAX_CATCH_UP`] or more behind, it resynchronizes to the current time and
/// runs one tick instead of replaying the whole backlog.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    period: Duration,
    next_tick: Instant,
    resyncs: u64,
}

impl TickScheduler {
    /// A scheduler whose first tick is due at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            period: Duration::from_nanos(1_000_000_000 / TICKS_PER_SECOND),
            next_tick: now,
            resyncs: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of ticks to run at `now`. Advances the schedule.
    pub fn ticks_due(&mut self, now: Instant) -> u32 {
        if now.saturating_duration_since(self.next_tick) >= MAX_CATCH_UP {
            self.next_tick = now;
            self.resyncs += 1;
        }

        let mut due = 0;
        while now >= self.next_tick {
            self.next_tick += self.period;
            due += 1;
        }
        due
    }

    /// When the next tick becomes due.
    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    /// Time left until the next tick, zero if one is already due.
    pub fn time_until_next(&self, now: Instant) -> Duration {
        self.next_tick.saturating_duration_since(now)
    }

    /// How many times a stall forced a resynchronization.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_due_immediately() {
        let start = Instant::now();
        let mut clock = TickScheduler::new(start);
        assert_eq!(clock.ticks_due(start), 1);
        assert_eq!(clock.ticks_due(start), 0);
    }

    #[test]
    fn ticks_follow_elapsed_time() {
        let start = Instant::now();
        let mut clock = TickScheduler::new(start);
        // Ticks at 0, 1p, 2p and 3p are due by 3.5p.
        let now = start + clock.period() * 7 / 2;
        assert_eq!(clock.ticks_due(now), 4);
        assert_eq!(clock.ticks_due(now), 0);
        assert!(clock.time_until_next(now) <= clock.period());
    }

    #[test]
    fn short_stall_is_caught_up() {
        let start = Instant::now();
        let mut clock = TickScheduler::new(start);
        clock.ticks_due(start);
        let now = start + Duration::from_millis(150);
        assert_eq!(clock.ticks_due(now), 9);
        assert_eq!(clock.resyncs(), 0);
    }

    #[test]
    fn long_stall_collapses_to_one_tick() {
        let start = Instant::now();
        let mut clock = TickScheduler::new(start);
        clock.ticks_due(start);
        let now = start + Duration::from_secs(5);
        assert_eq!(clock.ticks_due(now), 1);
        assert_eq!(clock.resyncs(), 1);
        assert_eq!(clock.next_tick(), now + clock.period());
    }
}
