//! Stream timing
//!
//! Elapsed time is for reporting only; nothing in the tracker branches on it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Wall-clock time source backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for deterministic tests and replays
///
/// Clones share the same reading.
///
/// # Examples
///
/// ```
/// use fastlane_tracker::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let handle = clock.clone();
/// handle.advance(Duration::from_millis(1500));
/// assert_eq!(clock.now(), Duration::from_millis(1500));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current reading
    pub fn set(&self, now: Duration) {
        self.nanos.store(duration_to_nanos(now), Ordering::SeqCst);
    }

    /// Set the current reading in seconds
    pub fn set_secs(&self, secs: f64) {
        self.set(Duration::from_secs_f64(secs));
    }

    /// Move the reading forward
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_to_nanos(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Elapsed time since stream start plus named event timestamps
#[derive(Debug, Clone)]
pub struct StreamTimer {
    clock: Arc<dyn Clock>,
    started_at: Duration,
    events: BTreeMap<String, Duration>,
}

impl StreamTimer {
    /// Start a timer on the given clock
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            started_at,
            events: BTreeMap::new(),
        }
    }

    /// Start a timer on the system clock
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }

    /// Time since start
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started_at)
    }

    /// Record `name` at the current elapsed time and return that time
    ///
    /// Marking the same name again overwrites the earlier timestamp.
    pub fn mark_event(&mut self, name: impl Into<String>) -> Duration {
        let elapsed = self.elapsed();
        self.events.insert(name.into(), elapsed);
        elapsed
    }

    /// When `name` was marked, if it was
    pub fn event_time(&self, name: &str) -> Option<Duration> {
        self.events.get(name).copied()
    }

    /// All marked events
    pub fn events(&self) -> &BTreeMap<String, Duration> {
        &self.events
    }

    /// Clear events and restart from the clock's current reading
    pub fn reset(&mut self) {
        self.started_at = self.clock.now();
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_relative_to_start() {
        let clock = ManualClock::new();
        clock.set_secs(5.0);
        let timer = StreamTimer::new(Arc::new(clock.clone()));
        clock.set_secs(7.5);
        assert_eq!(timer.elapsed(), Duration::from_millis(2500));
    }

    #[test]
    fn test_mark_event() {
        let clock = ManualClock::new();
        let mut timer = StreamTimer::new(Arc::new(clock.clone()));
        clock.advance(Duration::from_secs(1));
        assert_eq!(timer.mark_event("required_ready"), Duration::from_secs(1));
        assert_eq!(timer.event_time("required_ready"), Some(Duration::from_secs(1)));
        assert_eq!(timer.event_time("all_complete"), None);
    }

    #[test]
    fn test_reset_clears_events_and_restarts() {
        let clock = ManualClock::new();
        let mut timer = StreamTimer::new(Arc::new(clock.clone()));
        clock.advance(Duration::from_secs(3));
        timer.mark_event("x");
        timer.reset();
        assert!(timer.events().is_empty());
        assert_eq!(timer.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let timer = StreamTimer::system();
        let a = timer.elapsed();
        let b = timer.elapsed();
        assert!(b >= a);
    }
}
