use std::ops::{Add, Sub};
use std::time::Duration;

/// Strictly-monotone timestamp.
///
/// Every timestamp the dialog core keeps (setup, provisional, connect,
/// disconnect) and every timer deadline is a `MonoTime`. Deadlines are
/// carried as absolute instants so re-arming a timer across a state
/// change does not drift.
///
/// Backed by `tokio::time::Instant`, which is what
/// `tokio::time::sleep_until` consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonoTime(tokio::time::Instant);

impl MonoTime {
    pub fn now() -> Self {
        MonoTime(tokio::time::Instant::now())
    }

    /// True if `self` is strictly later than `other`.
    pub fn after(&self, other: &MonoTime) -> bool {
        self.0 > other.0
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    /// Duration since `earlier`, zero if `earlier` is in the future.
    pub fn duration_since(&self, earlier: MonoTime) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }

    pub fn checked_add(&self, d: Duration) -> Option<MonoTime> {
        self.0.checked_add(d).map(MonoTime)
    }

    pub fn instant(&self) -> tokio::time::Instant {
        self.0
    }
}

impl From<MonoTime> for tokio::time::Instant {
    fn from(t: MonoTime) -> Self {
        t.0
    }
}

impl Add<Duration> for MonoTime {
    type Output = MonoTime;

    fn add(self, d: Duration) -> MonoTime {
        MonoTime(self.0 + d)
    }
}

impl Sub<MonoTime> for MonoTime {
    type Output = Duration;

    fn sub(self, other: MonoTime) -> Duration {
        self.0.saturating_duration_since(other.0)
    }
}
