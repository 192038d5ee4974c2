use serde::{Deserialize, Serialize};
use std::{
    fmt,
    time::{Duration, SystemTime},
};
use tracing::warn;

/// An exact time and date used as the baseline of escrow timelocks.
///
/// Escrow contracts store the baseline in 32 bits, hence the width.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct Timestamp(u32);

impl Timestamp {
    // This will work until 2106
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or_default();

        Timestamp(secs as u32)
    }

    pub fn plus(self, seconds: u32) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    pub fn minus(self, seconds: u32) -> Self {
        Self(self.0.saturating_sub(seconds))
    }

    pub fn add_relative(self, delta: RelativeTime) -> Self {
        self.plus(delta.0)
    }

    /// Adds a duration to self using saturating add. Precision is seconds only
    /// i.e., nanoseconds are ignored.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_duration(self, rhs: Duration) -> Timestamp {
        let seconds = rhs.as_secs();
        if seconds > u64::from(u32::MAX) {
            warn!("duration is too big, truncation occurred while casting to u32");
        }

        self.plus(seconds as u32)
    }

    /// Seconds from `self` until `later`, zero if `later` already passed.
    pub fn until(self, later: Timestamp) -> Duration {
        Duration::from_secs(u64::from(later.0.saturating_sub(self.0)))
    }
}

/// The u32 input is the number of seconds since epoch
impl From<u32> for Timestamp {
    fn from(item: u32) -> Self {
        Self(item)
    }
}

/// The u32 returned is the number of seconds since epoch
impl From<Timestamp> for u32 {
    fn from(item: Timestamp) -> Self {
        item.0
    }
}

impl From<Timestamp> for u64 {
    fn from(item: Timestamp) -> Self {
        u64::from(item.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A duration in seconds relative to a [`Timestamp`] baseline.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct RelativeTime(u32);

impl RelativeTime {
    pub const fn new(time_secs: u32) -> Self {
        RelativeTime(time_secs)
    }
}

/// The u32 returned is the duration in seconds
impl From<RelativeTime> for u32 {
    fn from(item: RelativeTime) -> Self {
        item.0
    }
}

/// The u32 input is the duration in seconds
impl From<u32> for RelativeTime {
    fn from(item: u32) -> Self {
        Self(item)
    }
}

impl fmt::Display for RelativeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
