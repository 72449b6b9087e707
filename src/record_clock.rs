//! Wall-clock timestamps for record prefixes.
//!
//! Records only carry the local time of day, rendered as `[HH:MM:SS]`. The
//! synchronous paths read the clock through `chrono` right after taking the
//! diagnostic lock; the signal path cannot touch the timezone machinery, so it
//! reads `CLOCK_REALTIME` directly and applies the UTC offset sampled when the
//! clock was created.

use std::fmt;

use chrono::{Local, Timelike};

const SECONDS_PER_DAY: i64 = 86_400;

/// Local time of day, to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    seconds_of_day: u32,
}

impl Timestamp {
    /// # Panics
    ///
    /// If `seconds` is not below 86400.
    pub const fn from_seconds_of_day(seconds: u32) -> Self {
        assert!((seconds as i64) < SECONDS_PER_DAY);
        Self { seconds_of_day: seconds }
    }

    /// Converts UNIX seconds to local time of day using a fixed UTC offset.
    pub const fn from_unix(unix_seconds: i64, utc_offset: i32) -> Self {
        let local = (unix_seconds + utc_offset as i64).rem_euclid(SECONDS_PER_DAY);
        Self {
            seconds_of_day: local as u32,
        }
    }

    pub const fn seconds_of_day(self) -> u32 {
        self.seconds_of_day
    }

    pub const fn hours(self) -> u32 {
        self.seconds_of_day / 3600
    }

    pub const fn minutes(self) -> u32 {
        self.seconds_of_day / 60 % 60
    }

    pub const fn seconds(self) -> u32 {
        self.seconds_of_day % 60
    }
}

/// Renders as `[HH:MM:SS]`, ten bytes, no trailing space.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:02}:{:02}:{:02}]", self.hours(), self.minutes(), self.seconds())
    }
}

/// Source of record timestamps.
///
/// # Examples
///
/// ```
/// # use crash_logger::record_clock::LocalClock;
/// let clock = LocalClock::new();
/// let stamp = clock.now();
/// assert_eq!(stamp.to_string().len(), 10);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    utc_offset: i32,
}

impl LocalClock {
    /// Samples the current local UTC offset.
    pub fn new() -> Self {
        Self {
            utc_offset: Local::now().offset().local_minus_utc(),
        }
    }

    /// A clock with a fixed offset, east of UTC, in seconds.
    pub const fn with_offset(utc_offset: i32) -> Self {
        Self { utc_offset }
    }

    pub const fn utc_offset(&self) -> i32 {
        self.utc_offset
    }

    /// Current local time of day, honoring timezone rules.
    pub fn now(&self) -> Timestamp {
        Timestamp::from_seconds_of_day(Local::now().num_seconds_from_midnight())
    }

    /// Current local time of day using only `clock_gettime(2)` and the cached
    /// offset. Async-signal-safe.
    ///
    /// Returns `None` if the clock cannot be read.
    pub fn now_signal_safe(&self) -> Option<Timestamp> {
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
            return None;
        }

        Some(Timestamp::from_unix(now.tv_sec as i64, self.utc_offset))
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}
