// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::time::Duration;

/// A point in time on a backend's monotonic clock, measured from the moment the
/// backend started.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

// === impl Timestamp ===

impl Timestamp {
    pub const ZERO: Self = Self(Duration::ZERO);

    pub const fn from_duration(since_start: Duration) -> Self {
        Self(since_start)
    }

    pub const fn as_duration(self) -> Duration {
        self.0
    }

    /// Returns the time elapsed from `earlier` to `self`, or zero if `earlier`
    /// is actually later.
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    pub fn checked_add(self, duration: Duration) -> Option<Timestamp> {
        self.0.checked_add(duration).map(Self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0.as_secs(), self.0.subsec_micros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_seconds_and_micros() {
        let ts = Timestamp::from_duration(Duration::from_micros(3_000_042));
        assert_eq!(ts.to_string(), "3.000042");
        assert_eq!(Timestamp::ZERO.to_string(), "0.000000");
    }

    #[test]
    fn duration_since_saturates() {
        let early = Timestamp::from_duration(Duration::from_millis(5));
        let late = Timestamp::from_duration(Duration::from_millis(8));

        assert_eq!(late.saturating_duration_since(early), Duration::from_millis(3));
        assert_eq!(early.saturating_duration_since(late), Duration::ZERO);
    }
}
