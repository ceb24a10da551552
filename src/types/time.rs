// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Chain time

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds (always UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(pub i64);

impl UnixTimestamp {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    /// Creates a UnixTimestamp from a u64 value
    pub fn from_u64(ts: u64) -> Self {
        Self(ts as i64)
    }

    /// Midnight UTC at the start of `date`, if representable.
    pub fn start_of_day(date: NaiveDate) -> Option<Self> {
        Utc.with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
            .single()
            .map(Self::from_datetime)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Converts to u64 for use with blockchain timestamps
    pub fn as_u64(&self) -> u64 {
        self.0 as u64
    }

    /// Subtracts one second from the timestamp
    pub fn pred(&self) -> Self {
        Self(self.0 - 1)
    }

    /// Shifts the timestamp back by `secs`, saturating at `i64::MIN`.
    pub fn minus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(i64::try_from(secs).unwrap_or(i64::MAX)))
    }

    /// Rounds down to a multiple of `clock_secs` (no-op for a zero clock).
    pub fn floor_to(&self, clock_secs: u64) -> Self {
        match i64::try_from(clock_secs) {
            Ok(clock) if clock > 0 => Self(self.0.div_euclid(clock) * clock),
            _ => *self,
        }
    }
}

impl std::fmt::Display for UnixTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of_day() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 10).unwrap();
        assert_eq!(
            UnixTimestamp::start_of_day(date),
            Some(UnixTimestamp(1728518400))
        );
    }

    #[test]
    fn test_floor_to_clock() {
        let ts = UnixTimestamp(1728518400 + 3 * 3600 + 17);
        assert_eq!(ts.floor_to(86_400), UnixTimestamp(1728518400));
        assert_eq!(ts.floor_to(3600), UnixTimestamp(1728518400 + 3 * 3600));
        assert_eq!(ts.floor_to(0), ts);
    }

    #[test]
    fn test_minus_secs_and_pred() {
        let ts = UnixTimestamp(1000);
        assert_eq!(ts.minus_secs(400), UnixTimestamp(600));
        assert_eq!(ts.pred(), UnixTimestamp(999));
        assert_eq!(UnixTimestamp(i64::MIN).minus_secs(1), UnixTimestamp(i64::MIN));
    }
}
