use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// A UTC instant exchanged with suppliers as RFC3339 (`...Z`).
///
/// Input with a non-zero offset is accepted and shifted to UTC, so
/// `2025-06-01T12:00:00+02:00` and `2025-06-01T10:00:00Z` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        OffsetDateTime::parse(input.trim(), &Rfc3339)
            .map(|value| Self(value.to_offset(UtcOffset::UTC)))
            .map_err(|error| ValidationError::InvalidTimestamp {
                value: input.to_owned(),
                reason: error.to_string(),
            })
    }

    /// Started 24-hour periods from `self` to `end`; rental suppliers bill a
    /// partial day as a full one. Zero when `end` is not after `self`.
    pub fn rental_days_until(self, end: Self) -> u32 {
        let span = end.0 - self.0;
        if span <= Duration::ZERO {
            return 0;
        }
        let whole = span.whole_days();
        let partial = span - Duration::days(whole) > Duration::ZERO;
        u32::try_from(whole + i64::from(partial)).unwrap_or(u32::MAX)
    }

    pub fn format_rfc3339(self) -> String {
        // Only years outside 0..=9999 fail to format, and parse never yields one.
        self.0.format(&Rfc3339).unwrap_or_default()
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}
