use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// RFC3339 timestamp used across all Stackway documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub OffsetDateTime);

impl Timestamp {
    pub fn new(datetime: OffsetDateTime) -> Self {
        Self(datetime)
    }

    pub fn inner(&self) -> &OffsetDateTime {
        &self.0
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn timestamp(&self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Seconds elapsed between `self` and a later instant.
    pub fn seconds_until(&self, later: &Timestamp) -> i64 {
        (later.0 - self.0).whole_seconds()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for Timestamp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let datetime = OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
            .map_err(|e| {
                CoreError::invalid_timestamp(format!("Failed to parse timestamp '{s}': {e}"))
            })?;
        Ok(Timestamp(datetime))
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timestamp::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub fn now_utc() -> Timestamp {
    Timestamp(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::new(datetime!(2023-05-15 14:30:00 UTC));
        assert_eq!(ts.to_string(), "2023-05-15T14:30:00Z");
    }

    #[test]
    fn test_timestamp_from_str() {
        let ts = Timestamp::from_str("2023-05-15T14:30:00Z").unwrap();
        assert_eq!(ts.0, datetime!(2023-05-15 14:30:00 UTC));
    }

    #[test]
    fn test_timestamp_from_str_invalid() {
        assert!(Timestamp::from_str("not-a-date").is_err());
        assert!(Timestamp::from_str("").is_err());
        assert!(Timestamp::from_str("2023-13-01T00:00:00Z").is_err());
    }

    #[test]
    fn test_timestamp_serde_roundtrip() {
        let ts = Timestamp::new(datetime!(2023-05-15 14:30:00 UTC));
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2023-05-15T14:30:00Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::new(datetime!(2023-05-15 14:30:00 UTC));
        let b = Timestamp::new(datetime!(2023-05-15 14:30:01 UTC));
        assert!(a < b);
    }

    #[test]
    fn test_seconds_until() {
        let a = Timestamp::new(datetime!(2023-05-15 14:30:00 UTC));
        let b = Timestamp::new(datetime!(2023-05-15 14:35:00 UTC));
        assert_eq!(a.seconds_until(&b), 300);
        assert_eq!(b.seconds_until(&a), -300);
    }

    #[test]
    fn test_now_utc_monotonic_enough() {
        let a = now_utc();
        let b = now_utc();
        assert!(a.seconds_until(&b) >= 0);
    }
}
