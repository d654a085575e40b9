use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::ValidationError;

/// UTC timestamp with whole-second precision.
///
/// Serialized as RFC3339 (`2026-02-20T10:00:00Z`); persisted as
/// `2026-02-20 10:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    /// Current time, truncated to the second.
    pub fn now() -> Self {
        Self::truncated(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            }
        })?;

        Self::from_offset_datetime(parsed)
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Result<Self, ValidationError> {
        if value.offset() != UtcOffset::UTC {
            return Err(ValidationError::TimestampNotUtc {
                value: value.format(&Rfc3339).unwrap_or_default(),
            });
        }

        Ok(Self::truncated(value))
    }

    /// Parse the storage form written by [`UtcDateTime::to_storage`].
    pub fn parse_storage(input: &str) -> Result<Self, ValidationError> {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        PrimitiveDateTime::parse(input.trim(), format)
            .map(|value| Self(value.assume_utc()))
            .map_err(|_| ValidationError::InvalidStoredTimestamp {
                value: input.to_owned(),
            })
    }

    pub fn to_storage(self) -> String {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        self.0.format(format).unwrap_or_default()
    }

    pub fn format_rfc3339(self) -> String {
        self.0.format(&Rfc3339).unwrap_or_default()
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    /// Milliseconds since the Unix epoch.
    pub fn unix_millis(self) -> i64 {
        i64::try_from(self.0.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
    }

    fn truncated(value: OffsetDateTime) -> Self {
        Self(value.replace_nanosecond(0).unwrap_or(value))
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_form_round_trips() {
        let parsed = UtcDateTime::parse("2026-02-20T10:15:30Z").expect("must parse");
        assert_eq!(parsed.to_storage(), "2026-02-20 10:15:30");
        assert_eq!(
            UtcDateTime::parse_storage("2026-02-20 10:15:30").expect("storage parse"),
            parsed
        );
    }

    #[test]
    fn drops_sub_second_precision() {
        let parsed = UtcDateTime::parse("2026-02-20T10:15:30.987Z").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2026-02-20T10:15:30Z");
    }

    #[test]
    fn rejects_non_utc_offsets() {
        let err = UtcDateTime::parse("2026-02-20T10:15:30+02:00").expect_err("must fail");
        assert!(matches!(err, ValidationError::TimestampNotUtc { .. }));
    }
}
