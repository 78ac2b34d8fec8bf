//! Timestamp format tags and conversion.
//!
//! Every sample carries the format its timestamp originally arrived in, so
//! the spill serializer can reconstruct the exact representation a producer
//! used. Internally timestamps are canonical UTC instants; rendering and
//! parsing go through the declared [`TimeFormat`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RecordError;

/// Declared representation of a sample timestamp.
///
/// The unix variants carry an integer count since the epoch at the named
/// precision. `Rfc3339` is the default textual form. Any other string is
/// treated as a chrono strftime pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// Seconds since the unix epoch.
    UnixSeconds,
    /// Milliseconds since the unix epoch.
    UnixMillis,
    /// Microseconds since the unix epoch.
    UnixMicros,
    /// Nanoseconds since the unix epoch.
    UnixNanos,
    /// RFC 3339 text, e.g. `2024-05-01T12:00:00.250Z`.
    #[default]
    Rfc3339,
    /// A custom chrono strftime pattern, e.g. `%Y-%m-%d %H:%M:%S`.
    Custom(String),
}

impl TimeFormat {
    /// The canonical tag string for this format.
    pub fn as_str(&self) -> &str {
        match self {
            TimeFormat::UnixSeconds => "unix-s",
            TimeFormat::UnixMillis => "unix-ms",
            TimeFormat::UnixMicros => "unix-us",
            TimeFormat::UnixNanos => "unix-ns",
            TimeFormat::Rfc3339 => "rfc3339",
            TimeFormat::Custom(pattern) => pattern,
        }
    }

    /// Renders a UTC instant in this format.
    pub fn render(&self, ts: DateTime<Utc>) -> String {
        match self {
            TimeFormat::UnixSeconds => ts.timestamp().to_string(),
            TimeFormat::UnixMillis => ts.timestamp_millis().to_string(),
            TimeFormat::UnixMicros => ts.timestamp_micros().to_string(),
            TimeFormat::UnixNanos => ts
                .timestamp_nanos_opt()
                .unwrap_or_else(|| ts.timestamp_micros().saturating_mul(1_000))
                .to_string(),
            TimeFormat::Rfc3339 => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            TimeFormat::Custom(pattern) => ts.format(pattern).to_string(),
        }
    }

    /// Parses a timestamp string declared to be in this format.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidTimestamp`] if the input does not
    /// parse under this format.
    pub fn parse(&self, input: &str) -> Result<DateTime<Utc>, RecordError> {
        let invalid = || RecordError::InvalidTimestamp {
            input: input.to_string(),
            format: self.as_str().to_string(),
        };

        match self {
            TimeFormat::UnixSeconds => {
                let secs: i64 = input.trim().parse().map_err(|_| invalid())?;
                DateTime::from_timestamp(secs, 0).ok_or_else(invalid)
            }
            TimeFormat::UnixMillis => {
                let millis: i64 = input.trim().parse().map_err(|_| invalid())?;
                DateTime::from_timestamp_millis(millis).ok_or_else(invalid)
            }
            TimeFormat::UnixMicros => {
                let micros: i64 = input.trim().parse().map_err(|_| invalid())?;
                DateTime::from_timestamp_micros(micros).ok_or_else(invalid)
            }
            TimeFormat::UnixNanos => {
                let nanos: i64 = input.trim().parse().map_err(|_| invalid())?;
                Ok(DateTime::from_timestamp_nanos(nanos))
            }
            TimeFormat::Rfc3339 => DateTime::parse_from_rfc3339(input.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| invalid()),
            TimeFormat::Custom(pattern) => {
                NaiveDateTime::parse_from_str(input.trim(), pattern)
                    .map(|naive| naive.and_utc())
                    .map_err(|_| invalid())
            }
        }
    }

    /// Truncates an instant to the precision this format can represent.
    ///
    /// A sample timestamp is normalized at insertion so that a record
    /// spilled to disk and recovered compares equal to the original: any
    /// sub-tag precision would otherwise be silently lost in transit.
    pub fn normalize(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeFormat::UnixSeconds => {
                DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
            }
            TimeFormat::UnixMillis => {
                DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
            }
            TimeFormat::UnixMicros => {
                DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
            }
            // Nanosecond and RFC 3339 renderings are lossless.
            TimeFormat::UnixNanos | TimeFormat::Rfc3339 => ts,
            TimeFormat::Custom(_) => self.parse(&self.render(ts)).unwrap_or(ts),
        }
    }
}

impl FromStr for TimeFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "unix-s" => TimeFormat::UnixSeconds,
            "unix-ms" => TimeFormat::UnixMillis,
            "unix-us" => TimeFormat::UnixMicros,
            "unix-ns" => TimeFormat::UnixNanos,
            "rfc3339" | "" => TimeFormat::Rfc3339,
            other => TimeFormat::Custom(other.to_string()),
        })
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TimeFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TimeFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        // FromStr is infallible: unknown tags become custom patterns.
        Ok(tag.parse().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_250).unwrap()
    }

    #[test]
    fn test_unix_tags_round_trip() {
        for format in [
            TimeFormat::UnixSeconds,
            TimeFormat::UnixMillis,
            TimeFormat::UnixMicros,
            TimeFormat::UnixNanos,
        ] {
            let ts = format.normalize(instant());
            let rendered = format.render(ts);
            assert_eq!(format.parse(&rendered).unwrap(), ts, "{format}");
        }
    }

    #[test]
    fn test_seconds_tag_truncates_millis() {
        let ts = TimeFormat::UnixSeconds.normalize(instant());
        assert_eq!(ts.timestamp_millis() % 1000, 0);
        assert_eq!(TimeFormat::UnixSeconds.render(ts), "1700000000");
    }

    #[test]
    fn test_rfc3339_round_trip() {
        let ts = instant();
        let rendered = TimeFormat::Rfc3339.render(ts);
        assert_eq!(TimeFormat::Rfc3339.parse(&rendered).unwrap(), ts);
    }

    #[test]
    fn test_custom_pattern_round_trip() {
        let format = TimeFormat::Custom("%Y-%m-%d %H:%M:%S".to_string());
        let ts = format.normalize(instant());
        let rendered = format.render(ts);
        assert_eq!(rendered, "2023-11-14 22:13:20");
        assert_eq!(format.parse(&rendered).unwrap(), ts);
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let err = TimeFormat::UnixMillis.parse("not-a-number").unwrap_err();
        assert!(matches!(err, RecordError::InvalidTimestamp { .. }));
        assert!(TimeFormat::Rfc3339.parse("1700000000").is_err());
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!("unix-ms".parse::<TimeFormat>().unwrap(), TimeFormat::UnixMillis);
        assert_eq!("rfc3339".parse::<TimeFormat>().unwrap(), TimeFormat::Rfc3339);
        assert_eq!(
            "%H:%M".parse::<TimeFormat>().unwrap(),
            TimeFormat::Custom("%H:%M".to_string())
        );
    }
}
