//! Utility types and functions for snow series cleaning

use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Flag indicating result of a cleaning check for a given data point
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Flag {
    /// The data point passed the check with no issues
    Pass,
    /// The data point failed the check and should be treated as a sensor artifact
    Fail,
    /// The data point was missing before the check ran
    ///
    /// This is also returned when the value was NaN or infinite, since those are treated the same
    /// as a missing reading.
    DataMissing,
}

impl Flag {
    /// Whether a value carrying this flag survives the check
    pub fn is_pass(self) -> bool {
        self == Flag::Pass
    }
}

/// Unix timestamp, inner i64 is milliseconds since unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Parse an ISO-8601 / RFC 3339 timestamp, as delivered by the observation API
    ///
    /// ## Errors
    ///
    /// - the string is not a valid RFC 3339 timestamp
    pub fn parse(s: &str) -> Result<Self, Error> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.timestamp_millis()))
            .map_err(|e| Error::InvalidTimestamp(format!("{s}: {e}")))
    }

    /// Build a timestamp from whole hours since the unix epoch
    ///
    /// Saturates at the ends of the `i64` range rather than overflowing.
    pub fn from_hours(hours: i64) -> Self {
        Self(hours.saturating_mul(3_600_000))
    }

    /// Convert back into a chrono datetime, if the value is in chrono's range
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

/// A value as it arrives from upstream, before numeric normalization
///
/// Observation APIs deliver readings as JSON numbers, numeric strings, or null, so all three are
/// accepted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// A numeric reading
    Number(f64),
    /// A reading delivered as text, which may or may not parse
    Text(String),
    /// No reading
    Missing,
}

impl RawValue {
    /// Coerce to a number, giving `None` for anything that isn't a finite number
    pub fn to_value(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) => normalize(Some(*v)),
            RawValue::Text(s) => normalize(s.trim().parse::<f64>().ok()),
            RawValue::Missing => None,
        }
    }
}

impl From<Option<f64>> for RawValue {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) => RawValue::Number(v),
            None => RawValue::Missing,
        }
    }
}

/// One sensor reading of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Time of the observation
    pub timestamp: Timestamp,
    /// The observed value, `None` if missing or invalidated
    pub value: Option<f64>,
    /// Identifier of the series (usually the station id), carried through unchanged
    pub series_id: String,
}

impl DataPoint {
    /// Build a point from a numeric reading
    pub fn new(timestamp: Timestamp, value: Option<f64>, series_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            value,
            series_id: series_id.into(),
        }
    }

    /// Build a point from an unnormalized upstream value
    pub fn from_raw(timestamp: Timestamp, raw: &RawValue, series_id: impl Into<String>) -> Self {
        Self::new(timestamp, raw.to_value(), series_id)
    }
}

pub(crate) fn is_valid(value: f64) -> bool {
    !f64::is_nan(value) && !f64::is_infinite(value)
}

/// Map NaN and infinite values to `None`
pub(crate) fn normalize(value: Option<f64>) -> Option<f64> {
    value.filter(|v| is_valid(*v))
}

/// Replace every value whose flag is not [`Flag::Pass`] with `None`
pub(crate) fn apply_flags(values: &[Option<f64>], flags: &[Flag]) -> Vec<Option<f64>> {
    values
        .iter()
        .zip(flags)
        .map(|(value, flag)| if flag.is_pass() { *value } else { None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_parse() {
        assert_eq!(
            Timestamp::parse("1970-01-01T01:00:00Z").unwrap(),
            Timestamp::from_hours(1)
        );
        assert_eq!(
            Timestamp::parse("1970-01-01T02:00:00+01:00").unwrap(),
            Timestamp::from_hours(1)
        );
        assert!(matches!(
            Timestamp::parse("yesterday"),
            Err(Error::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_raw_value() {
        assert_eq!(RawValue::Number(1.5).to_value(), Some(1.5));
        assert_eq!(RawValue::Text(" 2.25".to_string()).to_value(), Some(2.25));
        assert_eq!(RawValue::Text("T".to_string()).to_value(), None);
        assert_eq!(RawValue::Text("NaN".to_string()).to_value(), None);
        assert_eq!(RawValue::Number(f64::NAN).to_value(), None);
        assert_eq!(RawValue::Missing.to_value(), None);
        assert_eq!(RawValue::from(Some(3.)), RawValue::Number(3.));
        assert_eq!(RawValue::from(None), RawValue::Missing);
    }

    #[test]
    fn test_raw_value_deserialize() {
        let raw: Vec<RawValue> = serde_json::from_str(r#"[1.5, "0.2", null]"#).unwrap();
        assert_eq!(
            raw,
            vec![
                RawValue::Number(1.5),
                RawValue::Text("0.2".to_string()),
                RawValue::Missing
            ]
        );

        let point = DataPoint::from_raw(Timestamp(0), &raw[1], "alta");
        assert_eq!(point.value, Some(0.2));
        assert_eq!(point.series_id, "alta");
    }

    #[test]
    fn test_timestamp_from_hours() {
        assert_eq!(Timestamp::from_hours(-2), Timestamp(-7_200_000));
        assert_eq!(Timestamp::from_hours(i64::MAX), Timestamp(i64::MAX));
        assert_eq!(Timestamp::from_hours(i64::MIN), Timestamp(i64::MIN));
        assert_eq!(Timestamp::from_hours(i64::MAX).to_datetime(), None);
    }

    #[test]
    fn test_timestamp_chrono() {
        let dt = Timestamp::from_hours(5).to_datetime().unwrap();
        assert_eq!(Timestamp::from(dt), Timestamp::from_hours(5));
        assert_eq!(dt.to_rfc3339(), "1970-01-01T05:00:00+00:00");
    }

    #[test]
    fn test_apply_flags() {
        assert_eq!(
            apply_flags(
                &[Some(1.), Some(2.), None],
                &[Flag::Pass, Flag::Fail, Flag::DataMissing]
            ),
            vec![Some(1.), None, None]
        );
    }
}
