//! Conversion between the wire timestamp and the store's datetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Seconds of 0001-01-01T00:00:00Z relative to the Unix epoch.
pub const MIN_SECONDS: i64 = -62_135_596_800;
/// Seconds of 9999-12-31T23:59:59Z relative to the Unix epoch.
pub const MAX_SECONDS: i64 = 253_402_300_799;

const NANOS_PER_SECOND: i32 = 1_000_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp is missing")]
    Missing,

    #[error("nanos {0} is outside [0, 1000000000)")]
    NanosOutOfRange(i32),

    #[error("seconds {0} is outside the years 0001 to 9999")]
    SecondsOutOfRange(i64),
}

/// Wire representation of a point in time: seconds since the Unix epoch
/// plus a non-negative sub-second fraction in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    fn validate(&self) -> Result<(), TimestampError> {
        if !(0..NANOS_PER_SECOND).contains(&self.nanos) {
            return Err(TimestampError::NanosOutOfRange(self.nanos));
        }
        if !(MIN_SECONDS..=MAX_SECONDS).contains(&self.seconds) {
            return Err(TimestampError::SecondsOutOfRange(self.seconds));
        }
        Ok(())
    }
}

/// Store-native datetime with microsecond precision.
///
/// Serializes as RFC 3339 with exactly six fractional digits and a `Z`
/// suffix, which is also the precision of a PostgreSQL TIMESTAMPTZ column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorageDatetime(pub DateTime<Utc>);

impl Serialize for StorageDatetime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
    }
}

impl<'de> Deserialize<'de> for StorageDatetime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| StorageDatetime(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}

impl StorageDatetime {
    pub fn now() -> Self {
        StorageDatetime(datetime_micros())
    }

    pub fn inner(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl std::fmt::Display for StorageDatetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}

impl From<DateTime<Utc>> for StorageDatetime {
    fn from(dt: DateTime<Utc>) -> Self {
        StorageDatetime(dt)
    }
}

impl From<StorageDatetime> for DateTime<Utc> {
    fn from(dt: StorageDatetime) -> Self {
        dt.0
    }
}

/// Decode a caller-supplied wire timestamp into the store's datetime.
pub fn decode(timestamp: Option<&Timestamp>) -> Result<StorageDatetime, TimestampError> {
    let timestamp = timestamp.ok_or(TimestampError::Missing)?;
    timestamp.validate()?;
    // validate() bounds nanos to [0, 1e9), so the cast is lossless
    DateTime::from_timestamp(timestamp.seconds, timestamp.nanos as u32)
        .map(StorageDatetime)
        .ok_or(TimestampError::SecondsOutOfRange(timestamp.seconds))
}

/// Encode a stored datetime for the wire.
pub fn encode(datetime: &StorageDatetime) -> Result<Timestamp, TimestampError> {
    let nanos = i32::try_from(datetime.0.timestamp_subsec_nanos())
        .map_err(|_| TimestampError::NanosOutOfRange(i32::MAX))?;
    let timestamp = Timestamp::new(datetime.0.timestamp(), nanos);
    timestamp.validate()?;
    Ok(timestamp)
}

/// Create a DateTime truncated to microsecond precision (6 decimal places)
fn datetime_micros() -> DateTime<Utc> {
    let now = match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(time) => time,
        Err(_) => std::time::Duration::from_secs(0),
    };

    let timestamp_micros = (now.as_secs() as i64 * 1_000_000) + (now.subsec_micros() as i64);
    if let Some(time) = DateTime::from_timestamp_micros(timestamp_micros) {
        time
    } else {
        DateTime::<Utc>::from_timestamp_nanos(0)
    }
}
