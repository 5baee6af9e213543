//! Fixed-zone message timestamps.
//!
//! Every [`SentTime`] lives in [`DISPLAY_ZONE`] no matter which zone the host
//! runs in. On the wire it is the array
//! `[year, month, day, hour, minute, second, microseconds]` of the civil time
//! in that zone.

use std::fmt;

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::WIRE_TIME_LEN;
use crate::error::DecodeError;

/// Civil zone used for storage, transmission and rendering.
pub const DISPLAY_ZONE: Tz = chrono_tz::Asia::Ho_Chi_Minh;

/// Shortest array the decoder accepts. Some serializers drop trailing zero
/// seconds and sub-seconds.
const MIN_WIRE_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SentTime(DateTime<Tz>);

impl SentTime {
    /// Current instant, truncated to microsecond precision so that it
    /// survives a wire round trip unchanged.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    pub fn from_utc(instant: DateTime<Utc>) -> Self {
        let local = instant.with_timezone(&DISPLAY_ZONE);
        let micros = local.nanosecond() / 1_000;
        Self(local.with_nanosecond(micros * 1_000).unwrap_or(local))
    }

    pub fn as_utc(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }

    pub fn civil(&self) -> &DateTime<Tz> {
        &self.0
    }

    /// Wire representation in the display zone.
    pub fn encode(&self) -> [i64; WIRE_TIME_LEN] {
        let t = &self.0;
        [
            i64::from(t.year()),
            i64::from(t.month()),
            i64::from(t.day()),
            i64::from(t.hour()),
            i64::from(t.minute()),
            i64::from(t.second()),
            i64::from(t.nanosecond() / 1_000),
        ]
    }

    /// Decode a wire array. Missing second and microsecond fields default
    /// to zero; anything shorter, longer or out of range is rejected.
    pub fn decode(parts: &[i64]) -> Result<Self, DecodeError> {
        if parts.len() < MIN_WIRE_LEN || parts.len() > WIRE_TIME_LEN {
            return Err(DecodeError::Timestamp(format!(
                "expected {MIN_WIRE_LEN} to {WIRE_TIME_LEN} elements, got {}",
                parts.len()
            )));
        }

        let field = |idx: usize| -> Result<u32, DecodeError> {
            let raw = parts.get(idx).copied().unwrap_or(0);
            u32::try_from(raw)
                .map_err(|_| DecodeError::Timestamp(format!("field {idx} out of range: {raw}")))
        };

        let year = i32::try_from(parts[0])
            .map_err(|_| DecodeError::Timestamp(format!("year out of range: {}", parts[0])))?;
        let micros = field(6)?;
        if micros >= 1_000_000 {
            return Err(DecodeError::Timestamp(format!(
                "microseconds out of range: {micros}"
            )));
        }

        let (month, day) = (field(1)?, field(2)?);
        let (hour, minute, second) = (field(3)?, field(4)?, field(5)?);

        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_micro_opt(hour, minute, second, micros))
            .ok_or_else(|| DecodeError::Timestamp(format!("invalid civil time {parts:?}")))?;

        Self::from_civil(naive)
    }

    /// Decode any JSON shape the backend has been seen to emit: the wire
    /// array, or an ISO-8601 string (with offset, or naive in the display
    /// zone).
    pub fn from_json(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Array(items) => {
                let parts = items
                    .iter()
                    .map(|v| {
                        v.as_i64().ok_or_else(|| {
                            DecodeError::Timestamp(format!("non-integer element {v}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::decode(&parts)
            }
            Value::String(s) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Ok(Self::from_utc(dt.with_timezone(&Utc)));
                }
                let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .map_err(|e| DecodeError::Timestamp(format!("{s}: {e}")))?;
                Self::from_civil(naive)
            }
            Value::Null => Err(DecodeError::MissingField("sentTime")),
            other => Err(DecodeError::Timestamp(format!("unsupported shape {other}"))),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::from(self.encode().to_vec())
    }

    /// `HH:MM` in the display zone.
    pub fn format_clock(&self) -> String {
        self.0.format("%H:%M").to_string()
    }

    /// `DD/MM/YYYY HH:MM` in the display zone.
    pub fn format_full(&self) -> String {
        self.0.format("%d/%m/%Y %H:%M").to_string()
    }

    fn from_civil(naive: NaiveDateTime) -> Result<Self, DecodeError> {
        match DISPLAY_ZONE.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(Self(dt)),
            LocalResult::Ambiguous(earliest, _) => Ok(Self(earliest)),
            LocalResult::None => Err(DecodeError::Timestamp(format!(
                "{naive} does not exist in {DISPLAY_ZONE}"
            ))),
        }
    }
}

impl fmt::Display for SentTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_full())
    }
}

impl Serialize for SentTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.encode().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SentTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        SentTime::from_json(&value).map_err(serde::de::Error::custom)
    }
}
