//! Durations as milliseconds in JSON (`"max_dt_ms": 50`).
//!
//! Written as whole milliseconds. Reading also accepts fractional values such as
//! `16.6` for a 60 Hz frame; negative or non-finite values are rejected.

use std::fmt;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(MillisVisitor)
}

struct MillisVisitor;

impl Visitor<'_> for MillisVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative number of milliseconds")
    }

    fn visit_u64<E: de::Error>(self, ms: u64) -> Result<Duration, E> {
        Ok(Duration::from_millis(ms))
    }

    fn visit_i64<E: de::Error>(self, ms: i64) -> Result<Duration, E> {
        u64::try_from(ms)
            .map(Duration::from_millis)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(ms), &self))
    }

    fn visit_f64<E: de::Error>(self, ms: f64) -> Result<Duration, E> {
        Duration::try_from_secs_f64(ms / 1_000.0)
            .map_err(|_| E::invalid_value(de::Unexpected::Float(ms), &self))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timed {
        #[serde(with = "crate::serde_duration")]
        elapsed: Duration,
    }

    #[test]
    fn sub_millisecond_precision_is_dropped_on_write() {
        let json = serde_json::to_string(&Timed {
            elapsed: Duration::from_micros(2_750),
        })
        .unwrap();
        assert_eq!(json, r#"{"elapsed":2}"#);

        let back: Timed = serde_json::from_str(&json).unwrap();
        assert_eq!(back.elapsed, Duration::from_millis(2));
    }

    #[test]
    fn fractional_millis_are_read() {
        let t: Timed = serde_json::from_str(r#"{"elapsed":16.5}"#).unwrap();
        assert!((t.elapsed.as_secs_f64() - 0.0165).abs() < 1e-9);
    }

    #[test]
    fn negative_and_non_numeric_values_are_rejected() {
        assert!(serde_json::from_str::<Timed>(r#"{"elapsed":-5}"#).is_err());
        assert!(serde_json::from_str::<Timed>(r#"{"elapsed":-0.5}"#).is_err());
        assert!(serde_json::from_str::<Timed>(r#"{"elapsed":"50"}"#).is_err());
    }
}
