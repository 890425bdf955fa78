//! Serde helpers for `chrono::Duration` as whole/fractional seconds.

use chrono::Duration;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = value.num_milliseconds();
    serializer.serialize_f64(millis as f64 / 1000.0)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Ok(Duration::milliseconds((secs * 1000.0).round() as i64))
}
