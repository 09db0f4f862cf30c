//! Humanized duration parsing.
//!
//! Refresh intervals are written as `24h`, `1h30m` or a plain number of
//! seconds, both in JSON settings and in directive files.

use std::str::FromStr;
use std::time::Duration;

use humanize_rs::ParseError;
use serde::{Deserialize, Deserializer};

use crate::error_handling::GeoIpError;

/// Parses a humanized duration string.
///
/// A bare integer is taken as seconds. Negative values, fractional values
/// without a unit and unknown units are rejected.
pub fn parse_duration(value: &str) -> Result<Duration, GeoIpError> {
    let value = value.trim();
    match humanize_rs::duration::parse(value) {
        Ok(d) => Ok(d),
        Err(ParseError::MissingUnit) => u64::from_str(value)
            .map(Duration::from_secs)
            .map_err(|_| GeoIpError::ConfigInvalid(format!("bad duration value {value:?}"))),
        Err(e) => Err(GeoIpError::ConfigInvalid(format!(
            "bad duration value {value:?}: {e}"
        ))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Seconds(u64),
    Text(String),
}

/// `deserialize_with` helper accepting an integer number of seconds or a
/// humanized string.
pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationRepr::deserialize(deserializer)? {
        DurationRepr::Seconds(secs) => Ok(Duration::from_secs(secs)),
        DurationRepr::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
