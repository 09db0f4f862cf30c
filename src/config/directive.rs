//! Block-style configuration files.
//!
//! ```text
//! geo_ip {
//!     db_path               GeoLite2-Country.mmdb
//!     trust_header          X-Real-IP
//!     account_id            1000
//!     api_key               REDACTED
//!     reload_frequency      24h
//!     override_country_code AU
//! }
//! ```
//!
//! One directive per line, `#` starts a comment, values may be double-quoted.
//! Both the JSON field names and the historical directive names are accepted.

use std::path::PathBuf;

use crate::config::duration::parse_duration;
use crate::config::GeoIpSettings;
use crate::error_handling::GeoIpError;

/// Name of the block holding GeoIP settings.
pub const BLOCK_NAME: &str = "geo_ip";

/// Parses a `geo_ip { ... }` block into settings.
///
/// Unknown directives are logged and skipped. The returned settings are not
/// yet validated.
pub fn parse_directives(input: &str) -> Result<GeoIpSettings, GeoIpError> {
    let mut settings = GeoIpSettings::default();
    let mut in_block = false;
    let mut seen_block = false;

    for (index, raw_line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if !in_block {
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(BLOCK_NAME), Some("{"), None) if !seen_block => {
                    in_block = true;
                    seen_block = true;
                    continue;
                }
                _ => {
                    return Err(invalid(
                        line_no,
                        format!("expected \"{BLOCK_NAME} {{\", found {line:?}"),
                    ))
                }
            }
        }

        if line == "}" {
            in_block = false;
            continue;
        }

        let (key, value) = match line.split_once(char::is_whitespace) {
            Some((key, rest)) => (key, unquote(rest.trim())),
            None => (line, None),
        };
        apply_directive(&mut settings, key, value, line_no)?;
    }

    if in_block {
        return Err(GeoIpError::ConfigInvalid(format!(
            "unterminated {BLOCK_NAME} block"
        )));
    }
    if !seen_block {
        return Err(GeoIpError::ConfigInvalid(format!(
            "no {BLOCK_NAME} block found"
        )));
    }

    Ok(settings)
}

fn apply_directive(
    settings: &mut GeoIpSettings,
    key: &str,
    value: Option<&str>,
    line_no: usize,
) -> Result<(), GeoIpError> {
    match key {
        "db_path" | "database_path" => {
            let value = value.ok_or_else(|| invalid(line_no, "missing db path".to_string()))?;
            settings.database_path = PathBuf::from(value);
        }
        "trust_header" => settings.trust_header = value.map(str::to_string),
        "account_id" => {
            if let Some(value) = value {
                settings.account_id = value.parse().map_err(|e| {
                    invalid(line_no, format!("invalid account number {value}: {e}"))
                })?;
            }
        }
        "api_key" | "license_key" => {
            if let Some(value) = value {
                settings.license_key = value.to_string();
            }
        }
        "reload_frequency" | "reload_interval" => {
            settings.reload_interval = required_duration(key, value, line_no)?;
        }
        "download_frequency" | "download_interval" => {
            settings.download_interval = required_duration(key, value, line_no)?;
        }
        "override_country_code" | "override_code" => {
            settings.override_code = value.map(str::to_string)
        }
        other => log::warn!("ignoring unknown directive {other:?} on line {line_no}"),
    }
    Ok(())
}

fn required_duration(
    key: &str,
    value: Option<&str>,
    line_no: usize,
) -> Result<std::time::Duration, GeoIpError> {
    let value = value.ok_or_else(|| invalid(line_no, format!("{key} needs a duration")))?;
    parse_duration(value).map_err(|e| invalid(line_no, e.to_string()))
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn unquote(value: &str) -> Option<&str> {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn invalid(line_no: usize, message: String) -> GeoIpError {
    GeoIpError::ConfigInvalid(format!("line {line_no}: {message}"))
}
