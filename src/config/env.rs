//! Environment overrides for handler settings.

use crate::config::constants::{ACCOUNT_ID_ENV, LICENSE_KEY_ENV, OVERRIDE_CODE_ENV};
use crate::config::GeoIpSettings;
use crate::error_handling::GeoIpError;

/// Applies `GEOIP_*` overrides read from the process environment.
pub fn apply_env_overrides(settings: GeoIpSettings) -> Result<GeoIpSettings, GeoIpError> {
    apply_overrides_from(settings, |name| std::env::var(name).ok())
}

/// Applies overrides read through `lookup`; empty values are ignored.
pub fn apply_overrides_from<F>(
    mut settings: GeoIpSettings,
    lookup: F,
) -> Result<GeoIpSettings, GeoIpError>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(value) = read(ACCOUNT_ID_ENV) {
        settings.account_id = value.trim().parse().map_err(|e| {
            GeoIpError::ConfigInvalid(format!("reading account id from {ACCOUNT_ID_ENV}: {e}"))
        })?;
    }

    if let Some(value) = read(LICENSE_KEY_ENV) {
        settings.license_key = value;
    }

    if let Some(value) = read(OVERRIDE_CODE_ENV) {
        settings.override_code = Some(value);
    }

    Ok(settings)
}
