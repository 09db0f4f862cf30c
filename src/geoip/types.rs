//! GeoIP data structures.
//!
//! This module defines the data structures used for GeoIP lookups and status.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

/// Country data for one address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    /// ISO 3166-1 alpha-2 code, empty when the entry carries none
    pub country_code: String,
    /// GeoNames id of the country, 0 when the entry carries none
    pub geoname_id: u32,
}

impl Record {
    /// Whether the record identifies a country.
    pub fn has_country(&self) -> bool {
        self.geoname_id != 0
    }
}

/// Result of asking a database state about an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// No database is loaded.
    NoDatabase,
    /// The database has no entry covering the address.
    NotFound,
    /// The covering entry.
    Found(Record),
}

/// Format and version information of an open database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandleMetadata {
    pub database_type: String,
    pub build_epoch: u64,
    pub binary_format_major_version: u16,
    pub binary_format_minor_version: u16,
}

/// Outcome of a successful reload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new handle was installed.
    Loaded(HandleMetadata),
    /// The file does not exist; nothing changed.
    Absent,
    /// The state was shut down; nothing changed.
    Closed,
}

/// Load state of a database slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DatabaseStatus {
    Unloaded,
    Loaded { metadata: HandleMetadata },
    Closed,
}

impl DatabaseStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, DatabaseStatus::Loaded { .. })
    }
}

/// Diagnostic summary of a database state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub path: PathBuf,
    pub refresh: &'static str,
    pub database: DatabaseStatus,
    pub events: BTreeMap<&'static str, usize>,
}
