//! Database reader capability and its MaxMind implementation.
//!
//! A [`DatabaseReader`] opens a database file into a [`DatabaseHandle`]. The
//! handle is closed by dropping it; [`super::SharedState`] only drops a
//! superseded handle after its replacement is installed.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use maxminddb::{geoip2, Reader};

use super::types::{HandleMetadata, Record};
use crate::error_handling::GeoIpError;

/// An open, queryable geolocation database.
pub trait DatabaseHandle: Send + Sync {
    /// Returns the entry covering `address`, or `None` when there is none.
    fn lookup(&self, address: IpAddr) -> Result<Option<Record>, GeoIpError>;

    /// Format and version information for diagnostics.
    fn metadata(&self) -> HandleMetadata;
}

/// Opens database files.
pub trait DatabaseReader: Send + Sync {
    /// Opens the database at `path`; any failure is `DatabaseOpenFailed`.
    fn open(&self, path: &Path) -> Result<Arc<dyn DatabaseHandle>, GeoIpError>;
}

/// Opens MaxMind `.mmdb` files into memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaxMindReader;

impl DatabaseReader for MaxMindReader {
    fn open(&self, path: &Path) -> Result<Arc<dyn DatabaseHandle>, GeoIpError> {
        let db_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read GeoIP database from {}", path.display()))
            .map_err(|e| GeoIpError::open_failed(path, e))?;

        let reader = Reader::from_source(db_bytes)
            .with_context(|| format!("Failed to parse GeoIP database from {}", path.display()))
            .map_err(|e| GeoIpError::open_failed(path, e))?;

        Ok(Arc::new(MaxMindHandle { reader }))
    }
}

struct MaxMindHandle {
    reader: Reader<Vec<u8>>,
}

impl DatabaseHandle for MaxMindHandle {
    fn lookup(&self, address: IpAddr) -> Result<Option<Record>, GeoIpError> {
        let failed = |e: maxminddb::MaxMindDbError| GeoIpError::LookupFailed {
            address,
            source: e.into(),
        };

        let result = self.reader.lookup(address).map_err(failed)?;
        if !result.has_data() {
            return Ok(None);
        }

        // Only `country` counts: anonymous proxies and satellite providers
        // carry a registered country alone and must read as "no country"
        let entry: Option<geoip2::Country> = result.decode().map_err(failed)?;
        Ok(entry.map(|entry| Record {
            country_code: entry.country.iso_code.unwrap_or_default().to_string(),
            geoname_id: entry.country.geoname_id.unwrap_or(0),
        }))
    }

    fn metadata(&self) -> HandleMetadata {
        let metadata = &self.reader.metadata;
        HandleMetadata {
            database_type: metadata.database_type.clone(),
            build_epoch: metadata.build_epoch as u64,
            binary_format_major_version: metadata.binary_format_major_version as u16,
            binary_format_minor_version: metadata.binary_format_minor_version as u16,
        }
    }
}
