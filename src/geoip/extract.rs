//! Archive extraction utilities.
//!
//! MaxMind serves editions as tar.gz archives containing `<edition>.mmdb`
//! inside a dated directory.

use anyhow::{Context, Result};

use crate::config::MAX_GEOIP_DOWNLOAD_SIZE;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Returns the `.mmdb` bytes of a downloaded body.
///
/// Gzip bodies are treated as tar.gz archives; anything else is assumed to
/// already be a database file.
pub(crate) fn database_bytes(body: Vec<u8>, edition: &str) -> Result<Vec<u8>> {
    if body.starts_with(&GZIP_MAGIC) {
        extract_mmdb_from_tar_gz(&body, edition)
    } else {
        Ok(body)
    }
}

/// Extracts `<edition>.mmdb` from a tar.gz archive.
pub(crate) fn extract_mmdb_from_tar_gz(tar_gz_bytes: &[u8], edition: &str) -> Result<Vec<u8>> {
    extract_limited(tar_gz_bytes, edition, MAX_GEOIP_DOWNLOAD_SIZE)
}

/// Like [`extract_mmdb_from_tar_gz`], refusing entries larger than `max_size`.
fn extract_limited(tar_gz_bytes: &[u8], edition: &str, max_size: usize) -> Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tar::Archive;

    log::debug!("Extracting {}.mmdb from tar.gz archive", edition);

    let gz_decoder = GzDecoder::new(tar_gz_bytes);
    let mut tar_archive = Archive::new(gz_decoder);

    let entries = tar_archive
        .entries()
        .with_context(|| "Failed to read tar archive entries")?;

    let expected_name = format!("{}.mmdb", edition);
    for entry_result in entries {
        let mut entry = entry_result.with_context(|| "Failed to read tar entry")?;
        let path = entry.path().with_context(|| "Failed to get entry path")?;

        // Only the file name is compared so nested directories match and
        // no entry path is ever joined onto the filesystem
        if path.file_name().and_then(|n| n.to_str()) == Some(expected_name.as_str()) {
            // The compressed size says little about the unpacked size
            let mut mmdb_bytes = Vec::new();
            entry
                .by_ref()
                .take(max_size as u64 + 1)
                .read_to_end(&mut mmdb_bytes)
                .with_context(|| format!("Failed to read {} from archive", expected_name))?;
            if mmdb_bytes.len() > max_size {
                return Err(anyhow::anyhow!(
                    "{} in archive too large (max: {} bytes)",
                    expected_name,
                    max_size
                ));
            }
            log::info!(
                "Extracted {} from tar.gz ({} bytes)",
                expected_name,
                mmdb_bytes.len()
            );
            return Ok(mmdb_bytes);
        }
    }

    Err(anyhow::anyhow!("{} not found in tar.gz archive", expected_name))
}
