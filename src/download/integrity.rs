//! CRC32 verification of received bundle bytes.

use tracing::debug;

use super::DownloadError;

/// Checks `bytes` against `expected` when a CRC is requested.
///
/// # Errors
///
/// Returns [`DownloadError::CrcMismatch`] when the computed CRC differs.
pub fn verify_crc(expected: Option<u32>, source_name: &str, bytes: &[u8]) -> Result<(), DownloadError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let actual = crc32fast::hash(bytes);
    if actual != expected {
        return Err(DownloadError::crc_mismatch(source_name, expected, actual));
    }

    debug!(source = %source_name, crc = expected, "CRC verified");
    Ok(())
}
