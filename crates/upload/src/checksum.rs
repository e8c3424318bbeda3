//! Chunk checksum verification: `"<algorithm> <base64-digest>"` headers.

use base64::Engine;
use md5::Md5;
use sha2::{Digest, Sha256};

use nexus_core::{Error, Result};

/// Verify `header` (e.g. `"sha256 <base64>"`) against `data`.
///
/// Supported algorithms: `sha256`, `md5`, `crc32`. An unrecognized algorithm
/// name is treated as a validation error, not a mismatch, since the client
/// sent something the server cannot even check.
pub fn verify(header: &str, data: &[u8]) -> Result<()> {
    let (algo, encoded) = header
        .split_once(' ')
        .ok_or_else(|| Error::Validation(format!("malformed checksum header: {header}")))?;

    let expected = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::Validation(format!("invalid base64 checksum: {e}")))?;

    let actual = digest(algo, data)?;
    if actual == expected {
        Ok(())
    } else {
        Err(Error::UploadChecksumMismatch(algo.to_string()))
    }
}

fn digest(algo: &str, data: &[u8]) -> Result<Vec<u8>> {
    match algo {
        "sha256" => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            Ok(hasher.finalize().to_vec())
        }
        "md5" => {
            let mut hasher = Md5::new();
            hasher.update(data);
            Ok(hasher.finalize().to_vec())
        }
        "crc32" => Ok(crc32fast::hash(data).to_be_bytes().to_vec()),
        other => Err(Error::Validation(format!("unsupported checksum algorithm: {other}"))),
    }
}
