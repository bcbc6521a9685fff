//! SHA-256 checksums in the canonical `sha256:<hex>` form
//!
//! Dependencies are pinned to the digest of their raw bytes; these helpers are
//! the only place that form is produced.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const CHECKSUM_PREFIX: &str = "sha256:";

/// Hash raw bytes
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{CHECKSUM_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Hash a string's UTF-8 bytes
pub fn hash_string(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

/// Hash a file's contents, streaming in 8KB chunks
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .await
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{CHECKSUM_PREFIX}{}", hex::encode(hasher.finalize())))
}
