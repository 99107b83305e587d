//! Content fingerprints and the path key that names persisted indexes.
//!
//! Two tiers: a fast fingerprint (length, modification time and a handful of
//! sampled regions) checked on every open, and a full SHA-512 of the content
//! computed in the background once the file is usable.

use crate::error::{HfrError, Result};
use crate::index::types::FingerprintConfig;
use crate::utils::encoding::to_hex;
use crate::utils::io::read_full_at;
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const FULL_HASH_CHUNK: usize = 1024 * 1024;

/// Absolute form of `path` used for keying (canonical when possible)
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Key of the index files for `path`: hash of the lower-cased absolute path
pub fn path_key(path: &Path) -> String {
    let normalized = normalize_path(path);
    let lowered = normalized.to_string_lossy().to_lowercase();
    let digest = Sha256::digest(lowered.as_bytes());
    to_hex(&digest[..16])
}

fn mtime_nanos(mtime: Option<SystemTime>) -> u128 {
    mtime
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Hash of length, modification time and evenly spaced samples of the content.
/// Small files are hashed whole.
pub fn fast_fingerprint(
    file: &File,
    len: u64,
    mtime: Option<SystemTime>,
    config: FingerprintConfig,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(len.to_le_bytes());
    hasher.update(mtime_nanos(mtime).to_le_bytes());

    let samples = config.samples.max(1) as u64;
    let sample_bytes = config.sample_bytes.max(1) as u64;
    let mut buf = vec![0u8; sample_bytes as usize];

    if len <= samples * sample_bytes {
        let mut offset = 0;
        while offset < len {
            let n = read_full_at(file, &mut buf, offset)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            offset += n as u64;
        }
    } else {
        let span = len - sample_bytes;
        for i in 0..samples {
            // First sample at 0, last one ends at EOF
            let offset = if samples == 1 { 0 } else { span * i / (samples - 1) };
            let n = read_full_at(file, &mut buf, offset)?;
            hasher.update(offset.to_le_bytes());
            hasher.update(&buf[..n]);
        }
    }

    Ok(to_hex(&hasher.finalize()))
}

/// SHA-512 of the whole file. Checks `cancel` between chunks.
pub fn full_fingerprint(file: &File, cancel: &AtomicBool) -> Result<String> {
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; FULL_HASH_CHUNK];
    let mut offset = 0u64;

    loop {
        if cancel.load(Ordering::Acquire) {
            return Err(HfrError::Cancelled);
        }
        let n = read_full_at(file, &mut buf, offset)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        offset += n as u64;
    }

    Ok(to_hex(&hasher.finalize()))
}
