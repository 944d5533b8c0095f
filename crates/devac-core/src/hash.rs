//! SHA-256 helpers shared by the writer, update manager, and rename detector

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a byte buffer.
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of a file's contents.
pub fn compute_file_hash(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(compute_content_hash(&bytes))
}

/// Order-insensitive combination of a set of hashes.
///
/// Each input is re-hashed and the digests are XOR-folded, so any
/// permutation of the same set yields the same result. Used for scope-level
/// hashes where member order is not meaningful.
pub fn combine_hashes<I, S>(hashes: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut acc = [0u8; 32];
    for h in hashes {
        let mut hasher = Sha256::new();
        hasher.update(h.as_ref().as_bytes());
        let digest = hasher.finalize();
        for (a, d) in acc.iter_mut().zip(digest.iter()) {
            *a ^= d;
        }
    }
    hex::encode(acc)
}

/// Random lowercase-hex string of exactly `len` characters.
pub fn random_hash(len: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    (0..len)
        .map(|_| HEX[fastrand::usize(..16)] as char)
        .collect()
}
