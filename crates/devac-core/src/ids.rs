//! Deterministic entity identifiers
//!
//! Same input file + same symbol definition must produce the same ID across
//! runs and machines. IDs take the form
//! `<repo>:<package>:<kind>:<16 hex chars of SHA-256>` where the hash covers
//! the normalized file path, qualified name, and kind.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::model::NodeKind;

/// Sentinel prefix for references that no resolver has bound yet.
pub const UNRESOLVED_PREFIX: &str = "unresolved:";

/// Build the sentinel ID for a name that could not be resolved.
pub fn unresolved(name: &str) -> String {
    format!("{UNRESOLVED_PREFIX}{name}")
}

pub fn is_unresolved(entity_id: &str) -> bool {
    entity_id.starts_with(UNRESOLVED_PREFIX)
}

/// Generate the stable entity ID for a symbol definition.
///
/// 64 bits of hash width; collisions between two distinct symbols within a
/// package are treated as negligible.
pub fn generate_entity_id(
    repo: &str,
    package: &str,
    kind: NodeKind,
    file_path: &str,
    qualified_name: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_path(file_path).as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_text(qualified_name).as_bytes());
    hasher.update([0u8]);
    hasher.update(kind.as_str().as_bytes());
    let digest = hasher.finalize();
    let short = hex::encode(&digest[..8]);
    format!("{repo}:{package}:{}:{short}", kind.as_str())
}

/// NFC-normalize and collapse runs of whitespace to a single space.
pub fn normalize_text(s: &str) -> String {
    let nfc: String = s.nfc().collect();
    let mut out = String::with_capacity(nfc.len());
    let mut in_ws = false;
    for c in nfc.trim().chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}

/// Package-relative, forward-slashed path form used in IDs and seed rows.
pub fn normalize_path(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let trimmed = forward.strip_prefix("./").unwrap_or(&forward);
    trimmed.to_string()
}
