//! Content address of a SQL query.
//!
//! Deliberately naive: trim whitespace, hash the bytes. No keyword casing, no
//! whitespace collapsing inside the query — two queries differing by any
//! interior byte are distinct jobs. This avoids parsing SQL and keeps the
//! fingerprint trivially reproducible by clients.

use sha2::{Digest, Sha256};

/// Canonicalize a SQL string the same way `fingerprint` does, without hashing it.
///
/// Exposed so callers that need the canonical text (e.g. for `upsert_query`)
/// don't re-derive the trimming rule themselves.
pub fn canonicalize(sql: &str) -> &str {
    sql.trim_matches(|c: char| c == ' ' || c == '\t' || c == '\n' || c == '\r')
}

/// SHA-256 hex digest of the trimmed, UTF-8-encoded SQL string.
pub fn fingerprint(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(sql).as_bytes());
    format!("{:x}", hasher.finalize())
}
