// Stable identity for extracted rows.
use sha2::{Digest, Sha256};

use crate::types::ExtractedRow;

/// Fields that carry a usable identity on their own, best first.
const PREFERRED_KEY_FIELDS: &[&str] = &["numero_d_installation", "numero_de_confirmation", "id"];

/// Default width of the content-hash fallback key, in hex characters.
///
/// 8 chars is 32 bits: two rows with genuinely different content can
/// collide. Accepted tradeoff for short keys; widen via `KEY_HASH_LEN` if
/// it ever bites.
pub const DEFAULT_KEY_HASH_LEN: usize = 8;

/// Resolve the stable key for a row: the first preferred field with a
/// non-empty value wins, unmodified. Otherwise a truncated SHA-256 over the
/// row content.
pub fn resolve_key(row: &ExtractedRow, hash_len: usize) -> String {
    for field in PREFERRED_KEY_FIELDS {
        if let Some(value) = row.get(*field) {
            if !value.is_empty() {
                return value.clone();
            }
        }
    }
    content_key(row, hash_len)
}

/// Content-hash fallback. Rows are `BTreeMap`s, so serialization order is
/// lexicographic by field name and identical content hashes identically no
/// matter what order the cells were extracted in.
fn content_key(row: &ExtractedRow, hash_len: usize) -> String {
    let serialized = serde_json::to_string(row).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(hash_len);
    key
}
