use crate::types::Action;
use sha2::{Digest, Sha256};

const FINGERPRINT_HEX_LEN: usize = 16;

/// Canonical JSON for an action: the `type` tag first, then payload fields in
/// declaration order. Object keys inside `Custom.data` come out sorted.
pub fn canonical_json(action: &Action) -> String {
    serde_json::to_string(action).unwrap_or_else(|_| action.label().to_string())
}

/// Structural equality key for a step's action. Two actions with the same
/// label and the same payload always share a fingerprint.
pub fn fingerprint(action: &Action) -> String {
    let mut digest = Sha256::new();
    digest.update(canonical_json(action).as_bytes());
    let bytes = digest.finalize();
    let mut out = String::with_capacity(FINGERPRINT_HEX_LEN);
    for byte in bytes.iter().take(FINGERPRINT_HEX_LEN / 2) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
