//
// uid.rs
// Report-Tools-rs
//
// DICOM UID generation: fresh UUID-derived UIDs and UIDs derived from an
// existing root so synthesized series stay recognisably related to the source.
//
// Report-Tools-rs maintainers - October 2026

use sha2::{Digest, Sha256};
use uuid::Uuid;

const MAX_UID_LEN: usize = 64;
/// Longest root kept from the source UID when deriving.
const MAX_ROOT_LEN: usize = 32;

/// A globally unique UID under the `2.25` UUID arc.
pub fn fresh_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

/// A new UID that keeps a prefix of `base` and appends a unique suffix.
/// Falls back to [`fresh_uid`] when `base` is not a usable UID.
pub fn derive_uid(base: &str) -> String {
    let base = base.trim().trim_end_matches('\0');
    if !is_valid_uid(base) {
        return fresh_uid();
    }

    let mut root = String::new();
    for component in base.split('.') {
        let next_len = root.len() + component.len() + usize::from(!root.is_empty());
        if next_len > MAX_ROOT_LEN {
            break;
        }
        if !root.is_empty() {
            root.push('.');
        }
        root.push_str(component);
    }
    if root.is_empty() {
        return fresh_uid();
    }

    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    let suffix = u128::from_be_bytes(bytes).to_string();

    let budget = MAX_UID_LEN - root.len() - 1;
    let mut suffix = &suffix[..suffix.len().min(budget)];
    // Components may not carry leading zeros.
    suffix = suffix.trim_start_matches('0');
    if suffix.is_empty() {
        suffix = "1";
    }
    format!("{}.{}", root, suffix)
}

pub fn is_valid_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid.len() <= MAX_UID_LEN
        && uid.split('.').all(|c| {
            !c.is_empty()
                && c.bytes().all(|b| b.is_ascii_digit())
                && (c == "0" || !c.starts_with('0'))
        })
}
