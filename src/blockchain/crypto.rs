use sha2::{Digest, Sha256};

/// Number of hexadecimal digits in a SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Hashes UTF-8 text with SHA-256
///
/// # Arguments
///
/// * `data` - The text to hash
///
/// # Returns
///
/// The digest as a lowercase hexadecimal string
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks whether a hex digest starts with at least `difficulty` zero digits
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    if difficulty > hash.len() {
        return false;
    }

    hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Checks that a string looks like a SHA-256 hex digest
pub fn is_hex_digest(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit())
}
