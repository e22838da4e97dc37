use sha2::{Digest, Sha256};

/// Hex SHA-256 of scanned text. Activity logs store this instead of the raw
/// payload, which carries student names.
pub fn payload_digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
