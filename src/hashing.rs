//! Render Fingerprints - SHA-256 over PNG bytes
//!
//! Rendering is deterministic, so the digest of a card identifies exactly
//! what was handed out. It goes to operator logs, never into the image.

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fingerprint of a rendered card.
pub fn render_fingerprint(png: &[u8]) -> String {
    sha256_hex(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let data = b"test data";
        assert_eq!(sha256_hex(data), sha256_hex(data));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_differs_on_change() {
        assert_ne!(render_fingerprint(&[1, 2, 3]), render_fingerprint(&[1, 2, 4]));
    }
}
