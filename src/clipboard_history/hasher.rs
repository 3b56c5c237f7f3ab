//! Content fingerprints used as deduplication keys.
//!
//! A fingerprint is the first 16 hex chars of a SHA-256 digest. This is not a
//! security boundary, only a dedup key.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest
pub const FINGERPRINT_LEN: usize = 16;

fn truncated_hex(hasher: Sha256) -> String {
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Fingerprint of text content (its UTF-8 bytes)
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    truncated_hex(hasher)
}

/// Fingerprint of decoded RGBA pixels.
///
/// Dimensions are mixed in so that the same byte buffer reshaped to a
/// different width does not collide.
pub fn hash_image_pixels(width: u32, height: u32, rgba: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    hasher.update(rgba);
    truncated_hex(hasher)
}

/// Fingerprint of a file-URI set, independent of capture order.
///
/// URIs are sorted and de-duplicated before joining with `\n`.
pub fn hash_file_uris<S: AsRef<str>>(uris: &[S]) -> String {
    let mut sorted: Vec<&str> = uris.iter().map(|u| u.as_ref()).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = Sha256::new();
    hasher.update(sorted.join("\n").as_bytes());
    truncated_hex(hasher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_text_deterministic_and_truncated() {
        let a = hash_text("hello world");
        assert_eq!(a, hash_text("hello world"));
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        // sha256("hello world") = b94d27b9934d3e08...
        assert_eq!(a, "b94d27b9934d3e08");
    }

    #[test]
    fn test_hash_text_differs_for_different_content() {
        assert_ne!(hash_text("hello"), hash_text("hello "));
    }

    #[test]
    fn test_file_uris_order_independent() {
        let a = hash_file_uris(&["file:///a/b.txt", "file:///c/d.txt"]);
        let b = hash_file_uris(&["file:///c/d.txt", "file:///a/b.txt"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_file_uris_duplicates_collapse() {
        let dup = hash_file_uris(&["file:///a/b.txt", "file:///a/b.txt"]);
        let single = hash_file_uris(&["file:///a/b.txt"]);
        assert_eq!(dup, single);
    }

    #[test]
    fn test_image_hash_depends_on_pixels_and_shape() {
        let pixels = vec![0u8; 16];
        let square = hash_image_pixels(2, 2, &pixels);
        assert_eq!(square, hash_image_pixels(2, 2, &pixels));
        assert_ne!(square, hash_image_pixels(4, 1, &pixels));

        let mut other = pixels.clone();
        other[3] = 255;
        assert_ne!(square, hash_image_pixels(2, 2, &other));
    }
}
