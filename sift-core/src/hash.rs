//! Content hashing for drift detection.
//!
//! Cached embeddings are keyed by issue id and guarded by a hash of the
//! normalized issue text. A changed hash means the issue was edited and the
//! cached embedding is stale.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Separator placed between normalized title and body before hashing.
const FIELD_SEPARATOR: &str = "\u{1f}";

/// SHA-256 digest of normalized issue text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

/// Compute the content hash of an issue's title and body.
///
/// Both inputs are trimmed and lowercased; a missing value hashes the same as
/// an empty string.
pub fn compute_content_hash(title: Option<&str>, body: Option<&str>) -> ContentHash {
    let title = normalize(title);
    let body = normalize(body);

    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(FIELD_SEPARATOR.as_bytes());
    hasher.update(body.as_bytes());
    let result = hasher.finalize();

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    ContentHash(hash)
}

fn normalize(value: Option<&str>) -> String {
    value.unwrap_or_default().trim().to_lowercase()
}

// =============================================================================
// TESTS
// =============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Hashing the same inputs twice always yields the same digest.
        #[test]
        fn prop_hash_deterministic(title in ".{0,80}", body in ".{0,200}") {
            prop_assert_eq!(
                compute_content_hash(Some(&title), Some(&body)),
                compute_content_hash(Some(&title), Some(&body))
            );
        }

        /// Surrounding whitespace and ASCII case never change the digest.
        #[test]
        fn prop_hash_ignores_padding_and_case(
            title in "[a-zA-Z0-9 ]{0,40}",
            body in "[a-zA-Z0-9 ]{0,80}",
            pad in " {0,4}"
        ) {
            let padded_title = format!("{pad}{}{pad}", title.to_uppercase());
            let padded_body = format!("{pad}{}{pad}", body);
            prop_assert_eq!(
                compute_content_hash(Some(&padded_title), Some(&padded_body)),
                compute_content_hash(Some(&title), Some(&body))
            );
        }

        /// Different normalized titles produce different digests.
        #[test]
        fn prop_hash_distinguishes_titles(a in "[a-z]{1,30}", b in "[a-z]{1,30}") {
            prop_assume!(a != b);
            prop_assert_ne!(
                compute_content_hash(Some(&a), Some("body")),
                compute_content_hash(Some(&b), Some("body"))
            );
        }
    }
}
