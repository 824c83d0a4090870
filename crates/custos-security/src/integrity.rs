// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Evidence integrity — SHA-256 hashing for tamper detection.
//
// Digest comparison goes through `subtle`: the time taken does not depend on
// how many leading characters match.

use custos_core::error::CustosError;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
///
/// Used for evidence content hashes and for custody-entry chain hashes.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Constant-time equality of two hex digests.
pub fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Whether `data` hashes to `expected_hex`.
pub fn matches_hash(data: &[u8], expected_hex: &str) -> bool {
    digests_match(&hash_bytes(data), expected_hex)
}

/// Verify that `data` matches the expected SHA-256 hex digest.
///
/// Returns `Ok(())` when the hash matches, or
/// `Err(CustosError::IntegrityMismatch)` with the expected and actual
/// values when it does not.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), CustosError> {
    let actual = hash_bytes(data);
    if digests_match(&actual, expected_hex) {
        Ok(())
    } else {
        Err(CustosError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SHA-256 of the empty byte slice (well-known constant).
    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hash_empty_input() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
    }

    #[test]
    fn hash_known_value() {
        // SHA-256("hello"), verified against coreutils sha256sum.
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert_eq!(hash_bytes(b"hello"), expected);
    }

    #[test]
    fn digests_of_different_length_never_match() {
        assert!(!digests_match("abcd", "abc"));
        assert!(digests_match("abcd", "abcd"));
    }

    #[test]
    fn matches_hash_detects_single_byte_change() {
        let hex = hash_bytes(b"post-123");
        assert!(matches_hash(b"post-123", &hex));
        assert!(!matches_hash(b"post-124", &hex));
    }

    #[test]
    fn verify_mismatched_hash() {
        let result = verify_hash(b"a", "0000");
        match result.unwrap_err() {
            CustosError::IntegrityMismatch { expected, actual } => {
                assert_eq!(expected, "0000");
                assert_eq!(actual, hash_bytes(b"a"));
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }
}
