// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content encryption — AES-256-GCM over evidence bytes.
//
// Each payload is sealed under its own derived key with a fresh 96-bit nonce
// from the OS CSPRNG. The caller passes the evidence id as associated data,
// which binds the ciphertext to the item it was collected for.

use custos_core::error::{CustosError, Result};
use custos_core::types::EncryptedPayload;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, instrument, warn};

use crate::keys::DerivedKey;

/// Length of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Stateless AEAD wrapper. Holds only the system RNG.
pub struct ContentCipher {
    rng: SystemRandom,
}

impl Default for ContentCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentCipher {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Encrypt `plaintext` and return ciphertext, nonce, and tag separately.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8], key: &DerivedKey, aad: &[u8]) -> Result<EncryptedPayload> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CustosError::Crypto("nonce generation failed".into()))?;

        let key = aead_key(key)?;
        let mut in_out = plaintext.to_vec();
        let tag = key
            .seal_in_place_separate_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad),
                &mut in_out,
            )
            .map_err(|_| CustosError::Crypto("AES-256-GCM seal failed".into()))?;

        debug!(ciphertext_len = in_out.len(), "encryption complete");
        Ok(EncryptedPayload {
            ciphertext: in_out,
            nonce: nonce_bytes.to_vec(),
            tag: tag.as_ref().to_vec(),
        })
    }

    /// Authenticate and decrypt `payload`.
    ///
    /// Fails closed with `CustosError::Integrity` on any authentication
    /// failure (wrong key, nonce, tag, or associated data). No plaintext is
    /// returned unless the tag verifies.
    #[instrument(skip_all, fields(ciphertext_len = payload.ciphertext.len()))]
    pub fn decrypt(&self, payload: &EncryptedPayload, key: &DerivedKey, aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::try_assume_unique_for_key(&payload.nonce)
            .map_err(|_| CustosError::Integrity(format!("nonce must be {NONCE_LEN} bytes")))?;
        if payload.tag.len() != TAG_LEN {
            return Err(CustosError::Integrity(format!(
                "authentication tag must be {TAG_LEN} bytes"
            )));
        }

        let key = aead_key(key)?;
        let mut in_out = Vec::with_capacity(payload.ciphertext.len() + TAG_LEN);
        in_out.extend_from_slice(&payload.ciphertext);
        in_out.extend_from_slice(&payload.tag);

        let plaintext_len = match key.open_in_place(nonce, Aad::from(aad), &mut in_out) {
            Ok(plaintext) => plaintext.len(),
            Err(_) => {
                warn!("authentication tag did not verify");
                return Err(CustosError::Integrity(
                    "authentication tag did not verify".into(),
                ));
            }
        };
        in_out.truncate(plaintext_len);

        debug!(plaintext_len, "decryption complete");
        Ok(in_out)
    }
}

fn aead_key(key: &DerivedKey) -> Result<LessSafeKey> {
    UnboundKey::new(&AES_256_GCM, key.as_bytes())
        .map(LessSafeKey::new)
        .map_err(|_| CustosError::Crypto("invalid AES-256 key length".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyDeriver, MasterSecret};
    use custos_core::config::MIN_KDF_ITERATIONS;
    use custos_core::types::EvidenceId;

    fn key_for(secret: &[u8], id: &EvidenceId) -> DerivedKey {
        KeyDeriver::new(MasterSecret::new(secret.to_vec()).unwrap(), MIN_KDF_ITERATIONS)
            .unwrap()
            .derive(id)
            .unwrap()
    }

    #[test]
    fn round_trip() {
        let id = EvidenceId::new();
        let key = key_for(b"master", &id);
        let cipher = ContentCipher::new();
        let plaintext = b"Evidence item: post-123";

        let sealed = cipher.encrypt(plaintext, &key, id.as_bytes()).unwrap();
        assert_ne!(&sealed.ciphertext[..], plaintext);
        assert_eq!(sealed.nonce.len(), NONCE_LEN);
        assert_eq!(sealed.tag.len(), TAG_LEN);

        let opened = cipher.decrypt(&sealed, &key, id.as_bytes()).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn nonces_are_fresh() {
        let id = EvidenceId::new();
        let key = key_for(b"master", &id);
        let cipher = ContentCipher::new();
        let a = cipher.encrypt(b"same", &key, id.as_bytes()).unwrap();
        let b = cipher.encrypt(b"same", &key, id.as_bytes()).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_fails_closed() {
        let id = EvidenceId::new();
        let cipher = ContentCipher::new();
        let sealed = cipher
            .encrypt(b"secret", &key_for(b"master-a", &id), id.as_bytes())
            .unwrap();

        let result = cipher.decrypt(&sealed, &key_for(b"master-b", &id), id.as_bytes());
        assert!(matches!(result, Err(CustosError::Integrity(_))));
    }

    #[test]
    fn wrong_nonce_fails_closed() {
        let id = EvidenceId::new();
        let key = key_for(b"master", &id);
        let cipher = ContentCipher::new();
        let mut sealed = cipher.encrypt(b"secret", &key, id.as_bytes()).unwrap();
        sealed.nonce[0] ^= 0x01;

        let result = cipher.decrypt(&sealed, &key, id.as_bytes());
        assert!(matches!(result, Err(CustosError::Integrity(_))));
    }

    #[test]
    fn corrupted_tag_or_ciphertext_fails_closed() {
        let id = EvidenceId::new();
        let key = key_for(b"master", &id);
        let cipher = ContentCipher::new();
        let sealed = cipher.encrypt(b"secret payload", &key, id.as_bytes()).unwrap();

        let mut bad_tag = sealed.clone();
        bad_tag.tag[TAG_LEN - 1] ^= 0x80;
        assert!(matches!(
            cipher.decrypt(&bad_tag, &key, id.as_bytes()),
            Err(CustosError::Integrity(_))
        ));

        let mut bad_body = sealed.clone();
        bad_body.ciphertext[0] ^= 0x01;
        assert!(matches!(
            cipher.decrypt(&bad_body, &key, id.as_bytes()),
            Err(CustosError::Integrity(_))
        ));

        let mut short_tag = sealed;
        short_tag.tag.truncate(8);
        assert!(matches!(
            cipher.decrypt(&short_tag, &key, id.as_bytes()),
            Err(CustosError::Integrity(_))
        ));
    }

    #[test]
    fn payload_bound_to_evidence_id() {
        let id = EvidenceId::new();
        let key = key_for(b"master", &id);
        let cipher = ContentCipher::new();
        let sealed = cipher.encrypt(b"secret", &key, id.as_bytes()).unwrap();

        let other = EvidenceId::new();
        assert!(matches!(
            cipher.decrypt(&sealed, &key, other.as_bytes()),
            Err(CustosError::Integrity(_))
        ));
    }
}
