// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Custody signatures — ECDSA P-256 with SHA-256.
//
// The signer's private key is supplied as a PKCS#8 v1 DER document (or
// generated fresh for a new deployment). Only signatures and the public key
// fingerprint ever leave this module; the private key is never logged.

use std::collections::HashMap;
use std::fmt;

use custos_core::error::{CustosError, Result};
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1, ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair,
    UnparsedPublicKey,
};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::integrity::hash_bytes;

/// Length of an uncompressed SEC1 P-256 public key (0x04 || x || y).
pub const PUBLIC_KEY_LEN: usize = 65;

/// Hex characters of the SHA-256 public key hash used as a key id.
const KEY_ID_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Public key
// ---------------------------------------------------------------------------

/// An ECDSA P-256 verification key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    bytes: Vec<u8>,
    key_id: String,
}

impl PublicKey {
    /// Parse an uncompressed SEC1 public key.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() != PUBLIC_KEY_LEN || bytes[0] != 0x04 {
            return Err(CustosError::Configuration(format!(
                "public key must be a {PUBLIC_KEY_LEN}-byte uncompressed P-256 point"
            )));
        }
        let key_id = hash_bytes(&bytes)[..KEY_ID_LEN].to_owned();
        Ok(Self { bytes, key_id })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Short fingerprint stored on every entry this key signs.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Verify an ASN.1 DER signature over `message`.
    ///
    /// Returns `false` for malformed signatures, tampered messages, or a
    /// signature made by a different key. Never errors.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, &self.bytes)
            .verify(message, signature)
            .is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("key_id", &self.key_id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Signing key
// ---------------------------------------------------------------------------

/// The custody signer's ECDSA P-256 key pair.
pub struct SigningKey {
    pkcs8_der: Zeroizing<Vec<u8>>,
    key_pair: EcdsaKeyPair,
    public_key: PublicKey,
    rng: SystemRandom,
}

impl SigningKey {
    /// Generate a fresh key pair using the OS CSPRNG.
    #[instrument]
    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let pkcs8_document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|e| CustosError::Crypto(format!("key generation failed: {e}")))?;
        let key = Self::from_pkcs8(pkcs8_document.as_ref())?;
        debug!(key_id = key.key_id(), "ECDSA P-256 signing key generated");
        Ok(key)
    }

    /// Load a PKCS#8 v1 DER private key.
    ///
    /// Missing or unparseable key material is a configuration error.
    pub fn from_pkcs8(der: &[u8]) -> Result<Self> {
        if der.is_empty() {
            return Err(CustosError::Configuration(
                "signing key material is empty".into(),
            ));
        }
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, der, &rng)
            .map_err(|e| CustosError::Configuration(format!("signing key rejected: {e}")))?;
        let public_key = PublicKey::from_bytes(key_pair.public_key().as_ref().to_vec())?;

        Ok(Self {
            pkcs8_der: Zeroizing::new(der.to_vec()),
            key_pair,
            public_key,
            rng,
        })
    }

    /// The PKCS#8 v1 DER private key, for writing to a key file.
    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8_der
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn key_id(&self) -> &str {
        self.public_key.key_id()
    }

    /// Sign `message` (SHA-256 then ECDSA P-256, ASN.1 DER output).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let sig = self
            .key_pair
            .sign(&self.rng, message)
            .map_err(|e| CustosError::Crypto(format!("signing failed: {e}")))?;
        Ok(sig.as_ref().to_vec())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

/// Sign `message` with `key`.
pub fn sign(message: &[u8], key: &SigningKey) -> Result<Vec<u8>> {
    key.sign(message)
}

/// Verify `signature` over `message` with `public_key`.
pub fn verify(message: &[u8], signature: &[u8], public_key: &PublicKey) -> bool {
    public_key.verify(message, signature)
}

// ---------------------------------------------------------------------------
// Trusted keys
// ---------------------------------------------------------------------------

/// Public keys trusted to have signed custody entries, by key id.
///
/// Holds the current signer plus any retired signers whose entries must
/// still verify.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: HashMap<String, PublicKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PublicKey) {
        self.keys.insert(key.key_id().to_owned(), key);
    }

    pub fn get(&self, key_id: &str) -> Option<&PublicKey> {
        self.keys.get(key_id)
    }

    /// Verify a signature claimed to be from `key_id`. Unknown ids fail.
    pub fn verify(&self, key_id: &str, message: &[u8], signature: &[u8]) -> bool {
        self.get(key_id)
            .is_some_and(|key| key.verify(message, signature))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
