// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-item key derivation — PBKDF2-HMAC-SHA256 from a master secret.
//
// Every evidence item gets its own 256-bit key, derived from the master
// secret with the evidence id as salt. The key is never stored: the item
// keeps only a `KeyReference` naming the scheme and iteration count, which
// is enough to derive it again.

use std::fmt;
use std::num::NonZeroU32;

use custos_core::config::{MAX_KDF_ITERATIONS, MIN_KDF_ITERATIONS};
use custos_core::error::{CustosError, Result};
use custos_core::types::{EvidenceId, KeyReference};
use ring::pbkdf2;
use tracing::{debug, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a derived evidence key in bytes.
pub const KEY_LEN: usize = 32;

/// Domain-separation label prefixed to every salt.
const SALT_LABEL: &[u8] = b"custos/evidence-key/v1\0";

const SCHEME: &str = "pbkdf2-sha256";

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// The injected master secret. Zeroised on drop, redacted in `Debug`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret(Vec<u8>);

impl MasterSecret {
    /// Wrap raw secret bytes. An empty secret is a configuration error.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CustosError::Configuration(
                "master secret is empty".into(),
            ));
        }
        Ok(Self(bytes))
    }

    fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}

/// A derived per-item AES-256 key. Zeroised on drop, redacted in `Debug`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive the key for `evidence_id` from `master_secret`.
///
/// Deterministic: the same inputs always give the same key.
pub fn derive(master_secret: &[u8], evidence_id: &EvidenceId, iterations: u32) -> Result<DerivedKey> {
    if master_secret.is_empty() {
        return Err(CustosError::Configuration("master secret is empty".into()));
    }
    let iterations = checked_iterations(iterations)?;

    let mut salt = Vec::with_capacity(SALT_LABEL.len() + 16);
    salt.extend_from_slice(SALT_LABEL);
    salt.extend_from_slice(evidence_id.as_bytes());

    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        master_secret,
        &mut out,
    );
    let key = DerivedKey(out);
    out.zeroize();
    Ok(key)
}

fn checked_iterations(iterations: u32) -> Result<NonZeroU32> {
    if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&iterations) {
        return Err(CustosError::Configuration(format!(
            "PBKDF2 iterations must be within {MIN_KDF_ITERATIONS}..={MAX_KDF_ITERATIONS}, got {iterations}"
        )));
    }
    NonZeroU32::new(iterations)
        .ok_or_else(|| CustosError::Configuration("PBKDF2 iterations must be non-zero".into()))
}

/// Holds the master secret and derives per-item keys on demand.
#[derive(Debug)]
pub struct KeyDeriver {
    secret: MasterSecret,
    iterations: u32,
}

impl KeyDeriver {
    /// Create a deriver for newly collected evidence.
    ///
    /// Fails with `Configuration` when `iterations` is outside
    /// `MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS`.
    pub fn new(secret: MasterSecret, iterations: u32) -> Result<Self> {
        checked_iterations(iterations)?;
        Ok(Self { secret, iterations })
    }

    /// The reference recorded on items collected with this deriver.
    pub fn key_reference(&self) -> KeyReference {
        KeyReference(format!("{SCHEME}:{}", self.iterations))
    }

    /// Derive the key for a new item using the configured iteration count.
    #[instrument(skip_all, fields(%evidence_id))]
    pub fn derive(&self, evidence_id: &EvidenceId) -> Result<DerivedKey> {
        let key = derive(self.secret.expose(), evidence_id, self.iterations)?;
        debug!("evidence key derived");
        Ok(key)
    }

    /// Re-derive the key for an existing item from its stored reference.
    ///
    /// The iteration count comes from the reference, not from the current
    /// configuration, so raising the configured count never orphans items.
    /// A reference outside the accepted range is an `Integrity` failure.
    #[instrument(skip_all, fields(%evidence_id, %reference))]
    pub fn derive_for(&self, evidence_id: &EvidenceId, reference: &KeyReference) -> Result<DerivedKey> {
        let iterations = parse_reference(reference)?;
        derive(self.secret.expose(), evidence_id, iterations)
    }
}

fn parse_reference(reference: &KeyReference) -> Result<u32> {
    let (scheme, iterations) = reference
        .0
        .split_once(':')
        .ok_or_else(|| CustosError::Integrity(format!("malformed key reference {reference}")))?;
    if scheme != SCHEME {
        return Err(CustosError::Integrity(format!(
            "unsupported key derivation scheme {scheme:?}"
        )));
    }
    let iterations: u32 = iterations
        .parse()
        .map_err(|_| CustosError::Integrity(format!("malformed key reference {reference}")))?;
    if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&iterations) {
        return Err(CustosError::Integrity(format!(
            "key reference {reference} is outside the accepted iteration range"
        )));
    }
    Ok(iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deriver(secret: &[u8]) -> KeyDeriver {
        KeyDeriver::new(MasterSecret::new(secret.to_vec()).unwrap(), MIN_KDF_ITERATIONS).unwrap()
    }

    #[test]
    fn derivation_is_deterministic() {
        let id = EvidenceId::new();
        let d = deriver(b"master-secret");
        let a = d.derive(&id).unwrap();
        let b = d.derive(&id).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn keys_differ_per_item() {
        let d = deriver(b"master-secret");
        let a = d.derive(&EvidenceId::new()).unwrap();
        let b = d.derive(&EvidenceId::new()).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn keys_differ_per_master_secret() {
        let id = EvidenceId::new();
        let a = deriver(b"secret-a").derive(&id).unwrap();
        let b = deriver(b"secret-b").derive(&id).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn empty_secret_is_configuration_error() {
        assert!(matches!(
            MasterSecret::new(Vec::new()),
            Err(CustosError::Configuration(_))
        ));
        assert!(matches!(
            derive(b"", &EvidenceId::new(), MIN_KDF_ITERATIONS),
            Err(CustosError::Configuration(_))
        ));
    }

    #[test]
    fn weak_iteration_count_rejected() {
        let secret = MasterSecret::new(b"s".to_vec()).unwrap();
        assert!(matches!(
            KeyDeriver::new(secret, 10_000),
            Err(CustosError::Configuration(_))
        ));
    }

    #[test]
    fn reference_round_trips_through_derive_for() {
        let id = EvidenceId::new();
        let d = deriver(b"master-secret");
        let reference = d.key_reference();
        assert_eq!(reference.0, format!("pbkdf2-sha256:{MIN_KDF_ITERATIONS}"));

        let direct = d.derive(&id).unwrap();
        let again = d.derive_for(&id, &reference).unwrap();
        assert_eq!(direct.as_bytes(), again.as_bytes());
    }

    #[test]
    fn unknown_reference_scheme_rejected() {
        let d = deriver(b"master-secret");
        let bogus = KeyReference("scrypt:1".into());
        assert!(matches!(
            d.derive_for(&EvidenceId::new(), &bogus),
            Err(CustosError::Integrity(_))
        ));
    }

    #[test]
    fn out_of_range_reference_is_integrity_failure() {
        let d = deriver(b"master-secret");
        for raw in ["pbkdf2-sha256:1", "pbkdf2-sha256:4000000000", "pbkdf2-sha256:-5"] {
            let result = d.derive_for(&EvidenceId::new(), &KeyReference(raw.into()));
            assert!(matches!(result, Err(CustosError::Integrity(_))), "{raw}");
        }
    }

    #[test]
    fn runaway_iteration_count_rejected() {
        let secret = MasterSecret::new(b"s".to_vec()).unwrap();
        assert!(matches!(
            KeyDeriver::new(secret, MAX_KDF_ITERATIONS + 1),
            Err(CustosError::Configuration(_))
        ));
    }

    #[test]
    fn debug_never_prints_key_material() {
        let d = deriver(b"super-secret-value");
        let key = d.derive(&EvidenceId::new()).unwrap();
        assert!(!format!("{d:?}").contains("super-secret-value"));
        assert_eq!(format!("{key:?}"), "DerivedKey([REDACTED])");
    }
}
