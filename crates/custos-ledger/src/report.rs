// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Verification and custody reports.

use chrono::{DateTime, Utc};
use custos_core::error::{CustosError, Result};
use custos_core::types::{CustodyEntry, EvidenceId, EvidenceMetadata, LifecycleState};
use custos_security::{KeyRing, SigningKey, digests_match, hash_bytes};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chain verification
// ---------------------------------------------------------------------------

/// What was wrong with an entry during chain replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainViolationKind {
    /// Entry is not at the position its sequence number claims.
    SequenceMismatch { expected: u64, actual: u64 },
    /// Entry belongs to a different evidence item.
    ForeignEntry { evidence_id: EvidenceId },
    /// Stored `previous_hash` does not match the replayed predecessor.
    PreviousHashMismatch { expected: String, stored: String },
    /// Recomputed hash differs from the stored `current_hash`.
    CurrentHashMismatch { expected: String, stored: String },
    /// The stored row no longer decodes into a custody entry.
    MalformedEntry { reason: String },
    /// Signature missing, malformed, by an untrusted key, or not over this entry.
    SignatureInvalid { signer_key_id: String },
    /// The item's recorded ledger head disagrees with the stored entries
    /// (entries appended or removed after the fact).
    HeadMismatch {
        recorded_length: u64,
        recorded_head: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainViolation {
    /// Zero-based position in the chain.
    pub index: u64,
    pub kind: ChainViolationKind,
}

/// Result of replaying one item's custody chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub evidence_id: EvidenceId,
    pub entries_checked: u64,
    pub violations: Vec<ChainViolation>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.violations.is_empty()
    }

    /// Distinct violating indices, ascending.
    pub fn violation_indices(&self) -> Vec<u64> {
        let mut indices: Vec<u64> = self.violations.iter().map(|v| v.index).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// The earliest position at which the chain stops being trustworthy.
    pub fn first_divergence(&self) -> Option<u64> {
        self.violations.iter().map(|v| v.index).min()
    }

    pub fn into_result(self) -> Result<Self> {
        if self.is_intact() {
            Ok(self)
        } else {
            Err(CustosError::ChainViolation {
                evidence_id: self.evidence_id,
                indices: self.violation_indices(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Full item verification
// ---------------------------------------------------------------------------

/// Outcome of decrypting an item and comparing it with its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContentCheck {
    Intact,
    HashMismatch { expected: String, actual: String },
    /// Authenticated decryption failed: ciphertext, nonce, tag, or key
    /// reference was altered.
    Undecryptable { reason: String },
}

impl ContentCheck {
    pub fn is_intact(&self) -> bool {
        matches!(self, Self::Intact)
    }

    /// `Ok` only for [`ContentCheck::Intact`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Intact => Ok(()),
            Self::HashMismatch { expected, actual } => {
                Err(CustosError::IntegrityMismatch { expected, actual })
            }
            Self::Undecryptable { reason } => Err(CustosError::Integrity(reason)),
        }
    }
}

/// Content and chain verification of one evidence item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub evidence_id: EvidenceId,
    pub lifecycle_state: LifecycleState,
    pub content: ContentCheck,
    pub chain: ChainReport,
    pub verified_at: DateTime<Utc>,
}

impl VerificationReport {
    pub fn is_intact(&self) -> bool {
        self.content.is_intact() && self.chain.is_intact()
    }

    pub fn first_divergence(&self) -> Option<u64> {
        self.chain.first_divergence()
    }

    /// Convert into an error if anything failed. Content failures take
    /// precedence over chain failures.
    pub fn into_result(self) -> Result<Self> {
        self.content.clone().into_result()?;
        if self.chain.is_intact() {
            Ok(self)
        } else {
            Err(CustosError::ChainViolation {
                evidence_id: self.evidence_id,
                indices: self.chain.violation_indices(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Custody report
// ---------------------------------------------------------------------------

/// A signed export of an item's metadata, verification, and history.
///
/// The canonical bytes are the report serialized as JSON with `report_hash`
/// and `signature` empty. `report_hash` is their SHA-256 and `signature` is
/// the custody key's signature over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyReport {
    pub generated_at: DateTime<Utc>,
    pub metadata: EvidenceMetadata,
    pub verification: VerificationReport,
    pub history: Vec<CustodyEntry>,
    pub total_entries: u64,
    /// Fingerprint of the key that signed the report.
    pub signer_key_id: String,
    pub report_hash: String,
    /// Hex-encoded ASN.1 DER ECDSA signature.
    pub signature: String,
}

impl CustodyReport {
    pub fn new(
        metadata: EvidenceMetadata,
        verification: VerificationReport,
        history: Vec<CustodyEntry>,
        signer: &SigningKey,
    ) -> Result<Self> {
        let mut report = Self {
            generated_at: Utc::now(),
            metadata,
            verification,
            total_entries: history.len() as u64,
            history,
            signer_key_id: signer.key_id().to_owned(),
            report_hash: String::new(),
            signature: String::new(),
        };
        let message = report.canonical_bytes()?;
        report.report_hash = hash_bytes(&message);
        report.signature = hex::encode(signer.sign(&message)?);
        Ok(report)
    }

    /// True only if the hash matches the content and the signature is by a
    /// key in `trusted`.
    pub fn check_seal(&self, trusted: &KeyRing) -> Result<bool> {
        let message = self.canonical_bytes()?;
        if !digests_match(&hash_bytes(&message), &self.report_hash) {
            return Ok(false);
        }
        let Ok(signature) = hex::decode(&self.signature) else {
            return Ok(false);
        };
        Ok(trusted.verify(&self.signer_key_id, &message, &signature))
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let unsealed = Self {
            report_hash: String::new(),
            signature: String::new(),
            ..self.clone()
        };
        Ok(serde_json::to_vec(&unsealed)?)
    }
}
