// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Custos evidence ledger.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CustosError;

/// Sentinel stored as `previous_hash` of the first custody entry of an item.
pub const GENESIS: &str = "GENESIS";

/// Unique identifier for an evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceId(pub Uuid);

impl EvidenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Raw 16-byte form, used as AEAD associated data and KDF salt input.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for EvidenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EvidenceId {
    type Err = CustosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CustosError::Validation(format!("invalid evidence id {s:?}: {e}")))
    }
}

/// Lifecycle states of an evidence item, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Content hashed and encrypted, genesis custody entry written.
    Collected,
    /// Encrypted payload confirmed to decrypt back to the collected hash.
    Encrypted,
    /// Custody chain replayed without violations.
    Verified,
    /// Persisted to the long-term store.
    Stored,
    /// An analysis tool has run over the evidence.
    Analyzed,
    /// Every admissibility check passed; custody sealed.
    CourtReady,
    /// Terminal. No further custody actions are accepted.
    Archived,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 7] = [
        Self::Collected,
        Self::Encrypted,
        Self::Verified,
        Self::Stored,
        Self::Analyzed,
        Self::CourtReady,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collected => "collected",
            Self::Encrypted => "encrypted",
            Self::Verified => "verified",
            Self::Stored => "stored",
            Self::Analyzed => "analyzed",
            Self::CourtReady => "court_ready",
            Self::Archived => "archived",
        }
    }

    /// The single state reachable by a normal forward step.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Collected => Some(Self::Encrypted),
            Self::Encrypted => Some(Self::Verified),
            Self::Verified => Some(Self::Stored),
            Self::Stored => Some(Self::Analyzed),
            Self::Analyzed => Some(Self::CourtReady),
            Self::CourtReady => Some(Self::Archived),
            Self::Archived => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Archived)
    }

    /// Whether `target` is a legal transition from this state.
    ///
    /// Only single forward steps are allowed, except that `Archived` may be
    /// entered from any non-terminal state (retention expiry or explicit
    /// seal can happen at any point in the lifecycle).
    pub fn can_advance_to(&self, target: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == Self::Archived || self.next() == Some(target)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = CustosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CustosError::Validation(format!("unknown lifecycle state {s:?}")))
    }
}

/// Chain of custody actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyAction {
    Collected,
    Transferred,
    Analyzed,
    Copied,
    Accessed,
    Modified,
    Sealed,
    Unsealed,
    Archived,
}

impl CustodyAction {
    pub const ALL: [CustodyAction; 9] = [
        Self::Collected,
        Self::Transferred,
        Self::Analyzed,
        Self::Copied,
        Self::Accessed,
        Self::Modified,
        Self::Sealed,
        Self::Unsealed,
        Self::Archived,
    ];

    /// Stable name. Part of the signed canonical form, so never rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collected => "collected",
            Self::Transferred => "transferred",
            Self::Analyzed => "analyzed",
            Self::Copied => "copied",
            Self::Accessed => "accessed",
            Self::Modified => "modified",
            Self::Sealed => "sealed",
            Self::Unsealed => "unsealed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for CustodyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustodyAction {
    type Err = CustosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| CustosError::Validation(format!("unknown custody action {s:?}")))
    }
}

/// Kind of digital evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    SocialMediaPost,
    DirectMessage,
    ProfileData,
    MediaFile,
    Metadata,
    NetworkData,
    Document,
}

impl FromStr for EvidenceType {
    type Err = CustosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "social_media_post" => Ok(Self::SocialMediaPost),
            "direct_message" => Ok(Self::DirectMessage),
            "profile_data" => Ok(Self::ProfileData),
            "media_file" => Ok(Self::MediaFile),
            "metadata" => Ok(Self::Metadata),
            "network_data" => Ok(Self::NetworkData),
            "document" => Ok(Self::Document),
            other => Err(CustosError::Validation(format!(
                "unknown evidence type {other:?}"
            ))),
        }
    }
}

/// Descriptive metadata supplied at collection time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    /// Case the evidence belongs to. Required.
    pub case_number: String,
    /// Where the evidence came from (platform, device, system). Required.
    pub source: String,
    pub evidence_type: Option<EvidenceType>,
    pub source_url: Option<String>,
    pub warrant_id: Option<String>,
    pub mime_type: Option<String>,
    pub description: Option<String>,
    /// Unstructured attributes kept for forward compatibility.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl EvidenceMetadata {
    pub fn new(case_number: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            case_number: case_number.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CustosError> {
        if self.case_number.trim().is_empty() {
            return Err(CustosError::Validation(
                "metadata is missing case_number".into(),
            ));
        }
        if self.source.trim().is_empty() {
            return Err(CustosError::Validation("metadata is missing source".into()));
        }
        Ok(())
    }
}

/// Identity claims an actor attaches to a custody entry. Opaque to the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub name: Option<String>,
    pub badge_number: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub reason: Option<String>,
}

/// The party performing a custody action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_id: String,
    #[serde(default)]
    pub attestation: Attestation,
}

impl Actor {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            attestation: Attestation::default(),
        }
    }

    pub fn with_attestation(mut self, attestation: Attestation) -> Self {
        self.attestation = attestation;
        self
    }

    pub fn validate(&self) -> Result<(), CustosError> {
        if self.actor_id.trim().is_empty() {
            return Err(CustosError::Validation("actor_id must not be empty".into()));
        }
        Ok(())
    }
}

/// Identifies how a per-item key is re-derived. Never contains key bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyReference(pub String);

impl fmt::Display for KeyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// AEAD output for one evidence payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    #[serde(with = "hex")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex")]
    pub tag: Vec<u8>,
}

/// A collected evidence item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub evidence_id: EvidenceId,
    /// SHA-256 of the plaintext, recorded once at collection.
    pub content_hash: String,
    pub payload: EncryptedPayload,
    pub key_reference: KeyReference,
    pub lifecycle_state: LifecycleState,
    pub metadata: EvidenceMetadata,
    pub collected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of custody entries committed for this item.
    pub ledger_length: u64,
    /// `current_hash` of the newest custody entry.
    pub ledger_head: String,
}

/// One link in an item's custody chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyEntry {
    pub entry_id: Uuid,
    pub evidence_id: EvidenceId,
    /// Zero-based position in the chain.
    pub sequence_number: u64,
    pub action: CustodyAction,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub current_hash: String,
    /// Hex-encoded ASN.1 DER ECDSA signature.
    pub signature: String,
    /// Fingerprint of the public key that verifies `signature`.
    pub signer_key_id: String,
    /// Receipt from an external notarization service, if one was obtained.
    pub anchor_reference: Option<String>,
}

impl CustodyEntry {
    pub fn actor_id(&self) -> &str {
        &self.actor.actor_id
    }
}
