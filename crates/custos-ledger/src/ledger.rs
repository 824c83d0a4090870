// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Custody ledger — append-only, hash-linked, signed entries per evidence item.
//
// Each entry's `current_hash` is SHA-256 over its canonical bytes, which
// embed the predecessor's `current_hash` (or GENESIS). The same bytes are
// signed with the custody key. Verification replays the chain from GENESIS
// using the *recomputed* predecessor hash, so altering entry i flags i and
// every entry after it.

use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use custos_core::error::{CustosError, Result};
use custos_core::types::{
    Actor, CustodyAction, CustodyEntry, EvidenceId, EvidenceItem, GENESIS, LifecycleState,
};
use custos_security::{KeyRing, PublicKey, SigningKey, digests_match, hash_bytes};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::canonical::{entry_hash, entry_message};
use crate::locks::{ItemLock, ItemLocks};
use crate::notary::Notarizer;
use crate::report::{ChainReport, ChainViolation, ChainViolationKind};
use crate::store::{EvidenceStore, StoredEntry};

pub struct CustodyLedger {
    store: Arc<dyn EvidenceStore>,
    signer: Arc<SigningKey>,
    trusted: KeyRing,
    locks: ItemLocks,
    notarizer: Option<Arc<dyn Notarizer>>,
}

impl CustodyLedger {
    /// A ledger that signs with `signer` and trusts only `signer`'s key.
    pub fn new(store: Arc<dyn EvidenceStore>, signer: Arc<SigningKey>) -> Self {
        let mut trusted = KeyRing::new();
        trusted.insert(signer.public_key().clone());
        Self {
            store,
            signer,
            trusted,
            locks: ItemLocks::new(),
            notarizer: None,
        }
    }

    pub fn with_notarizer(mut self, notarizer: Arc<dyn Notarizer>) -> Self {
        self.notarizer = Some(notarizer);
        self
    }

    /// Also accept entries signed by `key` (e.g. a retired custody key).
    pub fn trust(&mut self, key: PublicKey) {
        self.trusted.insert(key);
    }

    pub fn signer_key_id(&self) -> &str {
        self.signer.key_id()
    }

    pub(crate) fn signer(&self) -> &SigningKey {
        &self.signer
    }

    pub(crate) fn trusted(&self) -> &KeyRing {
        &self.trusted
    }

    pub(crate) fn store(&self) -> &Arc<dyn EvidenceStore> {
        &self.store
    }

    pub(crate) fn lock(&self, evidence_id: &EvidenceId) -> ItemLock {
        self.locks.handle(evidence_id)
    }

    // -- Writing --------------------------------------------------------------

    /// Build, hash, and sign an entry linked to `previous_hash`.
    fn seal(
        &self,
        evidence_id: EvidenceId,
        sequence_number: u64,
        previous_hash: &str,
        action: CustodyAction,
        actor: &Actor,
        timestamp: DateTime<Utc>,
    ) -> Result<CustodyEntry> {
        let mut entry = CustodyEntry {
            entry_id: Uuid::new_v4(),
            evidence_id,
            sequence_number,
            action,
            actor: actor.clone(),
            timestamp,
            previous_hash: previous_hash.to_owned(),
            current_hash: String::new(),
            signature: String::new(),
            signer_key_id: self.signer.key_id().to_owned(),
            anchor_reference: None,
        };
        let message = entry_message(&entry, previous_hash);
        entry.current_hash = hash_bytes(&message);
        entry.signature = hex::encode(self.signer.sign(&message)?);
        Ok(entry)
    }

    /// Persist a new item with its `Collected` genesis entry.
    #[instrument(skip_all, fields(evidence_id = %item.evidence_id, actor = %actor.actor_id))]
    pub(crate) fn open_chain(
        &self,
        item: &mut EvidenceItem,
        actor: &Actor,
        timestamp: DateTime<Utc>,
    ) -> Result<CustodyEntry> {
        let mut genesis = self.seal(
            item.evidence_id,
            0,
            GENESIS,
            CustodyAction::Collected,
            actor,
            timestamp,
        )?;
        self.store.insert_item(item, &genesis)?;
        item.ledger_length = 1;
        item.ledger_head = genesis.current_hash.clone();
        info!(head = %genesis.current_hash, "custody chain opened");

        self.anchor(&mut genesis);
        Ok(genesis)
    }

    /// Append a custody entry for an existing item.
    ///
    /// Takes the item's write lock for the duration of the read-link-commit
    /// sequence, so concurrent callers are strictly ordered.
    pub fn append(
        &self,
        evidence_id: &EvidenceId,
        action: CustodyAction,
        actor: &Actor,
        timestamp: DateTime<Utc>,
    ) -> Result<CustodyEntry> {
        actor.validate()?;
        let lock = self.lock(evidence_id);
        let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);

        let item = self
            .store
            .load_item(evidence_id)?
            .ok_or(CustosError::NotFound(*evidence_id))?;
        self.append_locked(&item, action, actor, timestamp, None)
    }

    /// Append against `item` as just loaded. The caller must hold the item's
    /// write lock.
    ///
    /// `new_state` is committed in the same store transaction as the entry.
    #[instrument(skip_all, fields(evidence_id = %item.evidence_id, %action, actor = %actor.actor_id))]
    pub(crate) fn append_locked(
        &self,
        item: &EvidenceItem,
        action: CustodyAction,
        actor: &Actor,
        timestamp: DateTime<Utc>,
        new_state: Option<LifecycleState>,
    ) -> Result<CustodyEntry> {
        if item.lifecycle_state.is_terminal() {
            return Err(CustosError::State {
                current: item.lifecycle_state,
                attempted: format!("custody action {action}"),
            });
        }

        let mut entry = self.seal(
            item.evidence_id,
            item.ledger_length,
            &item.ledger_head,
            action,
            actor,
            timestamp,
        )?;
        self.store.append_entry(&entry, new_state)?;
        info!(seq = entry.sequence_number, head = %entry.current_hash, "custody entry appended");

        self.anchor(&mut entry);
        Ok(entry)
    }

    /// Hand the committed head to the notarizer, if any. Never fails.
    fn anchor(&self, entry: &mut CustodyEntry) {
        let Some(notarizer) = &self.notarizer else {
            return;
        };
        match notarizer.notarize(&entry.evidence_id, &entry.current_hash) {
            Ok(Some(reference)) => match self.store.attach_anchor(&entry.entry_id, &reference) {
                Ok(()) => entry.anchor_reference = Some(reference),
                Err(e) => warn!(error = %e, "anchor obtained but could not be stored"),
            },
            Ok(None) => debug!("notarizer declined to anchor entry"),
            Err(e) => warn!(error = %e, "notarization failed; entry remains committed"),
        }
    }

    // -- Reading ----------------------------------------------------------------

    /// All entries for an item, in sequence order.
    pub fn entries(&self, evidence_id: &EvidenceId) -> Result<Vec<CustodyEntry>> {
        if self.store.load_item(evidence_id)?.is_none() {
            return Err(CustosError::NotFound(*evidence_id));
        }
        self.store.entries(evidence_id)
    }

    /// Replay an item's chain from GENESIS and report every violation.
    ///
    /// Returns `Ok` with a report even when violations are found; use
    /// [`ChainReport::into_result`] to turn them into an error.
    pub fn verify_chain(&self, evidence_id: &EvidenceId) -> Result<ChainReport> {
        let lock = self.lock(evidence_id);
        let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);

        let item = self
            .store
            .load_item(evidence_id)?
            .ok_or(CustosError::NotFound(*evidence_id))?;
        let entries = self.store.stored_entries(evidence_id)?;
        Ok(self.replay(&item, &entries))
    }

    /// Check `entries` against each other, the trusted keys, and the item's
    /// recorded head.
    ///
    /// An undecodable row is flagged at its position and breaks the link, so
    /// every later entry is flagged too.
    #[instrument(skip_all, fields(evidence_id = %item.evidence_id, entries = entries.len()))]
    pub(crate) fn replay(&self, item: &EvidenceItem, entries: &[StoredEntry]) -> ChainReport {
        let mut violations = Vec::new();
        let mut expected_prev = GENESIS.to_owned();

        for (position, stored) in entries.iter().enumerate() {
            let index = position as u64;
            let mut flag = |kind| violations.push(ChainViolation { index, kind });

            let entry = match stored {
                StoredEntry::Parsed(entry) => entry,
                StoredEntry::Malformed { reason, .. } => {
                    flag(ChainViolationKind::MalformedEntry {
                        reason: reason.clone(),
                    });
                    // No digest is empty, so the successor's link cannot match.
                    expected_prev = String::new();
                    continue;
                }
            };

            if entry.sequence_number != index {
                flag(ChainViolationKind::SequenceMismatch {
                    expected: index,
                    actual: entry.sequence_number,
                });
            }
            if entry.evidence_id != item.evidence_id {
                flag(ChainViolationKind::ForeignEntry {
                    evidence_id: entry.evidence_id,
                });
            }
            if entry.previous_hash != expected_prev {
                flag(ChainViolationKind::PreviousHashMismatch {
                    expected: expected_prev.clone(),
                    stored: entry.previous_hash.clone(),
                });
            }

            let recomputed = entry_hash(entry, &expected_prev);
            if !digests_match(&recomputed, &entry.current_hash) {
                flag(ChainViolationKind::CurrentHashMismatch {
                    expected: recomputed.clone(),
                    stored: entry.current_hash.clone(),
                });
            }
            if !self.signature_valid(entry) {
                flag(ChainViolationKind::SignatureInvalid {
                    signer_key_id: entry.signer_key_id.clone(),
                });
            }
            expected_prev = recomputed;
        }

        let stored_length = entries.len() as u64;
        let stored_head = entries.last().map_or(GENESIS, StoredEntry::current_hash);
        if stored_length != item.ledger_length || stored_head != item.ledger_head {
            let index = if stored_length != item.ledger_length {
                stored_length.min(item.ledger_length)
            } else {
                stored_length.saturating_sub(1)
            };
            violations.push(ChainViolation {
                index,
                kind: ChainViolationKind::HeadMismatch {
                    recorded_length: item.ledger_length,
                    recorded_head: item.ledger_head.clone(),
                },
            });
        }

        let report = ChainReport {
            evidence_id: item.evidence_id,
            entries_checked: stored_length,
            violations,
        };
        if report.is_intact() {
            debug!("custody chain intact");
        } else {
            error!(indices = ?report.violation_indices(), "custody chain violated");
        }
        report
    }

    /// The signature must be by a trusted key over the entry as stored.
    fn signature_valid(&self, entry: &CustodyEntry) -> bool {
        let Ok(signature) = hex::decode(&entry.signature) else {
            return false;
        };
        let message = entry_message(entry, &entry.previous_hash);
        self.trusted.verify(&entry.signer_key_id, &message, &signature)
    }
}

impl std::fmt::Debug for CustodyLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyLedger")
            .field("signer_key_id", &self.signer.key_id())
            .field("trusted_keys", &self.trusted.len())
            .field("notarized", &self.notarizer.is_some())
            .finish_non_exhaustive()
    }
}
