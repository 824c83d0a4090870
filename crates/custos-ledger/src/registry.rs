// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Evidence registry — the caller-facing service.
//
// Owns the store handle, custody ledger, key deriver, and cipher, and is
// the only component that changes an item's lifecycle state. Build one per
// process and share it via `Arc`; it is `Send + Sync`.

use std::sync::{Arc, PoisonError};

use chrono::Utc;
use custos_core::config::CustosConfig;
use custos_core::error::{CustosError, Result};
use custos_core::types::{
    Actor, CustodyAction, CustodyEntry, EvidenceId, EvidenceItem, EvidenceMetadata, GENESIS,
    LifecycleState,
};
use custos_security::{
    ContentCipher, KeyDeriver, MasterSecret, PublicKey, SigningKey, digests_match, hash_bytes,
    verify_hash,
};
use tracing::{error, info, instrument};
use zeroize::Zeroizing;

use crate::ledger::CustodyLedger;
use crate::notary::{FileNotarizer, Notarizer};
use crate::policy::{AdmissibilityPolicy, DefaultPolicy};
use crate::report::{ContentCheck, CustodyReport, VerificationReport};
use crate::store::{EvidenceStore, SqliteStore, StoredEntry};

/// Secrets injected at startup. The registry never persists either.
pub struct KeyMaterial {
    pub master_secret: MasterSecret,
    pub signing_key: SigningKey,
}

pub struct EvidenceRegistry {
    ledger: CustodyLedger,
    deriver: KeyDeriver,
    cipher: ContentCipher,
    policy: Box<dyn AdmissibilityPolicy>,
}

impl EvidenceRegistry {
    pub fn new(store: Arc<dyn EvidenceStore>, deriver: KeyDeriver, signing_key: SigningKey) -> Self {
        Self {
            ledger: CustodyLedger::new(store, Arc::new(signing_key)),
            deriver,
            cipher: ContentCipher::new(),
            policy: Box::new(DefaultPolicy),
        }
    }

    /// Open the SQLite store named in `config` and wire up the registry.
    ///
    /// Fails with `Configuration` if the config or key material is unusable;
    /// a registry is never built in a half-configured state.
    #[instrument(skip_all, fields(db = %config.database_path.display()))]
    pub fn open(config: &CustosConfig, keys: KeyMaterial) -> Result<Self> {
        config.validate()?;
        let deriver = KeyDeriver::new(keys.master_secret, config.kdf_iterations)?;
        let store = SqliteStore::open(&config.database_path, config.storage_timeout())?;

        let mut registry = Self::new(Arc::new(store), deriver, keys.signing_key);
        if let Some(path) = &config.anchor_log_path {
            registry = registry.with_notarizer(Arc::new(FileNotarizer::open(path)?));
        }
        info!(signer = registry.ledger.signer_key_id(), "evidence registry ready");
        Ok(registry)
    }

    pub fn with_notarizer(mut self, notarizer: Arc<dyn Notarizer>) -> Self {
        self.ledger = self.ledger.with_notarizer(notarizer);
        self
    }

    pub fn with_policy(mut self, policy: impl AdmissibilityPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Accept custody entries signed by an additional (e.g. retired) key.
    pub fn with_trusted_key(mut self, key: PublicKey) -> Self {
        self.ledger.trust(key);
        self
    }

    pub fn ledger(&self) -> &CustodyLedger {
        &self.ledger
    }

    fn store(&self) -> &Arc<dyn EvidenceStore> {
        self.ledger.store()
    }

    fn load(&self, evidence_id: &EvidenceId) -> Result<EvidenceItem> {
        self.store()
            .load_item(evidence_id)?
            .ok_or(CustosError::NotFound(*evidence_id))
    }

    // -- Collection -------------------------------------------------------------

    /// Hash, encrypt, and register new evidence, opening its custody chain.
    #[instrument(skip_all, fields(case = %metadata.case_number, actor = %actor.actor_id, len = raw_bytes.len()))]
    pub fn collect(
        &self,
        raw_bytes: &[u8],
        metadata: EvidenceMetadata,
        actor: &Actor,
    ) -> Result<EvidenceItem> {
        if raw_bytes.is_empty() {
            return Err(CustosError::Validation("evidence content is empty".into()));
        }
        metadata.validate()?;
        actor.validate()?;

        let evidence_id = EvidenceId::new();
        let content_hash = hash_bytes(raw_bytes);
        let key = self.deriver.derive(&evidence_id)?;
        let payload = self.cipher.encrypt(raw_bytes, &key, evidence_id.as_bytes())?;

        let now = Utc::now();
        let mut item = EvidenceItem {
            evidence_id,
            content_hash,
            payload,
            key_reference: self.deriver.key_reference(),
            lifecycle_state: LifecycleState::Collected,
            metadata,
            collected_at: now,
            updated_at: now,
            ledger_length: 0,
            ledger_head: GENESIS.to_owned(),
        };
        self.ledger.open_chain(&mut item, actor, now)?;

        info!(%evidence_id, "evidence collected");
        Ok(item)
    }

    // -- Custody ----------------------------------------------------------------

    /// Append a custody action to an item's chain.
    ///
    /// Recording `Archived` also moves the item to the terminal `Archived`
    /// state in the same commit.
    #[instrument(skip_all, fields(%evidence_id, %action, actor = %actor.actor_id))]
    pub fn record_custody_action(
        &self,
        evidence_id: &EvidenceId,
        action: CustodyAction,
        actor: &Actor,
    ) -> Result<CustodyEntry> {
        if action == CustodyAction::Collected {
            return Err(CustosError::Validation(
                "collection is recorded once, by collect".into(),
            ));
        }
        actor.validate()?;

        let lock = self.ledger.lock(evidence_id);
        let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
        let item = self.load(evidence_id)?;

        let new_state = (action == CustodyAction::Archived).then_some(LifecycleState::Archived);
        self.ledger
            .append_locked(&item, action, actor, Utc::now(), new_state)
    }

    // -- Verification -----------------------------------------------------------

    /// Decrypt and re-hash the content, then replay the custody chain.
    ///
    /// Tampering is reported in the returned report, never swallowed; use
    /// [`VerificationReport::into_result`] to fail on it.
    #[instrument(skip_all, fields(%evidence_id))]
    pub fn verify_integrity(&self, evidence_id: &EvidenceId) -> Result<VerificationReport> {
        let lock = self.ledger.lock(evidence_id);
        let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);

        let item = self.load(evidence_id)?;
        let entries = self.store().stored_entries(evidence_id)?;
        self.verify_loaded(&item, &entries)
    }

    fn verify_loaded(
        &self,
        item: &EvidenceItem,
        entries: &[StoredEntry],
    ) -> Result<VerificationReport> {
        let content = self.check_content(item)?;
        let chain = self.ledger.replay(item, entries);
        if !content.is_intact() {
            error!(evidence_id = %item.evidence_id, ?content, "evidence content failed verification");
        }
        Ok(VerificationReport {
            evidence_id: item.evidence_id,
            lifecycle_state: item.lifecycle_state,
            content,
            chain,
            verified_at: Utc::now(),
        })
    }

    /// Authenticate and decrypt the stored payload.
    fn open_payload(&self, item: &EvidenceItem) -> Result<Zeroizing<Vec<u8>>> {
        let key = self
            .deriver
            .derive_for(&item.evidence_id, &item.key_reference)?;
        let plaintext = self
            .cipher
            .decrypt(&item.payload, &key, item.evidence_id.as_bytes())?;
        Ok(Zeroizing::new(plaintext))
    }

    /// Integrity failures become report values; anything else propagates.
    fn check_content(&self, item: &EvidenceItem) -> Result<ContentCheck> {
        let plaintext = match self.open_payload(item) {
            Ok(plaintext) => plaintext,
            Err(CustosError::Integrity(reason)) => return Ok(ContentCheck::Undecryptable { reason }),
            Err(e) => return Err(e),
        };
        let actual = hash_bytes(&plaintext);
        if digests_match(&actual, &item.content_hash) {
            Ok(ContentCheck::Intact)
        } else {
            Ok(ContentCheck::HashMismatch {
                expected: item.content_hash.clone(),
                actual,
            })
        }
    }

    // -- Access -----------------------------------------------------------------

    /// Return the plaintext, recording the read as an `Accessed` entry.
    ///
    /// Nothing is returned, and nothing is recorded, unless the payload
    /// authenticates and matches its content hash.
    #[instrument(skip_all, fields(%evidence_id, actor = %requesting_actor.actor_id))]
    pub fn decrypt(&self, evidence_id: &EvidenceId, requesting_actor: &Actor) -> Result<Vec<u8>> {
        requesting_actor.validate()?;

        let lock = self.ledger.lock(evidence_id);
        let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
        let item = self.load(evidence_id)?;
        if item.lifecycle_state.is_terminal() {
            return Err(CustosError::State {
                current: item.lifecycle_state,
                attempted: "decrypt".into(),
            });
        }

        let plaintext = self.open_payload(&item).inspect_err(|e| {
            error!(error = %e, "evidence payload failed authentication");
        })?;
        verify_hash(&plaintext, &item.content_hash).inspect_err(|e| {
            error!(error = %e, "decrypted evidence does not match its content hash");
        })?;

        self.ledger.append_locked(
            &item,
            CustodyAction::Accessed,
            requesting_actor,
            Utc::now(),
            None,
        )?;
        Ok(plaintext.to_vec())
    }

    // -- Lifecycle --------------------------------------------------------------

    /// Move an item exactly one step forward (or straight to `Archived`).
    ///
    /// Steps that change custody append their entry and the new state in one
    /// commit; the others only update the state, after their guard passes.
    #[instrument(skip_all, fields(%evidence_id, %target, actor = %actor.actor_id))]
    pub fn advance(
        &self,
        evidence_id: &EvidenceId,
        target: LifecycleState,
        actor: &Actor,
    ) -> Result<EvidenceItem> {
        actor.validate()?;

        let lock = self.ledger.lock(evidence_id);
        let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
        let item = self.load(evidence_id)?;
        let current = item.lifecycle_state;
        if !current.can_advance_to(target) {
            return Err(CustosError::State {
                current,
                attempted: format!("advance to {target}"),
            });
        }

        let action = match target {
            LifecycleState::Encrypted => {
                self.check_content(&item)?.into_result()?;
                None
            }
            LifecycleState::Verified => {
                let entries = self.store().stored_entries(evidence_id)?;
                self.ledger.replay(&item, &entries).into_result()?;
                None
            }
            LifecycleState::Collected | LifecycleState::Stored => None,
            LifecycleState::Analyzed => Some(CustodyAction::Analyzed),
            LifecycleState::CourtReady => {
                self.check_admissible(&item)?;
                Some(CustodyAction::Sealed)
            }
            LifecycleState::Archived => Some(CustodyAction::Archived),
        };

        match action {
            Some(action) => {
                self.ledger
                    .append_locked(&item, action, actor, Utc::now(), Some(target))?;
            }
            None => self
                .store()
                .set_state(evidence_id, current, target, Utc::now())?,
        }
        info!(from = %current, to = %target, "lifecycle advanced");
        self.load(evidence_id)
    }

    fn check_admissible(&self, item: &EvidenceItem) -> Result<()> {
        let stored = self.store().stored_entries(&item.evidence_id)?;
        self.verify_loaded(item, &stored)?.into_result()?;

        let entries = stored
            .into_iter()
            .map(StoredEntry::into_entry)
            .collect::<Result<Vec<_>>>()?;
        let unmet = self.policy.unmet(item, &entries);
        if unmet.is_empty() {
            Ok(())
        } else {
            Err(CustosError::Validation(format!(
                "evidence is not admissible: {}",
                unmet.join("; ")
            )))
        }
    }

    // -- Queries ----------------------------------------------------------------

    pub fn item(&self, evidence_id: &EvidenceId) -> Result<EvidenceItem> {
        self.load(evidence_id)
    }

    pub fn items(&self) -> Result<Vec<EvidenceId>> {
        self.store().item_ids()
    }

    /// The full custody chain, attestation included.
    pub fn history(&self, evidence_id: &EvidenceId) -> Result<Vec<CustodyEntry>> {
        self.ledger.entries(evidence_id)
    }

    /// Verify the item and bundle the result with its history into a report
    /// signed with the custody key. A failed verification is included in the
    /// report, not raised. Rows that no longer decode are left out of the
    /// history and appear in the verification as violations.
    #[instrument(skip_all, fields(%evidence_id))]
    pub fn custody_report(&self, evidence_id: &EvidenceId) -> Result<CustodyReport> {
        let lock = self.ledger.lock(evidence_id);
        let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);

        let item = self.load(evidence_id)?;
        let stored = self.store().stored_entries(evidence_id)?;
        let verification = self.verify_loaded(&item, &stored)?;
        let history = stored
            .into_iter()
            .filter_map(|row| row.into_entry().ok())
            .collect();
        CustodyReport::new(item.metadata, verification, history, self.ledger.signer())
    }

    /// Whether `report` is unaltered and signed by a trusted custody key.
    pub fn check_report(&self, report: &CustodyReport) -> Result<bool> {
        report.check_seal(self.ledger.trusted())
    }
}

impl std::fmt::Debug for EvidenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceRegistry")
            .field("ledger", &self.ledger)
            .field("key_reference", &self.deriver.key_reference())
            .finish_non_exhaustive()
    }
}
