// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Evidence store — SQLite persistence for items, custody entries, and
// notarization anchors.
//
// Every write that touches the custody chain runs in one IMMEDIATE
// transaction, so an entry, the item's ledger head, and any lifecycle change
// are committed together or not at all. Custody rows are additionally
// protected by triggers that abort UPDATE and DELETE.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use custos_core::error::{CustosError, Result};
use custos_core::types::{
    Actor, Attestation, CustodyAction, CustodyEntry, EncryptedPayload, EvidenceId, EvidenceItem,
    EvidenceMetadata, KeyReference, LifecycleState,
};
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::canonical::timestamp_text;

/// SQLite schema for items, custody entries, and anchors.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS evidence_items (
        evidence_id     TEXT PRIMARY KEY,
        content_hash    TEXT NOT NULL,
        ciphertext      BLOB NOT NULL,
        nonce           BLOB NOT NULL,
        tag             BLOB NOT NULL,
        key_reference   TEXT NOT NULL,
        lifecycle_state TEXT NOT NULL,
        metadata        TEXT NOT NULL,
        collected_at    TEXT NOT NULL,
        updated_at      TEXT NOT NULL,
        ledger_length   INTEGER NOT NULL,
        ledger_head     TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS custody_entries (
        entry_id        TEXT PRIMARY KEY,
        evidence_id     TEXT NOT NULL REFERENCES evidence_items(evidence_id),
        sequence_number INTEGER NOT NULL,
        action          TEXT NOT NULL,
        actor_id        TEXT NOT NULL,
        attestation     TEXT NOT NULL,
        timestamp       TEXT NOT NULL,
        previous_hash   TEXT NOT NULL,
        current_hash    TEXT NOT NULL,
        signature       TEXT NOT NULL,
        signer_key_id   TEXT NOT NULL,
        UNIQUE (evidence_id, sequence_number)
    );

    CREATE TABLE IF NOT EXISTS custody_anchors (
        entry_id    TEXT PRIMARY KEY REFERENCES custody_entries(entry_id),
        reference   TEXT NOT NULL,
        anchored_at TEXT NOT NULL
    );

    CREATE TRIGGER IF NOT EXISTS custody_entries_no_update
    BEFORE UPDATE ON custody_entries
    BEGIN
        SELECT RAISE(ABORT, 'custody entries are append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS custody_entries_no_delete
    BEFORE DELETE ON custody_entries
    BEGIN
        SELECT RAISE(ABORT, 'custody entries are append-only');
    END;
"#;

const SELECT_ENTRIES_SQL: &str = r#"
    SELECT e.entry_id, e.evidence_id, e.sequence_number, e.action, e.actor_id,
           e.attestation, e.timestamp, e.previous_hash, e.current_hash,
           e.signature, e.signer_key_id, a.reference
    FROM custody_entries e
    LEFT JOIN custody_anchors a ON a.entry_id = e.entry_id
    WHERE e.evidence_id = ?1
    ORDER BY e.sequence_number ASC
"#;

const SELECT_ITEM_SQL: &str = r#"
    SELECT evidence_id, content_hash, ciphertext, nonce, tag, key_reference,
           lifecycle_state, metadata, collected_at, updated_at, ledger_length,
           ledger_head
    FROM evidence_items
    WHERE evidence_id = ?1
"#;

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Persistence required by the ledger and registry.
///
/// Implementations must make each method atomic: a failed call leaves no
/// trace. `append_entry` must refuse an entry whose `sequence_number` and
/// `previous_hash` do not extend the item's committed head, so a forked
/// append can never commit even if the caller's locking is bypassed.
pub trait EvidenceStore: Send + Sync {
    /// Insert a new item together with its genesis custody entry.
    fn insert_item(&self, item: &EvidenceItem, genesis: &CustodyEntry) -> Result<()>;

    /// Append `entry` and, if given, move the item to `new_state`.
    fn append_entry(&self, entry: &CustodyEntry, new_state: Option<LifecycleState>) -> Result<()>;

    /// Change lifecycle state without a custody entry. Fails if the item is
    /// no longer in `from`.
    fn set_state(
        &self,
        evidence_id: &EvidenceId,
        from: LifecycleState,
        to: LifecycleState,
        at: DateTime<Utc>,
    ) -> Result<()>;

    fn load_item(&self, evidence_id: &EvidenceId) -> Result<Option<EvidenceItem>>;

    /// Every custody row for an item in sequence order, including rows
    /// that no longer decode.
    fn stored_entries(&self, evidence_id: &EvidenceId) -> Result<Vec<StoredEntry>>;

    /// All entries for an item in sequence order. A row that no longer
    /// decodes fails the whole read with `Integrity`.
    fn entries(&self, evidence_id: &EvidenceId) -> Result<Vec<CustodyEntry>> {
        self.stored_entries(evidence_id)?
            .into_iter()
            .map(StoredEntry::into_entry)
            .collect()
    }

    /// Record an external notarization receipt for an entry.
    fn attach_anchor(&self, entry_id: &Uuid, reference: &str) -> Result<()>;

    fn item_ids(&self) -> Result<Vec<EvidenceId>>;
}

/// A custody row as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredEntry {
    Parsed(CustodyEntry),
    /// The row's columns no longer decode into an entry.
    Malformed { current_hash: String, reason: String },
}

impl StoredEntry {
    /// The row's stored `current_hash`, decoded or not.
    pub fn current_hash(&self) -> &str {
        match self {
            Self::Parsed(entry) => &entry.current_hash,
            Self::Malformed { current_hash, .. } => current_hash,
        }
    }

    pub fn as_entry(&self) -> Option<&CustodyEntry> {
        match self {
            Self::Parsed(entry) => Some(entry),
            Self::Malformed { .. } => None,
        }
    }

    pub fn into_entry(self) -> Result<CustodyEntry> {
        match self {
            Self::Parsed(entry) => Ok(entry),
            Self::Malformed { reason, .. } => Err(CustosError::Integrity(reason)),
        }
    }
}

// ---------------------------------------------------------------------------
// Local error helpers
// ---------------------------------------------------------------------------

/// Convert a `rusqlite::Error`, surfacing busy/locked databases as timeouts.
fn db_err(e: rusqlite::Error) -> CustosError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            CustosError::StorageTimeout(e.to_string())
        }
        _ => CustosError::Storage(e.to_string()),
    }
}

fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CustosError::Integrity(format!("stored {field} {raw:?} is not RFC 3339: {e}")))
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| CustosError::Integrity(format!("stored {field} {raw:?} is not a UUID: {e}")))
}

// ---------------------------------------------------------------------------
// Raw rows
// ---------------------------------------------------------------------------

/// Column values as stored, before domain parsing.
struct EntryRow {
    entry_id: String,
    evidence_id: String,
    sequence_number: i64,
    action: String,
    actor_id: String,
    attestation: String,
    timestamp: String,
    previous_hash: String,
    current_hash: String,
    signature: String,
    signer_key_id: String,
    anchor_reference: Option<String>,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entry_id: row.get(0)?,
            evidence_id: row.get(1)?,
            sequence_number: row.get(2)?,
            action: row.get(3)?,
            actor_id: row.get(4)?,
            attestation: row.get(5)?,
            timestamp: row.get(6)?,
            previous_hash: row.get(7)?,
            current_hash: row.get(8)?,
            signature: row.get(9)?,
            signer_key_id: row.get(10)?,
            anchor_reference: row.get(11)?,
        })
    }

    /// Rows that fail to decode are kept, so replay can flag them by position.
    fn into_stored(self) -> StoredEntry {
        let current_hash = self.current_hash.clone();
        match self.decode() {
            Ok(entry) => StoredEntry::Parsed(entry),
            Err(CustosError::Integrity(reason)) => StoredEntry::Malformed {
                current_hash,
                reason,
            },
            Err(e) => StoredEntry::Malformed {
                current_hash,
                reason: e.to_string(),
            },
        }
    }

    fn decode(self) -> Result<CustodyEntry> {
        let action = self
            .action
            .parse::<CustodyAction>()
            .map_err(|_| CustosError::Integrity(format!("stored action {:?} is unknown", self.action)))?;
        let attestation: Attestation = serde_json::from_str(&self.attestation).map_err(|e| {
            CustosError::Integrity(format!("stored attestation is not valid JSON: {e}"))
        })?;
        let sequence_number = u64::try_from(self.sequence_number).map_err(|_| {
            CustosError::Integrity(format!("negative sequence number {}", self.sequence_number))
        })?;

        Ok(CustodyEntry {
            entry_id: parse_uuid("entry_id", &self.entry_id)?,
            evidence_id: EvidenceId(parse_uuid("evidence_id", &self.evidence_id)?),
            sequence_number,
            action,
            actor: Actor {
                actor_id: self.actor_id,
                attestation,
            },
            timestamp: parse_time("timestamp", &self.timestamp)?,
            previous_hash: self.previous_hash,
            current_hash: self.current_hash,
            signature: self.signature,
            signer_key_id: self.signer_key_id,
            anchor_reference: self.anchor_reference,
        })
    }
}

struct ItemRow {
    evidence_id: String,
    content_hash: String,
    ciphertext: Vec<u8>,
    nonce: Vec<u8>,
    tag: Vec<u8>,
    key_reference: String,
    lifecycle_state: String,
    metadata: String,
    collected_at: String,
    updated_at: String,
    ledger_length: i64,
    ledger_head: String,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            evidence_id: row.get(0)?,
            content_hash: row.get(1)?,
            ciphertext: row.get(2)?,
            nonce: row.get(3)?,
            tag: row.get(4)?,
            key_reference: row.get(5)?,
            lifecycle_state: row.get(6)?,
            metadata: row.get(7)?,
            collected_at: row.get(8)?,
            updated_at: row.get(9)?,
            ledger_length: row.get(10)?,
            ledger_head: row.get(11)?,
        })
    }

    fn into_item(self) -> Result<EvidenceItem> {
        let lifecycle_state = self.lifecycle_state.parse::<LifecycleState>().map_err(|_| {
            CustosError::Integrity(format!(
                "stored lifecycle state {:?} is unknown",
                self.lifecycle_state
            ))
        })?;
        let metadata: EvidenceMetadata = serde_json::from_str(&self.metadata)
            .map_err(|e| CustosError::Integrity(format!("stored metadata is not valid JSON: {e}")))?;
        let ledger_length = u64::try_from(self.ledger_length).map_err(|_| {
            CustosError::Integrity(format!("negative ledger length {}", self.ledger_length))
        })?;

        Ok(EvidenceItem {
            evidence_id: EvidenceId(parse_uuid("evidence_id", &self.evidence_id)?),
            content_hash: self.content_hash,
            payload: EncryptedPayload {
                ciphertext: self.ciphertext,
                nonce: self.nonce,
                tag: self.tag,
            },
            key_reference: KeyReference(self.key_reference),
            lifecycle_state,
            metadata,
            collected_at: parse_time("collected_at", &self.collected_at)?,
            updated_at: parse_time("updated_at", &self.updated_at)?,
            ledger_length,
            ledger_head: self.ledger_head,
        })
    }
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// Evidence store backed by a single SQLite connection.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so it sits behind a
/// `Mutex`. A poisoned lock is recovered: every write is a complete
/// transaction, so the connection can never hold half an append.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the evidence database at `path`.
    ///
    /// WAL mode is enabled and `busy_timeout` bounds how long a call waits
    /// for another writer before failing with `StorageTimeout`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
        conn.busy_timeout(busy_timeout).map_err(db_err)?;
        let store = Self::init(conn)?;
        info!("evidence store opened");
        Ok(store)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let store = Self::init(conn)?;
        debug!("in-memory evidence store opened");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_err)?;
        conn.execute_batch(CREATE_TABLES_SQL).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run raw SQL against the database, bypassing every guard.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn().execute_batch(sql).map_err(db_err)
    }
}

fn insert_entry_row(tx: &rusqlite::Transaction<'_>, entry: &CustodyEntry) -> Result<()> {
    let attestation = serde_json::to_string(&entry.actor.attestation)?;
    let sequence_number = i64::try_from(entry.sequence_number)
        .map_err(|_| CustosError::Validation("sequence number out of range".into()))?;
    tx.execute(
        "INSERT INTO custody_entries (entry_id, evidence_id, sequence_number, action,
         actor_id, attestation, timestamp, previous_hash, current_hash, signature, signer_key_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            entry.entry_id.to_string(),
            entry.evidence_id.to_string(),
            sequence_number,
            entry.action.as_str(),
            entry.actor.actor_id,
            attestation,
            timestamp_text(&entry.timestamp),
            entry.previous_hash,
            entry.current_hash,
            entry.signature,
            entry.signer_key_id,
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

impl EvidenceStore for SqliteStore {
    #[instrument(skip_all, fields(evidence_id = %item.evidence_id))]
    fn insert_item(&self, item: &EvidenceItem, genesis: &CustodyEntry) -> Result<()> {
        let metadata = serde_json::to_string(&item.metadata)?;
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        tx.execute(
            "INSERT INTO evidence_items (evidence_id, content_hash, ciphertext, nonce, tag,
             key_reference, lifecycle_state, metadata, collected_at, updated_at,
             ledger_length, ledger_head)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11)",
            params![
                item.evidence_id.to_string(),
                item.content_hash,
                item.payload.ciphertext,
                item.payload.nonce,
                item.payload.tag,
                item.key_reference.0,
                item.lifecycle_state.as_str(),
                metadata,
                timestamp_text(&item.collected_at),
                timestamp_text(&item.updated_at),
                genesis.current_hash,
            ],
        )
        .map_err(db_err)?;
        insert_entry_row(&tx, genesis)?;

        tx.commit().map_err(db_err)?;
        debug!("evidence item inserted");
        Ok(())
    }

    #[instrument(skip_all, fields(evidence_id = %entry.evidence_id, seq = entry.sequence_number))]
    fn append_entry(&self, entry: &CustodyEntry, new_state: Option<LifecycleState>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let head: Option<(i64, String)> = tx
            .query_row(
                "SELECT ledger_length, ledger_head FROM evidence_items WHERE evidence_id = ?1",
                params![entry.evidence_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let Some((length, head_hash)) = head else {
            return Err(CustosError::NotFound(entry.evidence_id));
        };
        if u64::try_from(length).ok() != Some(entry.sequence_number)
            || head_hash != entry.previous_hash
        {
            return Err(CustosError::Storage(format!(
                "ledger head moved: expected sequence {} after {}, store is at {} after {}",
                entry.sequence_number, entry.previous_hash, length, head_hash
            )));
        }

        insert_entry_row(&tx, entry)?;
        let updated_at = timestamp_text(&entry.timestamp);
        match new_state {
            Some(state) => tx.execute(
                "UPDATE evidence_items
                 SET ledger_length = ledger_length + 1, ledger_head = ?2, updated_at = ?3,
                     lifecycle_state = ?4
                 WHERE evidence_id = ?1",
                params![
                    entry.evidence_id.to_string(),
                    entry.current_hash,
                    updated_at,
                    state.as_str()
                ],
            ),
            None => tx.execute(
                "UPDATE evidence_items
                 SET ledger_length = ledger_length + 1, ledger_head = ?2, updated_at = ?3
                 WHERE evidence_id = ?1",
                params![entry.evidence_id.to_string(), entry.current_hash, updated_at],
            ),
        }
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        debug!("custody entry committed");
        Ok(())
    }

    #[instrument(skip_all, fields(%evidence_id, %from, %to))]
    fn set_state(
        &self,
        evidence_id: &EvidenceId,
        from: LifecycleState,
        to: LifecycleState,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self
            .conn()
            .execute(
                "UPDATE evidence_items SET lifecycle_state = ?3, updated_at = ?4
                 WHERE evidence_id = ?1 AND lifecycle_state = ?2",
                params![
                    evidence_id.to_string(),
                    from.as_str(),
                    to.as_str(),
                    timestamp_text(&at)
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(CustosError::Storage(format!(
                "evidence {evidence_id} is no longer {from}"
            )));
        }
        Ok(())
    }

    fn load_item(&self, evidence_id: &EvidenceId) -> Result<Option<EvidenceItem>> {
        let row = self
            .conn()
            .query_row(SELECT_ITEM_SQL, params![evidence_id.to_string()], ItemRow::from_row)
            .optional()
            .map_err(db_err)?;
        row.map(ItemRow::into_item).transpose()
    }

    fn stored_entries(&self, evidence_id: &EvidenceId) -> Result<Vec<StoredEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(SELECT_ENTRIES_SQL).map_err(db_err)?;
        let rows = stmt
            .query_map(params![evidence_id.to_string()], EntryRow::from_row)
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?.into_stored());
        }
        Ok(entries)
    }

    #[instrument(skip_all, fields(%entry_id))]
    fn attach_anchor(&self, entry_id: &Uuid, reference: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO custody_anchors (entry_id, reference, anchored_at)
                 VALUES (?1, ?2, ?3)",
                params![entry_id.to_string(), reference, timestamp_text(&Utc::now())],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn item_ids(&self) -> Result<Vec<EvidenceId>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT evidence_id FROM evidence_items ORDER BY collected_at ASC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(EvidenceId(parse_uuid("evidence_id", &row.map_err(db_err)?)?));
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custos_core::types::GENESIS;

    fn item() -> EvidenceItem {
        let now = Utc::now();
        EvidenceItem {
            evidence_id: EvidenceId::new(),
            content_hash: "ab".repeat(32),
            payload: EncryptedPayload {
                ciphertext: vec![1, 2, 3],
                nonce: vec![0; 12],
                tag: vec![9; 16],
            },
            key_reference: KeyReference("pbkdf2-sha256:100000".into()),
            lifecycle_state: LifecycleState::Collected,
            metadata: EvidenceMetadata::new("CASE-1", "twitter"),
            collected_at: now,
            updated_at: now,
            ledger_length: 0,
            ledger_head: GENESIS.into(),
        }
    }

    fn entry(item: &EvidenceItem, seq: u64, prev: &str, current: &str) -> CustodyEntry {
        CustodyEntry {
            entry_id: Uuid::new_v4(),
            evidence_id: item.evidence_id,
            sequence_number: seq,
            action: if seq == 0 {
                CustodyAction::Collected
            } else {
                CustodyAction::Transferred
            },
            actor: Actor::new("OFF-001"),
            timestamp: Utc::now(),
            previous_hash: prev.into(),
            current_hash: current.into(),
            signature: "00".into(),
            signer_key_id: "key".into(),
            anchor_reference: None,
        }
    }

    #[test]
    fn insert_and_load_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = item();
        let genesis = entry(&item, 0, GENESIS, "h0");
        store.insert_item(&item, &genesis).unwrap();

        let loaded = store.load_item(&item.evidence_id).unwrap().unwrap();
        assert_eq!(loaded.content_hash, item.content_hash);
        assert_eq!(loaded.payload, item.payload);
        assert_eq!(loaded.collected_at, item.collected_at);
        assert_eq!(loaded.ledger_length, 1);
        assert_eq!(loaded.ledger_head, "h0");

        let entries = store.entries(&item.evidence_id).unwrap();
        assert_eq!(entries, vec![genesis]);
        assert_eq!(store.item_ids().unwrap(), vec![item.evidence_id]);
    }

    #[test]
    fn missing_item_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load_item(&EvidenceId::new()).unwrap().is_none());
    }

    #[test]
    fn append_must_extend_head() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = item();
        store.insert_item(&item, &entry(&item, 0, GENESIS, "h0")).unwrap();
        store.append_entry(&entry(&item, 1, "h0", "h1"), None).unwrap();

        // A second writer that also read "h0" as the head must lose.
        let fork = entry(&item, 1, "h0", "h1-fork");
        assert!(matches!(
            store.append_entry(&fork, None),
            Err(CustosError::Storage(_))
        ));
        assert_eq!(store.entries(&item.evidence_id).unwrap().len(), 2);
    }

    #[test]
    fn append_with_state_change_is_atomic() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = item();
        store.insert_item(&item, &entry(&item, 0, GENESIS, "h0")).unwrap();
        store
            .append_entry(&entry(&item, 1, "h0", "h1"), Some(LifecycleState::Archived))
            .unwrap();

        let loaded = store.load_item(&item.evidence_id).unwrap().unwrap();
        assert_eq!(loaded.lifecycle_state, LifecycleState::Archived);
        assert_eq!(loaded.ledger_length, 2);
        assert_eq!(loaded.ledger_head, "h1");
    }

    #[test]
    fn append_to_unknown_item_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let orphan = entry(&item(), 0, GENESIS, "h0");
        assert!(matches!(
            store.append_entry(&orphan, None),
            Err(CustosError::NotFound(_))
        ));
    }

    #[test]
    fn custody_rows_reject_update_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = item();
        store.insert_item(&item, &entry(&item, 0, GENESIS, "h0")).unwrap();

        assert!(store
            .execute_raw("UPDATE custody_entries SET actor_id = 'OFF-999'")
            .is_err());
        assert!(store.execute_raw("DELETE FROM custody_entries").is_err());
        assert_eq!(store.entries(&item.evidence_id).unwrap()[0].actor_id(), "OFF-001");
    }

    #[test]
    fn undecodable_row_is_kept_in_place() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = item();
        store.insert_item(&item, &entry(&item, 0, GENESIS, "h0")).unwrap();
        store.append_entry(&entry(&item, 1, "h0", "h1"), None).unwrap();
        store
            .execute_raw(
                "DROP TRIGGER custody_entries_no_update;
                 UPDATE custody_entries SET action = 'Transferred' WHERE sequence_number = 1;",
            )
            .unwrap();

        let stored = store.stored_entries(&item.evidence_id).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored[0].as_entry().is_some());
        match &stored[1] {
            StoredEntry::Malformed {
                current_hash,
                reason,
            } => {
                assert_eq!(current_hash, "h1");
                assert!(reason.contains("Transferred"));
            }
            other => panic!("expected malformed row, got {other:?}"),
        }
        assert!(matches!(
            store.entries(&item.evidence_id),
            Err(CustosError::Integrity(_))
        ));
    }

    #[test]
    fn set_state_is_compare_and_set() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = item();
        store.insert_item(&item, &entry(&item, 0, GENESIS, "h0")).unwrap();

        store
            .set_state(&item.evidence_id, LifecycleState::Collected, LifecycleState::Encrypted, Utc::now())
            .unwrap();
        assert!(store
            .set_state(&item.evidence_id, LifecycleState::Collected, LifecycleState::Encrypted, Utc::now())
            .is_err());
    }

    #[test]
    fn anchors_join_onto_entries() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = item();
        let genesis = entry(&item, 0, GENESIS, "h0");
        store.insert_item(&item, &genesis).unwrap();
        store.attach_anchor(&genesis.entry_id, "anchor:1").unwrap();

        let entries = store.entries(&item.evidence_id).unwrap();
        assert_eq!(entries[0].anchor_reference.as_deref(), Some("anchor:1"));
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.db");
        let item = item();
        {
            let store = SqliteStore::open(&path, Duration::from_millis(500)).unwrap();
            store.insert_item(&item, &entry(&item, 0, GENESIS, "h0")).unwrap();
        }
        let store = SqliteStore::open(&path, Duration::from_millis(500)).unwrap();
        assert!(store.load_item(&item.evidence_id).unwrap().is_some());
    }
}
