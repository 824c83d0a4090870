// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Canonical byte encoding of a custody entry.
//
// The same bytes are hashed into `current_hash` and signed, so signer and
// verifier must never disagree on them. Layout:
//
//   "custos/custody-entry/v1"
//   field*   where field = u64 big-endian length || bytes
//
// Fields, in order: previous_hash, evidence_id, action, actor_id, timestamp
// (RFC 3339, nanosecond precision, `Z` suffix), sequence_number (decimal),
// entry_id, then each attestation field as a presence byte (0/1) followed
// by the field when present. `anchor_reference` is excluded: it is obtained
// after the entry is committed.

use chrono::{DateTime, SecondsFormat, Utc};
use custos_core::types::CustodyEntry;
use custos_security::hash_bytes;

const ENTRY_DOMAIN: &[u8] = b"custos/custody-entry/v1";

/// Canonical bytes of `entry`, linked to `previous_hash`.
///
/// `previous_hash` is passed separately so a verifier can recompute the hash
/// an entry *should* have given the replayed chain, independent of what the
/// stored `previous_hash` field claims.
pub fn entry_message(entry: &CustodyEntry, previous_hash: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(ENTRY_DOMAIN);
    put(&mut buf, previous_hash.as_bytes());
    put(&mut buf, entry.evidence_id.to_string().as_bytes());
    put(&mut buf, entry.action.as_str().as_bytes());
    put(&mut buf, entry.actor.actor_id.as_bytes());
    put(&mut buf, timestamp_text(&entry.timestamp).as_bytes());
    put(&mut buf, entry.sequence_number.to_string().as_bytes());
    put(&mut buf, entry.entry_id.to_string().as_bytes());

    let attestation = &entry.actor.attestation;
    for field in [
        &attestation.name,
        &attestation.badge_number,
        &attestation.department,
        &attestation.location,
        &attestation.reason,
    ] {
        put_opt(&mut buf, field.as_deref());
    }
    buf
}

/// `current_hash` of `entry` when linked to `previous_hash`.
pub fn entry_hash(entry: &CustodyEntry, previous_hash: &str) -> String {
    hash_bytes(&entry_message(entry, previous_hash))
}

/// The one timestamp rendering used in hashes and in the store.
pub fn timestamp_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn put(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn put_opt(buf: &mut Vec<u8>, value: Option<&str>) {
    match value {
        Some(v) => {
            buf.push(1);
            put(buf, v.as_bytes());
        }
        None => buf.push(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use custos_core::types::{Actor, Attestation, CustodyAction, EvidenceId, GENESIS};
    use uuid::Uuid;

    fn sample() -> CustodyEntry {
        CustodyEntry {
            entry_id: Uuid::new_v4(),
            evidence_id: EvidenceId::new(),
            sequence_number: 0,
            action: CustodyAction::Collected,
            actor: Actor::new("OFF-001"),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap(),
            previous_hash: GENESIS.into(),
            current_hash: String::new(),
            signature: String::new(),
            signer_key_id: String::new(),
            anchor_reference: None,
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let entry = sample();
        assert_eq!(entry_message(&entry, GENESIS), entry_message(&entry, GENESIS));
        assert_eq!(entry_hash(&entry, GENESIS).len(), 64);
    }

    #[test]
    fn every_bound_field_changes_the_hash() {
        let base = sample();
        let h = entry_hash(&base, GENESIS);

        let mut e = base.clone();
        e.actor.actor_id = "OFF-002".into();
        assert_ne!(entry_hash(&e, GENESIS), h);

        let mut e = base.clone();
        e.action = CustodyAction::Transferred;
        assert_ne!(entry_hash(&e, GENESIS), h);

        let mut e = base.clone();
        e.sequence_number = 1;
        assert_ne!(entry_hash(&e, GENESIS), h);

        let mut e = base.clone();
        e.timestamp += chrono::Duration::nanoseconds(1);
        assert_ne!(entry_hash(&e, GENESIS), h);

        let mut e = base.clone();
        e.actor.attestation.location = Some("Forensic Lab".into());
        assert_ne!(entry_hash(&e, GENESIS), h);

        assert_ne!(entry_hash(&base, "0000"), h);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc".
        let mut a = sample();
        a.actor = Actor::new("ab").with_attestation(Attestation {
            name: Some("c".into()),
            ..Attestation::default()
        });
        let mut b = a.clone();
        b.actor = Actor::new("a").with_attestation(Attestation {
            name: Some("bc".into()),
            ..Attestation::default()
        });
        assert_ne!(entry_message(&a, GENESIS), entry_message(&b, GENESIS));
    }

    #[test]
    fn fields_carry_full_width_length_prefix() {
        let message = entry_message(&sample(), GENESIS);
        let start = ENTRY_DOMAIN.len();
        assert_eq!(
            message[start..start + 8].to_vec(),
            (GENESIS.len() as u64).to_be_bytes().to_vec()
        );
        assert_eq!(&message[start + 8..start + 8 + GENESIS.len()], GENESIS.as_bytes());
    }

    #[test]
    fn absent_and_empty_attestation_differ() {
        let absent = sample();
        let mut empty = absent.clone();
        empty.actor.attestation.reason = Some(String::new());
        assert_ne!(entry_hash(&absent, GENESIS), entry_hash(&empty, GENESIS));
    }

    #[test]
    fn anchor_reference_is_not_bound() {
        let base = sample();
        let mut anchored = base.clone();
        anchored.anchor_reference = Some("anchor:42".into());
        assert_eq!(entry_hash(&base, GENESIS), entry_hash(&anchored, GENESIS));
    }

    #[test]
    fn timestamp_text_keeps_nanoseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let text = timestamp_text(&ts);
        assert_eq!(text, "2023-11-14T22:13:20.123456789Z");
        let parsed = DateTime::parse_from_rfc3339(&text).unwrap().with_timezone(&Utc);
        assert_eq!(parsed, ts);
    }
}
