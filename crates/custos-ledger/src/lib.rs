// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// custos-ledger — tamper-evident custody ledger and evidence registry.
//
// `EvidenceRegistry` is the entry point: it collects evidence, records
// custody actions, verifies content and chain, and gates lifecycle moves.
// Persistence sits behind `EvidenceStore` (SQLite by default) and optional
// external anchoring behind `Notarizer`.

pub mod canonical;
pub mod ledger;
pub mod locks;
pub mod notary;
pub mod policy;
pub mod registry;
pub mod report;
pub mod store;

pub use ledger::CustodyLedger;
pub use notary::{FileNotarizer, Notarizer};
pub use policy::{AdmissibilityPolicy, DefaultPolicy};
pub use registry::{EvidenceRegistry, KeyMaterial};
pub use report::{
    ChainReport, ChainViolation, ChainViolationKind, ContentCheck, CustodyReport,
    VerificationReport,
};
pub use store::{EvidenceStore, SqliteStore, StoredEntry};
