// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Admissibility checks applied before an item may become court-ready.

use custos_core::types::{CustodyAction, CustodyEntry, EvidenceItem};

/// Decides whether an item's record is complete enough to present in court.
pub trait AdmissibilityPolicy: Send + Sync {
    /// Human-readable unmet requirements. Empty means admissible.
    fn unmet(&self, item: &EvidenceItem, history: &[CustodyEntry]) -> Vec<String>;
}

/// Requires a warrant reference and a `Collected` genesis entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl AdmissibilityPolicy for DefaultPolicy {
    fn unmet(&self, item: &EvidenceItem, history: &[CustodyEntry]) -> Vec<String> {
        let mut unmet = Vec::new();
        if item
            .metadata
            .warrant_id
            .as_deref()
            .is_none_or(|w| w.trim().is_empty())
        {
            unmet.push("no warrant reference recorded".to_owned());
        }
        if history.first().map(|e| e.action) != Some(CustodyAction::Collected) {
            unmet.push("chain does not begin with a collection entry".to_owned());
        }
        unmet
    }
}
