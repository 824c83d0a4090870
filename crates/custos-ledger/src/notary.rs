// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External notarization of custody heads.
//
// After an entry commits, its `current_hash` may be handed to a notarizer
// that records it somewhere the ledger's operator cannot rewrite. The
// receipt is stored as the entry's `anchor_reference`. Anchoring is best
// effort: a failing notarizer is logged and never undoes the append.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use custos_core::error::Result;
use custos_core::types::EvidenceId;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::canonical::timestamp_text;

/// Records a committed chain head outside the ledger.
pub trait Notarizer: Send + Sync {
    /// Anchor `current_hash` and return a receipt, or `None` if the
    /// notarizer chose not to anchor this entry.
    fn notarize(&self, evidence_id: &EvidenceId, current_hash: &str) -> Result<Option<String>>;
}

#[derive(Serialize)]
struct AnchorLine<'a> {
    evidence_id: String,
    current_hash: &'a str,
    anchored_at: String,
}

/// Appends one JSON line per anchored head to a local log file.
///
/// The receipt is `file:<path>#<line>`, where `<line>` is 1-based.
#[derive(Debug)]
pub struct FileNotarizer {
    path: PathBuf,
    // Line counter; serializes writers within this process.
    lines: Mutex<u64>,
}

impl FileNotarizer {
    /// Open (or create) the anchor log at `path`, resuming its line count.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let lines = if path.exists() {
            let file = std::fs::File::open(&path)?;
            BufReader::new(file).lines().count() as u64
        } else {
            0
        };
        Ok(Self {
            path,
            lines: Mutex::new(lines),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Notarizer for FileNotarizer {
    #[instrument(skip_all, fields(%evidence_id))]
    fn notarize(&self, evidence_id: &EvidenceId, current_hash: &str) -> Result<Option<String>> {
        let line = serde_json::to_string(&AnchorLine {
            evidence_id: evidence_id.to_string(),
            current_hash,
            anchored_at: timestamp_text(&Utc::now()),
        })?;

        let mut count = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        file.sync_data()?;
        *count += 1;

        let receipt = format!("file:{}#{}", self.path.display(), *count);
        debug!(%receipt, "custody head anchored");
        Ok(Some(receipt))
    }
}
