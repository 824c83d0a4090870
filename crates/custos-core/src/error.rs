// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Custos.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EvidenceId, LifecycleState};

/// Top-level error type for all Custos operations.
#[derive(Debug, Error)]
pub enum CustosError {
    // -- Caller errors --
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("evidence not found: {0}")]
    NotFound(EvidenceId),

    #[error("{attempted} is not permitted while evidence is {current}")]
    State {
        current: LifecycleState,
        attempted: String,
    },

    // -- Tampering / corruption --
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("custody chain of {evidence_id} violated at entries {indices:?}")]
    ChainViolation {
        evidence_id: EvidenceId,
        indices: Vec<u64>,
    },

    // -- Startup / key material --
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    // -- Storage / persistence --
    #[error("storage timed out: {0}")]
    StorageTimeout(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Classification of errors for caller retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Storage busy or unavailable: the caller may retry with backoff.
    Transient,
    /// Bad input or wrong lifecycle state: fix the request.
    CallerFixable,
    /// Evidence of tampering or corruption: escalate to an operator.
    Tampering,
    /// Startup or key-material problem: the registry cannot operate.
    Fatal,
}

impl CustosError {
    /// Classify the error for the caller's retry policy.
    ///
    /// The core itself never retries; only `Transient` errors are safe for a
    /// caller to retry, and only after confirming no partial write occurred.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::StorageTimeout(_) | Self::Storage(_) => ErrorClass::Transient,
            Self::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted => {
                    ErrorClass::Transient
                }
                _ => ErrorClass::Fatal,
            },

            Self::Validation(_) | Self::NotFound(_) | Self::State { .. } => {
                ErrorClass::CallerFixable
            }

            Self::Integrity(_) | Self::IntegrityMismatch { .. } | Self::ChainViolation { .. } => {
                ErrorClass::Tampering
            }

            Self::Configuration(_) | Self::Crypto(_) | Self::Serialization(_) => ErrorClass::Fatal,
        }
    }

    /// Whether a caller may retry the failed operation.
    pub fn is_retriable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CustosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_transient() {
        assert!(CustosError::StorageTimeout("busy".into()).is_retriable());
        assert!(CustosError::Storage("disk".into()).is_retriable());
    }

    #[test]
    fn tampering_is_never_retriable() {
        let errors = [
            CustosError::Integrity("tag".into()),
            CustosError::IntegrityMismatch {
                expected: "aa".into(),
                actual: "bb".into(),
            },
            CustosError::ChainViolation {
                evidence_id: EvidenceId::new(),
                indices: vec![0, 1],
            },
        ];
        for err in errors {
            assert_eq!(err.class(), ErrorClass::Tampering);
            assert!(!err.is_retriable());
        }
    }

    #[test]
    fn error_class_serializes_by_name() {
        let json = serde_json::to_string(&CustosError::Integrity("x".into()).class()).unwrap();
        assert_eq!(json, "\"Tampering\"");
    }

    #[test]
    fn state_error_message_names_both_sides() {
        let err = CustosError::State {
            current: LifecycleState::Archived,
            attempted: "custody action transferred".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("archived"));
        assert!(msg.contains("transferred"));
        assert_eq!(err.class(), ErrorClass::CallerFixable);
    }
}
