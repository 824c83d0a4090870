// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// custos-security — cryptographic primitives for the evidence ledger.
//
// Per-item key derivation (PBKDF2), AES-256-GCM payload encryption, SHA-256
// content integrity, and ECDSA P-256 custody signatures. Nothing in this
// crate persists anything; callers own storage.

pub mod cipher;
pub mod integrity;
pub mod keys;
pub mod signing;

// PUBLIC API: Re-export core security primitives
pub use cipher::ContentCipher;
pub use integrity::{digests_match, hash_bytes, matches_hash, verify_hash};
pub use keys::{DerivedKey, KeyDeriver, MasterSecret};
pub use signing::{KeyRing, PublicKey, SigningKey};
