// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for key derivation, payload encryption, integrity
// hashing, and custody signatures in the custos-security crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use custos_core::config::MIN_KDF_ITERATIONS;
use custos_core::types::EvidenceId;
use custos_security::{ContentCipher, KeyDeriver, MasterSecret, SigningKey, hash_bytes};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// One PBKDF2 derivation at the minimum accepted iteration count.
fn bench_key_derivation(c: &mut Criterion) {
    let deriver = KeyDeriver::new(
        MasterSecret::new(b"bench-master-secret".to_vec()).expect("secret"),
        MIN_KDF_ITERATIONS,
    )
    .expect("deriver");
    let id = EvidenceId::new();

    c.bench_function("pbkdf2_derive (100k iterations)", |b| {
        b.iter(|| {
            let key = deriver.derive(black_box(&id)).expect("derive failed");
            black_box(key);
        });
    });
}

/// AES-256-GCM seal-then-open on a 10 KiB payload.
fn bench_encrypt_decrypt_roundtrip(c: &mut Criterion) {
    let deriver = KeyDeriver::new(
        MasterSecret::new(b"bench-master-secret".to_vec()).expect("secret"),
        MIN_KDF_ITERATIONS,
    )
    .expect("deriver");
    let id = EvidenceId::new();
    let key = deriver.derive(&id).expect("derive failed");
    let cipher = ContentCipher::new();
    let plaintext = vec![0x42u8; 10 * 1024]; // 10 KiB

    c.bench_function("encrypt_decrypt_roundtrip (10 KiB)", |b| {
        b.iter(|| {
            let sealed = cipher
                .encrypt(black_box(&plaintext), &key, id.as_bytes())
                .expect("encrypt failed");
            let opened = cipher
                .decrypt(&sealed, &key, id.as_bytes())
                .expect("decrypt failed");
            assert_eq!(opened.len(), plaintext.len());
            black_box(opened);
        });
    });
}

/// SHA-256 integrity hashing at various evidence sizes.
fn bench_integrity_hash(c: &mut Criterion) {
    let sizes: &[(&str, usize)] = &[
        ("1 KiB", 1024),
        ("100 KiB", 100 * 1024),
        ("1 MiB", 1024 * 1024),
    ];

    let mut group = c.benchmark_group("integrity_hash_sha256");
    for &(label, size) in sizes {
        let data = vec![0xABu8; size];
        group.bench_function(label, |b| {
            b.iter(|| {
                let hex = hash_bytes(black_box(&data));
                black_box(hex);
            });
        });
    }
    group.finish();
}

/// ECDSA P-256 sign + verify over a custody-entry sized message.
fn bench_sign_verify(c: &mut Criterion) {
    let key = SigningKey::generate().expect("key generation failed");
    let message = vec![0x5Au8; 256];

    c.bench_function("ecdsa_p256_sign_verify", |b| {
        b.iter(|| {
            let signature = key.sign(black_box(&message)).expect("sign failed");
            assert!(key.public_key().verify(&message, &signature));
        });
    });
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_encrypt_decrypt_roundtrip,
    bench_integrity_hash,
    bench_sign_verify,
);
criterion_main!(benches);
