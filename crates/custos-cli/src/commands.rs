// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommands. Argument parsing lives here; all evidence handling is
// delegated to `EvidenceRegistry`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use custos_core::config::CustosConfig;
use custos_core::types::{
    Actor, Attestation, CustodyAction, EvidenceId, EvidenceMetadata, EvidenceType,
    LifecycleState,
};
use custos_ledger::{CustodyReport, EvidenceRegistry, KeyMaterial};
use custos_security::{MasterSecret, SigningKey};
use tracing::info;

/// Environment variable holding the master secret. There is no flag for it.
const MASTER_SECRET_ENV: &str = "CUSTOS_MASTER_SECRET";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a new custody signing key (PKCS#8 DER).
    Keygen {
        /// Where to write the private key. Must not already exist.
        #[arg(long)]
        out: PathBuf,
    },
    /// Collect a file as evidence and open its custody chain.
    Collect(CollectArgs),
    /// Record a custody action against an item.
    Record {
        evidence_id: EvidenceId,
        /// transferred, analyzed, copied, accessed, modified, sealed,
        /// unsealed, or archived.
        action: CustodyAction,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Move an item one lifecycle step forward.
    Advance {
        evidence_id: EvidenceId,
        /// encrypted, verified, stored, analyzed, court_ready, or archived.
        target: LifecycleState,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Verify content and custody chain; exits non-zero on tampering.
    Verify { evidence_id: EvidenceId },
    /// Decrypt an item to a file, recording the access.
    Decrypt {
        evidence_id: EvidenceId,
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Print an item's custody history as JSON.
    History { evidence_id: EvidenceId },
    /// Produce a sealed custody report as JSON.
    Report {
        evidence_id: EvidenceId,
        /// Write to a file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check that an exported custody report is unaltered and signed by a
    /// trusted custody key.
    CheckReport { file: PathBuf },
    /// List collected evidence ids.
    List,
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// File whose bytes are the evidence.
    pub file: PathBuf,
    #[arg(long)]
    pub case_number: String,
    /// Platform, device, or system the evidence came from.
    #[arg(long)]
    pub source: String,
    #[arg(long)]
    pub evidence_type: Option<EvidenceType>,
    #[arg(long)]
    pub source_url: Option<String>,
    #[arg(long)]
    pub warrant_id: Option<String>,
    #[arg(long)]
    pub mime_type: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[command(flatten)]
    pub actor: ActorArgs,
}

impl CollectArgs {
    fn metadata(&self) -> EvidenceMetadata {
        EvidenceMetadata {
            evidence_type: self.evidence_type,
            source_url: self.source_url.clone(),
            warrant_id: self.warrant_id.clone(),
            mime_type: self.mime_type.clone(),
            description: self.description.clone(),
            ..EvidenceMetadata::new(&self.case_number, &self.source)
        }
    }
}

/// Who is acting, plus optional attestation recorded in the entry.
#[derive(Args, Debug)]
pub struct ActorArgs {
    #[arg(long = "actor")]
    pub actor_id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub badge: Option<String>,
    #[arg(long)]
    pub department: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub reason: Option<String>,
}

impl From<ActorArgs> for Actor {
    fn from(args: ActorArgs) -> Self {
        Actor::new(args.actor_id).with_attestation(Attestation {
            name: args.name,
            badge_number: args.badge,
            department: args.department,
            location: args.location,
            reason: args.reason,
        })
    }
}

/// Load configuration and key material, then run `command`.
pub fn run(command: Command, config: Option<&Path>, key: Option<&Path>) -> Result<()> {
    if let Command::Keygen { out } = &command {
        return keygen(out, &mut std::io::stdout().lock());
    }

    let config = match config {
        Some(path) => CustosConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CustosConfig::default(),
    };
    let keys = KeyMaterial {
        master_secret: master_secret_from_env()?,
        signing_key: load_signing_key(key)?,
    };
    let registry = EvidenceRegistry::open(&config, keys)?;
    execute(&registry, command, &mut std::io::stdout().lock())
}

fn master_secret_from_env() -> Result<MasterSecret> {
    let secret = std::env::var(MASTER_SECRET_ENV)
        .with_context(|| format!("{MASTER_SECRET_ENV} is not set"))?;
    Ok(MasterSecret::new(secret.into_bytes())?)
}

fn load_signing_key(path: Option<&Path>) -> Result<SigningKey> {
    let Some(path) = path else {
        bail!("no signing key given; pass --key or set CUSTOS_SIGNING_KEY");
    };
    let der = fs::read(path).with_context(|| format!("reading signing key {}", path.display()))?;
    Ok(SigningKey::from_pkcs8(&der)?)
}

fn keygen(out: &Path, stdout: &mut impl Write) -> Result<()> {
    let key = SigningKey::generate()?;
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(out)
        .and_then(|mut file| file.write_all(key.pkcs8_der()))
        .with_context(|| format!("writing signing key {}", out.display()))?;

    info!(key_id = key.key_id(), path = %out.display(), "signing key written");
    writeln!(stdout, "key_id: {}", key.key_id())?;
    writeln!(stdout, "public_key: {}", hex::encode(key.public_key().as_bytes()))?;
    Ok(())
}

fn print_json<T: serde::Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Run a registry-backed subcommand, writing results to `out`.
pub fn execute(registry: &EvidenceRegistry, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Keygen { out: path } => keygen(&path, out),
        Command::Collect(args) => {
            let bytes = fs::read(&args.file)
                .with_context(|| format!("reading evidence {}", args.file.display()))?;
            let metadata = args.metadata();
            let item = registry.collect(&bytes, metadata, &args.actor.into())?;
            writeln!(out, "{}", item.evidence_id)?;
            Ok(())
        }
        Command::Record {
            evidence_id,
            action,
            actor,
        } => {
            let entry = registry.record_custody_action(&evidence_id, action, &actor.into())?;
            print_json(out, &entry)
        }
        Command::Advance {
            evidence_id,
            target,
            actor,
        } => {
            let item = registry.advance(&evidence_id, target, &actor.into())?;
            writeln!(out, "{}: {}", item.evidence_id, item.lifecycle_state)?;
            Ok(())
        }
        Command::Verify { evidence_id } => {
            let report = registry.verify_integrity(&evidence_id)?;
            print_json(out, &report)?;
            report
                .into_result()
                .with_context(|| format!("evidence {evidence_id} failed verification"))?;
            Ok(())
        }
        Command::Decrypt {
            evidence_id,
            out: path,
            actor,
        } => {
            let plaintext = registry.decrypt(&evidence_id, &actor.into())?;
            fs::write(&path, &plaintext)
                .with_context(|| format!("writing plaintext {}", path.display()))?;
            writeln!(out, "{} bytes written to {}", plaintext.len(), path.display())?;
            Ok(())
        }
        Command::History { evidence_id } => print_json(out, &registry.history(&evidence_id)?),
        Command::Report {
            evidence_id,
            out: path,
        } => {
            let report = registry.custody_report(&evidence_id)?;
            match path {
                Some(path) => {
                    fs::write(&path, serde_json::to_vec_pretty(&report)?)
                        .with_context(|| format!("writing report {}", path.display()))?;
                    writeln!(out, "report_hash: {}", report.report_hash)?;
                    Ok(())
                }
                None => print_json(out, &report),
            }
        }
        Command::CheckReport { file } => {
            let data =
                fs::read(&file).with_context(|| format!("reading report {}", file.display()))?;
            let report: CustodyReport = serde_json::from_slice(&data)
                .with_context(|| format!("parsing report {}", file.display()))?;
            if !registry.check_report(&report)? {
                bail!("report {} failed its seal check", file.display());
            }
            writeln!(out, "report_hash: {}", report.report_hash)?;
            writeln!(out, "signed_by: {}", report.signer_key_id)?;
            Ok(())
        }
        Command::List => {
            for id in registry.items()? {
                writeln!(out, "{id}")?;
            }
            Ok(())
        }
    }
}
