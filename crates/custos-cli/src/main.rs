// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Custos — tamper-evident evidence ledger.
//
// Entry point. Initialises logging, loads configuration and key material,
// and dispatches one subcommand against the evidence registry.

mod commands;

use std::path::PathBuf;

use clap::Parser;

use commands::Command;

/// Collect, track, and verify digital evidence.
#[derive(Parser, Debug)]
#[command(name = "custos", version, about)]
struct Cli {
    /// JSON configuration file. Defaults apply when omitted.
    #[arg(long, global = true, env = "CUSTOS_CONFIG")]
    config: Option<PathBuf>,

    /// PKCS#8 DER file holding the custody signing key.
    #[arg(long, global = true, env = "CUSTOS_SIGNING_KEY")]
    key: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::run(cli.command, cli.config.as_deref(), cli.key.as_deref())
}
