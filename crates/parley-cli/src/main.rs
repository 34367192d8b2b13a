//! Parley CLI - attested documents and evidence-backed negotiation
//!
//! # Quick Start
//!
//! ```bash
//! parley keys generate
//! parley records attest offer.txt --message "Alice sent this offer"
//! parley records verify offer.signed.json
//! parley claim verify "The average offer is about $1.25M" --records a.signed.json b.signed.json
//! parley negotiate --briefing-a briefings/alice --briefing-b briefings/bob --rounds 6
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod display;

use commands::{claim, keys, negotiate, records};
use crate::config::{AppConfig, LoggingConfig};

/// Parley - signed records and verifiable claims for agent negotiation
#[derive(Parser)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Attest documents, verify claims against them, and run evidence-backed negotiations", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (toml, json or yaml)
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    config: Option<String>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PARLEY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format override (pretty or json)
    #[arg(long, global = true, env = "PARLEY_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage signer identities
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },

    /// Attest, verify and inspect signed records
    Records {
        #[command(subcommand)]
        action: RecordCommands,
    },

    /// Derive or re-check evidence for claims
    Claim {
        #[command(subcommand)]
        action: ClaimCommands,
    },

    /// Run a two-agent negotiation
    Negotiate {
        /// First agent's name
        #[arg(long, default_value = "Alice")]
        name_a: String,

        /// Second agent's name
        #[arg(long, default_value = "Bob")]
        name_b: String,

        /// Directory of briefing files for the first agent
        #[arg(long)]
        briefing_a: Option<PathBuf>,

        /// Directory of briefing files for the second agent
        #[arg(long)]
        briefing_b: Option<PathBuf>,

        /// Replies after the opening message
        #[arg(short, long, default_value = "6")]
        rounds: usize,

        /// Write turns and trace as JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate identities (defaults to Alice, Bob, Charlie, Diana, Eve)
    Generate {
        names: Vec<String>,
    },

    /// List signers and their public keys
    List,
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Extract structured data from a document and sign it
    Attest {
        file: PathBuf,

        /// Message that triggered the attestation (names a signer)
        #[arg(short, long)]
        message: Option<String>,

        /// Sign as this identity
        #[arg(short, long)]
        signer: Option<String>,

        /// Output path (default: <stem>.signed.json)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Verify a record's signature
    Verify {
        file: PathBuf,
    },

    /// Show a record's fields and canonical payload
    Inspect {
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ClaimCommands {
    /// Ask for evidence supporting a claim and evaluate it
    Verify {
        claim: String,

        /// Signed record files
        #[arg(short, long, num_args = 1..)]
        records: Vec<PathBuf>,

        /// Write the evidence artifact here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Re-evaluate a received evidence artifact
    Recheck {
        artifact: PathBuf,

        /// Signed record files
        #[arg(short, long, num_args = 1..)]
        records: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    init_logging(&config.logging);

    tracing::debug!(provider = %config.llm.provider, keystore = %config.keystore.dir.display(), "Configuration loaded");

    match cli.command {
        Commands::Keys { action } => {
            let store = config.open_keystore()?;
            match action {
                KeyCommands::Generate { names } => keys::generate(&store, &names)?,
                KeyCommands::List => keys::list(&store)?,
            }
        }

        Commands::Records { action } => match action {
            RecordCommands::Attest {
                file,
                message,
                signer,
                out,
            } => {
                let ctx = config.app_context()?;
                records::attest(
                    &ctx.attestor(),
                    &file,
                    message.as_deref(),
                    signer.as_deref(),
                    out.as_deref(),
                )
                .await?;
            }
            RecordCommands::Verify { file } => {
                if !records::verify(&*config.open_keystore()?, &file)? {
                    std::process::exit(1);
                }
            }
            RecordCommands::Inspect { file } => {
                records::inspect(&*config.open_keystore()?, &file)?;
            }
        },

        Commands::Claim { action } => match action {
            ClaimCommands::Verify {
                claim: text,
                records: files,
                out,
            } => {
                let docs = records::load_records(&files)?;
                let ctx = config.app_context()?;
                claim::verify(&ctx.verifier(), &text, &docs, out.as_deref()).await?;
            }
            ClaimCommands::Recheck {
                artifact,
                records: files,
            } => {
                let docs = records::load_records(&files)?;
                claim::recheck(&artifact, &docs)?;
            }
        },

        Commands::Negotiate {
            name_a,
            name_b,
            briefing_a,
            briefing_b,
            rounds,
            out,
        } => {
            let ctx = config.app_context()?;
            negotiate::run(
                ctx,
                negotiate::NegotiateOptions {
                    name_a,
                    name_b,
                    briefing_a,
                    briefing_b,
                    rounds,
                    out,
                },
            )
            .await?;
        }
    }

    Ok(())
}

/// Logs go to stderr
fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }
}
