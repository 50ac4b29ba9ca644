//! Redliner command line

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};

use redliner::core::config::EngineConfig;
use redliner::core::file_system::{self, LoadedDocument};
use redliner::planner::load_source;
use redliner::redline::{FirmDetails, RedlineSession, SessionOutcome, SignatureImage};

#[derive(Parser)]
#[command(name = "redliner", version, about = "Apply requested modifications to documents as tracked changes")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging: -v for debug, -vv for trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Redline one document
    Apply {
        /// Input document (.docx or .json)
        #[arg(short, long)]
        input: PathBuf,

        /// Planner output: JSON modifications
        #[arg(short, long)]
        modifications: PathBuf,

        /// Firm details JSON used to fill signature blocks
        #[arg(long)]
        firm: Option<PathBuf>,

        /// Signature image to place at the signing line
        #[arg(long)]
        signature: Option<PathBuf>,

        /// Output path (defaults to a timestamped file in the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the plain text a planner works from
    Extract {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Redline every document under a directory
    Batch {
        #[arg(short, long)]
        dir: PathBuf,

        #[arg(short, long)]
        modifications: PathBuf,

        #[arg(long)]
        firm: Option<PathBuf>,

        #[arg(long)]
        signature: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(level)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    }
}

fn build_session(config: EngineConfig, firm: Option<&Path>, signature: Option<&Path>) -> Result<RedlineSession> {
    let width = config.signature_width_emu;
    let mut session = RedlineSession::new(config);
    if let Some(path) = firm {
        session = session.with_firm(FirmDetails::load(path)?);
    }
    if let Some(path) = signature {
        session = session.with_signature(SignatureImage::from_file(path, width)?);
    }
    Ok(session)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Apply {
            input,
            modifications,
            firm,
            signature,
            output,
        } => {
            let session = build_session(config, firm.as_deref(), signature.as_deref())?;
            let mut source = load_source(&modifications)?;
            let outcome = session.run_file(&input, source.as_mut(), output.as_deref())?;
            tracing::info!(
                "Applied {} of {} modifications, saved to {}",
                outcome.report.applied,
                outcome.report.submitted(),
                outcome.output.display()
            );
            print_json(&outcome)
        }
        Command::Extract { input } => {
            let loaded = LoadedDocument::open(&input)
                .with_context(|| format!("Failed to open document: {}", input.display()))?;
            println!("{}", loaded.document.plain_text());
            Ok(())
        }
        Command::Batch {
            dir,
            modifications,
            firm,
            signature,
        } => {
            let session = build_session(config, firm.as_deref(), signature.as_deref())?;
            let mut source = load_source(&modifications)?;
            let documents = file_system::find_documents(&dir);
            tracing::info!("Found {} documents under {}", documents.len(), dir.display());

            let mut outcomes: Vec<SessionOutcome> = Vec::new();
            for input in &documents {
                match session.run_file(input, source.as_mut(), None) {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => tracing::warn!("Skipping {}: {:#}", input.display(), e),
                }
            }

            tracing::info!("Processed {} of {} documents", outcomes.len(), documents.len());
            print_json(&outcomes)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}
