//! Command-line surface: `lapp ingest`, `lapp templates`, `lapp query`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::labeler::LabelerConfig;
use crate::multiline::DetectorConfig;
use crate::pipeline;
use crate::store::{DuckDbStore, QueryOpts};

#[derive(Parser, Debug)]
#[command(name = "lapp", version, about = "Log Auto Pattern Pipeline", long_about = None)]
pub struct Cli {
    /// Path to the DuckDB database
    #[arg(long, global = true, default_value = "lapp.duckdb")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a log file: discover templates, label them, store entries
    Ingest {
        /// Log file to read
        logfile: PathBuf,

        /// LLM model for labeling (default: $MODEL_NAME or the built-in)
        #[arg(long)]
        model: Option<String>,

        /// Regex overriding timestamp detection for entry boundaries
        #[arg(long)]
        first_line_regex: Option<String>,
    },

    /// List discovered templates with their counts
    Templates,

    /// Query stored entries by semantic pattern id
    Query {
        /// Semantic id to filter by
        #[arg(long)]
        pattern: String,

        /// Only entries ingested at or after this RFC 3339 timestamp
        #[arg(long)]
        from: Option<chrono::DateTime<chrono::Utc>>,

        /// Only entries ingested at or before this RFC 3339 timestamp
        #[arg(long)]
        to: Option<chrono::DateTime<chrono::Utc>>,

        /// Maximum number of entries to print
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Parse arguments, initialise tracing, and dispatch the subcommand.
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ingest {
            logfile,
            model,
            first_line_regex,
        } => ingest(&cli.db, &logfile, model, first_line_regex).await,
        Command::Templates => templates(&cli.db),
        Command::Query {
            pattern,
            from,
            to,
            limit,
        } => query(
            &cli.db,
            QueryOpts {
                pattern: Some(pattern),
                from,
                to,
                limit,
            },
        ),
    }
}

async fn ingest(
    db: &PathBuf,
    logfile: &PathBuf,
    model: Option<String>,
    first_line_regex: Option<String>,
) -> anyhow::Result<()> {
    let api_key = std::env::var("OPENROUTER_API_KEY")
        .context("OPENROUTER_API_KEY environment variable is required")?;

    let labeler_config = LabelerConfig {
        model,
        ..LabelerConfig::new(api_key)
    };
    let detector_config = DetectorConfig {
        first_line_regex,
        ..DetectorConfig::default()
    };

    let mut store = DuckDbStore::open(db)?;

    // Ctrl-C cancels the run cooperatively; nothing is committed.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received SIGINT, cancelling ingest");
            signal_cancel.cancel();
        }
    });

    let report = pipeline::run_ingest(
        logfile,
        &mut store,
        &labeler_config,
        detector_config,
        cancel,
    )
    .await?;

    eprintln!(
        "Ingested {} entries, discovered {} patterns ({} with 2+ matches)",
        report.entries, report.templates_total, report.templates_labeled
    );
    eprintln!("Database: {}", db.display());
    Ok(())
}

fn templates(db: &PathBuf) -> anyhow::Result<()> {
    let store = DuckDbStore::open(db)?;
    store.init()?;

    let summaries = store.pattern_summaries()?;
    let has_labels = summaries.iter().any(|s| !s.semantic_id.is_empty());

    if has_labels {
        println!(
            "{:<38} {:<6} {:<22} {:<6} DESCRIPTION",
            "ID", "TYPE", "SEMANTIC_ID", "COUNT"
        );
        for s in &summaries {
            let semantic_id = if s.semantic_id.is_empty() {
                "-"
            } else {
                s.semantic_id.as_str()
            };
            let description = if s.description.is_empty() {
                "(not labeled)"
            } else {
                s.description.as_str()
            };
            println!(
                "{:<38} {:<6} {:<22} {:<6} {}",
                s.pattern_id, s.pattern_type, semantic_id, s.count, description
            );
        }
    } else {
        println!("{:<38} {:<6} {:<6} PATTERN", "ID", "TYPE", "COUNT");
        for s in &summaries {
            println!(
                "{:<38} {:<6} {:<6} {}",
                s.pattern_id, s.pattern_type, s.count, s.pattern
            );
        }
    }
    Ok(())
}

fn query(db: &PathBuf, opts: QueryOpts) -> anyhow::Result<()> {
    let store = DuckDbStore::open(db)?;

    let pattern = opts.pattern.clone().unwrap_or_default();
    let entries = store.query_logs(&opts)?;

    for e in &entries {
        println!("[{pattern}] {}", e.raw);
    }
    eprintln!("\n{} entries found", entries.len());
    Ok(())
}
