//! # Skill Index CLI (`skix`)
//!
//! The `skix` binary indexes a topic-partitioned reference corpus and
//! answers queries against it.
//!
//! ## Usage
//!
//! ```bash
//! skix --config ./config/skix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `skix index [PATH...]` | Reindex the corpus, or only the given paths |
//! | `skix search "<query>"` | Retrieve passages, shaped by confidence |
//! | `skix explain "<query>"` | Print every pipeline stage as JSON |
//! | `skix context "<query>"` | Print an LLM-ready markdown block |
//! | `skix status` | Snapshot summary and per-topic counts |
//! | `skix clear` | Delete the persisted index |
//!
//! Set `SKIX_LOG=skill_index=debug` for diagnostics on stderr.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use skill_index::commands;
use skill_index::config;
use skill_index::engine::Engine;
use skill_index::logging;
use skill_index::progress::ProgressMode;

/// Skill Index: hybrid retrieval over topic-partitioned reference corpora.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/skix.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "skix",
    about = "Skill Index: hybrid retrieval over topic-partitioned reference corpora",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/skix.toml")]
    config: PathBuf,

    /// Emit log events as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressArg {
    fn mode(self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reindex the corpus.
    ///
    /// Only documents whose content changed are rechunked and re-embedded.
    /// With paths, documents outside them are carried over untouched.
    Index {
        /// Files or directories inside the corpus roots.
        paths: Vec<PathBuf>,

        /// Progress reporting on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressArg,

        /// Print the reindex report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve passages relevant to a query.
    Search {
        query: String,

        /// Maximum number of passages to return.
        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Print every intermediate stage of a query as JSON.
    Explain { query: String },

    /// Render results as a markdown context block.
    Context {
        query: String,

        /// Token budget for the rendered block.
        #[arg(long, default_value_t = 2000)]
        max_tokens: usize,
    },

    /// Show what is indexed.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Delete the persisted index.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_json);

    let cfg = config::load_config(&cli.config)?;
    let engine = Engine::open(cfg).await?;

    match cli.command {
        Commands::Index {
            paths,
            progress,
            json,
        } => {
            let mode = if json { ProgressMode::Off } else { progress.mode() };
            let engine = engine.with_progress(mode.reporter());
            commands::run_index(&engine, &paths, json).await?;
        }
        Commands::Search { query, top_k, json } => {
            commands::run_search(&engine, &query, top_k, json).await?;
        }
        Commands::Explain { query } => {
            commands::run_explain(&engine, &query).await?;
        }
        Commands::Context { query, max_tokens } => {
            commands::run_context(&engine, &query, max_tokens).await?;
        }
        Commands::Status { json } => {
            commands::run_status(&engine, json)?;
        }
        Commands::Clear => {
            commands::run_clear(&engine).await?;
        }
    }

    Ok(())
}
