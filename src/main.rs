//! # Auto-Engineer CLI (`aeng`)
//!
//! The `aeng` binary drives the improvement pipeline: corpus management,
//! retrieval queries, sandboxed command execution, project analysis,
//! improvement cycles, and metrics inspection.
//!
//! ## Usage
//!
//! ```bash
//! aeng --config ./config/aeng.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `aeng cycle "<query>"` | Run one or more improvement cycles |
//! | `aeng docs add` | Add a document to the retrieval corpus |
//! | `aeng docs search "<query>"` | Query the corpus and print an answer |
//! | `aeng analyze <path>` | Heuristic analysis of a project tree |
//! | `aeng sandbox <cmd>...` | Run a command in a sandbox copy of the project |
//! | `aeng metrics` | Print the metrics summary |
//!
//! ## Examples
//!
//! ```bash
//! # Seed the corpus
//! aeng docs add --title "Git" --text "version control basics" --source manual
//!
//! # Report-only cycle (no target file)
//! aeng cycle "error handling"
//!
//! # Full cycle against a target, applying above-threshold suggestions
//! aeng cycle "error handling" --file src/handler.py
//!
//! # Force-apply regardless of confidence
//! aeng cycle "error handling" --file src/handler.py --auto-apply
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use auto_engineer::analyze::analyze_project;
use auto_engineer::config::{self, Config};
use auto_engineer::cycle::{run_cycles, CycleOptions};
use auto_engineer::index::{build_index, retrieve, synthesize_answer};
use auto_engineer::metrics::{summary, JsonMetricsStore};
use auto_engineer::sandbox::run_in_sandbox;
use auto_engineer::store::{add_document, DocumentStore, JsonDocumentStore};
use auto_engineer::suggest::build_providers;

/// Auto-Engineer CLI: an automated, sandboxed code-improvement pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Commands other than `cycle` fall back to built-in defaults when the
/// file is absent.
#[derive(Parser)]
#[command(
    name = "aeng",
    about = "Auto-Engineer: an automated, sandboxed code-improvement pipeline",
    version,
    long_about = "Auto-Engineer retrieves relevant context documents, generates a candidate \
    patch for a target file, validates the project in an isolated sandbox, checkpoints the \
    working tree under git, conditionally applies the patch, and records outcome metrics."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/aeng.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run improvement cycles.
    ///
    /// Each cycle retrieves context for the query, suggests a patch for the
    /// target file (when given), validates the project in a sandbox, and
    /// conditionally applies and commits the patch. The process exit code
    /// reflects the final cycle's success.
    Cycle {
        /// Free-text query for context retrieval.
        query: String,

        /// Target file for the patch, relative to the project root.
        /// Omitting it makes the cycle report-only.
        #[arg(long)]
        file: Option<String>,

        /// Apply the suggested patch regardless of confidence.
        #[arg(long)]
        auto_apply: bool,

        /// Number of sequential cycles to run.
        #[arg(long, default_value_t = 1)]
        cycles: usize,
    },

    /// Manage the retrieval corpus.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Heuristic analysis of a project tree.
    ///
    /// Walks the project, inspects source files, and reports the
    /// improvement suggestions per file. Read-only.
    Analyze {
        /// Project directory to analyze.
        path: PathBuf,

        /// Maximum number of source files to inspect.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Run a command in a sandbox copy of the project root.
    ///
    /// The command executes against a disposable copy of the tree; the
    /// original is never touched. Exit code mirrors the sandboxed outcome.
    Sandbox {
        /// Command and arguments to run.
        #[arg(required = true, trailing_var_arg = true)]
        cmd: Vec<String>,

        /// Wall-clock limit in seconds (overrides config).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print the metrics summary.
    Metrics,
}

/// Corpus management subcommands.
#[derive(Subcommand)]
enum DocsAction {
    /// Add a document to the corpus.
    ///
    /// The document id is derived from the content, so adding identical
    /// content twice is a no-op.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "manual")]
        source: String,
    },

    /// Search the corpus and print a synthesized answer.
    Search {
        /// The search query string.
        query: String,

        /// Number of documents to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // A missing config file is tolerated except for `cycle`, which mutates
    // the configured project tree and must never run against defaults by
    // accident. An invalid file is an error everywhere.
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else if matches!(cli.command, Commands::Cycle { .. }) {
        anyhow::bail!("config file not found: {}", cli.config.display());
    } else {
        Config::minimal()
    };

    match cli.command {
        Commands::Cycle {
            query,
            file,
            auto_apply,
            cycles,
        } => {
            let docs = JsonDocumentStore::new(&cfg.stores.docs_path);
            let metrics = JsonMetricsStore::new(&cfg.stores.metrics_path);
            let providers = build_providers(&cfg.suggest);
            let opts = CycleOptions {
                query,
                target_file: file,
                auto_apply,
            };

            let report = run_cycles(&cfg, &docs, &metrics, &providers, &opts, cycles).await?;
            if !report.success {
                std::process::exit(1);
            }
        }
        Commands::Docs { action } => match action {
            DocsAction::Add {
                title,
                text,
                source,
            } => {
                let store = JsonDocumentStore::new(&cfg.stores.docs_path);
                let doc = add_document(&store, &title, &text, &source)?;
                println!("added document: {} (id: {})", doc.title, doc.id);
            }
            DocsAction::Search { query, top_k } => {
                let store = JsonDocumentStore::new(&cfg.stores.docs_path);
                let corpus = store.load()?;
                let index = build_index(&corpus, cfg.retrieval.dim);
                let results = retrieve(&query, &index, top_k.unwrap_or(cfg.retrieval.top_k));
                println!("{}", synthesize_answer(&query, &results));
            }
        },
        Commands::Analyze { path, limit } => {
            let analysis = analyze_project(&path, limit).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Sandbox { cmd, timeout } => {
            let secs = timeout.unwrap_or(cfg.sandbox.timeout_secs);
            let outcome =
                run_in_sandbox(&cfg.project.root, &cmd, Duration::from_secs(secs)).await?;
            println!("{}", outcome.output);
            println!("status: {}", if outcome.success { "ok" } else { "failed" });
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Commands::Metrics => {
            let store = JsonMetricsStore::new(&cfg.stores.metrics_path);
            println!("{}", serde_json::to_string_pretty(&summary(&store)?)?);
        }
    }

    Ok(())
}
