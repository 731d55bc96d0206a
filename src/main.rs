//! # Onboard Harness CLI (`onboard`)
//!
//! The `onboard` binary runs the onboarding assistant against a local
//! knowledge base.
//!
//! ## Usage
//!
//! ```bash
//! onboard --config ./config/onboard.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `onboard chat` | Interactive session with the assistant |
//! | `onboard ask "<question>"` | Answer one question and exit |
//! | `onboard search "<query>"` | Show the chunks retrieval would return |
//! | `onboard index` | Build the vector index and report its size |
//! | `onboard sources` | List loaded documents |
//! | `onboard tools` | List tools offered to the model |
//!
//! Logs go to stderr; set `RUST_LOG=onboard_harness=debug` for detail.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use onboard_harness::app::App;
use onboard_harness::config::{self, Config};
use onboard_harness::{chat, search, sources};

const DEFAULT_CONFIG: &str = "./config/onboard.toml";

/// Onboard Harness: answers developer-onboarding questions from a local
/// knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/onboard.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "onboard",
    about = "Onboard Harness: a retrieval-augmented onboarding assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// If the default path does not exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    ///
    /// Type a quit token (`exit` or `quit` by default) to leave.
    Chat {
        /// Conversation thread id. A fresh one is generated if omitted.
        #[arg(long)]
        thread: Option<String>,

        /// Build the index before the first question instead of on demand.
        #[arg(long)]
        warm: bool,
    },

    /// Ask a single question.
    Ask {
        question: String,

        #[arg(long)]
        thread: Option<String>,
    },

    /// Search the knowledge base without involving the chat model.
    Search {
        query: String,

        /// Number of chunks to return (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Build the vector index now.
    Index,

    /// List loaded documents and their chunk counts.
    Sources,

    /// List registered tools.
    Tools,
}

fn load(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        tracing::debug!("no config file at {}, using defaults", path.display());
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;
    let app = App::from_config(cfg)?;

    match cli.command {
        Commands::Chat { thread, warm } => {
            let thread = thread.unwrap_or_else(new_thread_id);
            chat::run_chat(&app, &thread, warm).await?;
        }
        Commands::Ask { question, thread } => {
            let thread = thread.unwrap_or_else(new_thread_id);
            chat::run_ask(&app, &thread, &question).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&app, &query, k).await?;
        }
        Commands::Index => {
            sources::run_index(&app).await?;
        }
        Commands::Sources => {
            sources::list_sources(&app)?;
        }
        Commands::Tools => {
            sources::list_tools(&app)?;
        }
    }

    Ok(())
}
