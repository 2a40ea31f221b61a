//! # gh-shorthand CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gh-shorthand complete "<input>"` | Script-filter JSON for the launcher |
//! | `gh-shorthand parse "<input>"` | Print the parsed shorthand as JSON |
//! | `gh-shorthand serve` | Run the cache & coalescing service |
//!
//! ## Examples
//!
//! ```bash
//! # open mode: repo shorthand plus issue number
//! gh-shorthand complete " df 123"
//!
//! # search issues in a repo
//! gh-shorthand complete "idf crash on start"
//!
//! # start the service the completion client talks to
//! gh-shorthand serve --config ~/.config/gh-shorthand.toml
//! ```

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use gh_shorthand::alfred::{Item, Response};
use gh_shorthand::completion;
use gh_shorthand::config::{self, Config};
use gh_shorthand::continuation::ContinuationState;
use gh_shorthand::parser::{parse, ParseFlags};
use gh_shorthand::rpc_client::{FetchClient, RpcClient};
use gh_shorthand::server;

/// GitHub shorthand expansion for launchers, with live enrichment.
#[derive(Parser)]
#[command(name = "gh-shorthand", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(
        long,
        global = true,
        env = "GH_SHORTHAND_CONFIG",
        default_value = "./config/gh-shorthand.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce launcher items for the input.
    ///
    /// The first character selects the mode (' ' open, i issues, n new
    /// issue, p projects, s search). Continuation state from a previous
    /// run is read from the `query`, `s` and `ns` environment variables.
    Complete {
        input: String,

        #[arg(long, env = "query", hide = true)]
        continuation_query: Option<String>,

        #[arg(long, env = "s", hide = true)]
        continuation_secs: Option<String>,

        #[arg(long, env = "ns", hide = true)]
        continuation_nanos: Option<String>,
    },

    /// Parse shorthand and print the result as JSON.
    Parse {
        input: String,

        /// Match an owner/name or shorthand at the start.
        #[arg(long)]
        repo: bool,

        /// Fail unless a full owner/name is established.
        #[arg(long)]
        require_repo: bool,

        /// Accept an unknown bare word as an owner.
        #[arg(long)]
        bare_user: bool,

        /// Match a trailing issue number.
        #[arg(long)]
        issue: bool,

        /// Match a trailing path.
        #[arg(long)]
        path: bool,

        /// Capture remaining text as a query.
        #[arg(long)]
        query: bool,
    },

    /// Run the cache & coalescing service.
    Serve,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env("GH_SHORTHAND_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// A missing file is not an error for the launcher commands.
fn load_or_minimal(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Complete {
            input,
            continuation_query,
            continuation_secs,
            continuation_nanos,
        } => {
            init_tracing("warn");
            let response = match load_or_minimal(&cli.config) {
                Ok(cfg) => {
                    let client = match RpcClient::from_config(&cfg) {
                        Ok(client) => Some(client),
                        Err(e) => {
                            tracing::warn!(error = %e, "enrichment disabled");
                            None
                        }
                    };
                    let previous = ContinuationState::from_vars(
                        continuation_query.as_deref(),
                        continuation_secs.as_deref(),
                        continuation_nanos.as_deref(),
                    );
                    completion::complete(
                        &cfg,
                        &input,
                        client.as_ref().map(|c| c as &dyn FetchClient),
                        previous.as_ref(),
                        Utc::now(),
                    )
                }
                Err(e) => Response {
                    items: vec![Item::info("gh-shorthand configuration error", format!("{:#}", e))],
                    ..Response::default()
                },
            };
            println!("{}", response.to_json()?);
        }
        Commands::Parse {
            input,
            repo,
            require_repo,
            bare_user,
            issue,
            path,
            query,
        } => {
            init_tracing("warn");
            let cfg = load_or_minimal(&cli.config)?;
            let flags = ParseFlags {
                match_repo: repo || require_repo,
                require_repo,
                bare_user,
                match_issue: issue,
                match_path: path,
                match_query: query,
            };
            let result = parse(
                &cfg.repos,
                &cfg.users,
                cfg.default_repo.as_deref(),
                &input,
                flags,
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Serve => {
            init_tracing("info,tower_http=debug");
            let cfg = config::load_config(&cli.config)?;
            tokio::runtime::Runtime::new()
                .context("Failed to start tokio runtime")?
                .block_on(server::run_server(&cfg))?;
        }
    }

    Ok(())
}
