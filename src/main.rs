//! # Repo Reader CLI (`repo-reader`)
//!
//! Fetches a repository's issues and comments, exports them for the analytics
//! service, and serves the dashboard.
//!
//! ## Usage
//!
//! ```bash
//! repo-reader --config ./config/repo-reader.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repo-reader check` | Show configuration, secrets and export status |
//! | `repo-reader sync` | Run one refresh and print its report |
//! | `repo-reader query "<sql>"` | Send SQL to the analytics service |
//! | `repo-reader search "<text>"` | Similarity search over comments |
//! | `repo-reader serve` | Start the periodic refresh and the dashboard |
//!
//! Secrets are read from the environment (a `.env` file in the working
//! directory is loaded first): `GITHUB_API_KEY`, `MINDSDB_SQL_API`,
//! `MINDSDB_API_KEY`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use repo_reader::analytics::AnalyticsClient;
use repo_reader::check::run_check;
use repo_reader::config::{self, Config, Secrets};
use repo_reader::pipeline::{Pipeline, RefreshTrigger};
use repo_reader::search::{semantic_search, RESULT_COLUMNS};
use repo_reader::server;
use repo_reader::sql::Statement;
use repo_reader::traits::QueryBackend;

/// Repo Reader: GitHub issue analytics with a periodic refresh and a dashboard.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/repo-reader.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "repo-reader",
    about = "Export GitHub issue discussions to a SQL analytics service and chart them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/repo-reader.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and secrets and show the export file status.
    Check,

    /// Run one refresh: fetch, export, and redefine the analytics table.
    Sync,

    /// Send a SQL statement to the analytics service and print the rows as JSON.
    Query {
        /// The statement, sent as written.
        sql: String,
    },

    /// Find comments similar to a piece of text.
    Search {
        /// Free text to search for.
        text: String,
    },

    /// Start the refresher, the periodic trigger and the dashboard server.
    Serve,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn secrets(cfg: &Config) -> anyhow::Result<Secrets> {
    Secrets::from_env(cfg).context("Secrets are not configured")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Check => {
            run_check(&cfg).await?;
        }
        Commands::Sync => {
            let pipeline = Pipeline::from_config(&cfg, &secrets(&cfg)?)?;
            let report = pipeline.run(RefreshTrigger::OnDemand).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_completed() {
                anyhow::bail!("refresh did not complete: {:?}", report.status);
            }
        }
        Commands::Query { sql } => {
            let client = AnalyticsClient::new(&cfg.analytics, &secrets(&cfg)?)?;
            let table = client.run(&Statement::new(sql)).await?;
            println!("{}", serde_json::to_string_pretty(&table.rows)?);
        }
        Commands::Search { text } => {
            let client = AnalyticsClient::new(&cfg.analytics, &secrets(&cfg)?)?;
            let table = semantic_search(&client, &cfg.analytics, &text).await?;
            if table.is_empty() {
                println!("No results.");
            }
            for (i, row) in table.rows.iter().enumerate() {
                let field = |name: &str| match row.get(name) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(v) => v.to_string(),
                    None => String::new(),
                };
                println!(
                    "{}. [{}] {}\n   {}",
                    i + 1,
                    field(RESULT_COLUMNS[2]),
                    field(RESULT_COLUMNS[0]),
                    field(RESULT_COLUMNS[1])
                );
            }
        }
        Commands::Serve => {
            server::run_server(&cfg, &secrets(&cfg)?).await?;
        }
    }

    Ok(())
}
