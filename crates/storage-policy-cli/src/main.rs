//! storage-policy - apply the object-storage row-level security policy set
//!
//! Connects to the database, (re)installs the helper functions and the
//! twelve bucket policies, then lists what the catalog holds.
//!
//! # Configuration
//!
//! Connection settings are resolved in order:
//!
//! 1. CLI arguments (highest priority)
//! 2. `DATABASE_URL`, when set, replaces the discrete fields
//! 3. Environment variables (`POLICY_DB_*`)
//! 4. Default values (local development database)
//!
//! # Output
//!
//! The operator report goes to stdout; logs go to stderr and are filtered
//! with `RUST_LOG` (default `info`).
//!
//! # Exit Status
//!
//! `0` when the plan was applied, even if some statements were rejected;
//! `1` when the database could not be reached or the configuration is
//! unusable.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use storage_policy_engine::{ConsoleReporter, Orchestrator, PgConnector, SslMode, StoreConfig};
use storage_policy_model::ObjectNamespace;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Apply and verify the object-storage row-level security policies
#[derive(Parser, Debug)]
#[command(name = "storage-policy")]
#[command(version, about, long_about = None)]
struct Args {
    /// Database host (also: POLICY_DB_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Database port (also: POLICY_DB_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Database name (also: POLICY_DB_NAME)
    #[arg(long)]
    database: Option<String>,

    /// Role to connect as (also: POLICY_DB_USER)
    #[arg(short, long)]
    user: Option<String>,

    /// Password for the role
    #[arg(long, env = "POLICY_DB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// TLS mode: disable, prefer, require, verify-ca, verify-full (also: POLICY_DB_SSLMODE)
    #[arg(long, value_name = "MODE")]
    sslmode: Option<SslMode>,

    /// Full connection string; overrides host, port, database, user and password
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Connect timeout in seconds (also: POLICY_DB_CONNECT_TIMEOUT_SECS)
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// First path segment that marks an owned object
    #[arg(long, default_value = "pets")]
    collection_tag: String,

    /// Print the numbered statement plan and exit without connecting
    #[arg(long)]
    dry_run: bool,

    /// Also print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Layer CLI overrides over the environment configuration.
    fn store_config(&self, mut config: StoreConfig) -> StoreConfig {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(mode) = self.sslmode {
            config.ssl_mode = mode;
        }
        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        config
    }

    fn namespace(&self) -> ObjectNamespace {
        ObjectNamespace {
            collection_tag: self.collection_tag.clone(),
            ..Default::default()
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug,sqlx=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.store_config(StoreConfig::from_env());
    let orchestrator = Orchestrator::new(PgConnector, config)
        .with_namespace(args.namespace())
        .context("Invalid namespace")?;

    if args.dry_run {
        orchestrator.dry_run(&ConsoleReporter);
        return Ok(ExitCode::SUCCESS);
    }

    let report = orchestrator.run(&ConsoleReporter).await;
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        println!("{}", json);
    }

    info!(run_id = %report.run_id, exit_code = report.exit_code(), "Done");
    Ok(if report.exit_code() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
