use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hostbox::{
    config::LoggingConfig, AppState, Authenticator, Config, FileAuditSink, Server,
    SystemSessionRegistry,
};

#[derive(Parser)]
#[command(name = "hostbox")]
#[command(about = "HostBox - remote administration agent for a single host")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP agent (default)
    Serve,
    /// Print the key_sha256 value to configure for an API key
    HashKey { key: String },
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("hostbox=debug,tower_http=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::from_env().context("Failed to load configuration from environment")?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::HashKey { key }) = &cli.command {
        println!("{}", Authenticator::hash_key(key));
        return Ok(());
    }

    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config.logging, cli.verbose);

    info!("Starting HostBox v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Audit log: {} (verbose: {})",
        config.audit.log_destination.display(),
        config.audit.verbose
    );
    let audit_sink = FileAuditSink::open(&config.audit.log_destination)
        .context("Failed to open audit log")?;
    let state = AppState::new(
        config,
        Arc::new(audit_sink),
        Arc::new(SystemSessionRegistry::new()),
    )?;
    if state.authenticator.is_empty() {
        error!("No principals configured; every request will be rejected");
    }

    Server::new(state).run().await.map_err(|e| {
        error!("Server error: {}", e);
        e
    })?;

    Ok(())
}
