//! `tucker-syncd`: the sync server binary.
//!
//! Loads configuration, runs embedded migrations, and serves the protocol
//! described in `SPEC_FULL.md` until a shutdown signal arrives.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tucker_sync_server::config::Config;
use tucker_sync_server::db::Storage;
use tucker_sync_server::server;

/// Command-line overrides. The CLI only ever overrides bind address /
/// config file location — schema/config bootstrap tooling is an external
/// collaborator this core does not own (spec §1).
#[derive(Debug, Parser)]
#[command(name = "tucker-syncd", about = "Tucker Sync server")]
struct Cli {
    /// Path to an optional TOML config overlay.
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Override the configured bind address host:port.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::from_env_with_toml(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(bind) = cli.bind.as_deref() {
        match bind.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => {
                    config.server.bind_host = host.to_string();
                    config.server.bind_port = port;
                }
                Err(_) => {
                    eprintln!("--bind must be in host:port form, got {bind:?}");
                    return ExitCode::FAILURE;
                }
            },
            None => {
                eprintln!("--bind must be in host:port form, got {bind:?}");
                return ExitCode::FAILURE;
            }
        }
    }

    init_tracing(&config);

    let storage = match Storage::connect(&config.database).await {
        Ok(storage) => storage,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = server::serve(storage, Arc::new(config)).await {
        tracing::error!(error = %err, "server exited with error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.observability.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.observability.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
