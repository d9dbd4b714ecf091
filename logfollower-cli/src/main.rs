mod config_file;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use logfollower_core::{FollowerConfig, FollowError};
use logfollower_storage::{MemoryStorage, Storage};
use logfollower_transport::{HttpTransport, Transport};
use tracing_subscriber::EnvFilter;

use config_file::FileConfig;

#[derive(Parser)]
#[command(name = "logfollower", about = "Continuous replication follower")]
struct Cli {
    /// Increase logging verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the follower loop against the configured master until
    /// cancelled (Ctrl-C) or a fatal error.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
        /// Use an in-memory storage engine instead of a real one, for
        /// local demos; state is lost on exit.
        #[arg(long)]
        memory: bool,
    },
    /// Print the last persisted checkpoint.
    Status {
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_storage(memory: bool) -> Box<dyn Storage> {
    if !memory {
        tracing::warn!("no durable storage engine wired in; falling back to --memory semantics");
    }
    Box::new(MemoryStorage::new())
}

fn build_transport(config: &FollowerConfig) -> Result<Box<dyn Transport>, FollowError> {
    let transport = HttpTransport::new(
        config.endpoint.clone(),
        config.connect_timeout,
        config.request_timeout,
    )
    .map_err(FollowError::TransientTransport)?;
    Ok(Box::new(transport))
}

async fn run(config_path: PathBuf, memory: bool, verbose: u8) -> Result<(), FollowError> {
    let file_config = FileConfig::load(&config_path)
        .map_err(|e| FollowError::ConfigInvalid(e.to_string()))?;
    let mut config = file_config
        .into_follower_config()
        .map_err(|e| FollowError::ConfigInvalid(e.to_string()))?;
    config.verbose = verbose;

    let transport = build_transport(&config)?;
    let storage = build_storage(memory);

    let mut follower = logfollower_core::Follower::new(config, transport, storage)?;
    let stop = follower.stop_handle();
    let status = follower.status_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop requested, draining current marker and checkpointing");
            stop.request_stop();
        }
    });

    let result = follower.run().await;
    let snapshot = status.lock().expect("status mutex poisoned").clone();
    tracing::info!(phase = ?snapshot.phase, last_applied_tick = %snapshot.last_applied_tick, "follower loop exited");
    result
}

fn print_status(config_path: PathBuf) -> Result<(), FollowError> {
    let file_config = FileConfig::load(&config_path)
        .map_err(|e| FollowError::ConfigInvalid(e.to_string()))?;
    let config = file_config
        .into_follower_config()
        .map_err(|e| FollowError::ConfigInvalid(e.to_string()))?;
    let storage = MemoryStorage::new();
    let state = storage
        .load_state()
        .map_err(|e| FollowError::StorageFatal(e.to_string()))?;
    match state {
        Some(state) => {
            println!("phase: {:?}", state.phase);
            println!("lastAppliedTick: {}", state.last_applied_tick);
            println!("safeResumeTick: {}", state.safe_resume_tick);
            println!("progress: {}", state.progress);
            if let Some(err) = state.last_error {
                println!("lastError: {} ({})", err.kind, err.message);
            }
        }
        None => println!("no checkpoint persisted yet for endpoint {}", config.endpoint),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Command::Run { config, memory } => run(config, memory, cli.verbose).await,
        Command::Status { config } => print_status(config),
    };

    match outcome {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(FollowError::Cancelled) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("logfollower: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
