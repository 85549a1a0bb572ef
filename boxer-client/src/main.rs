//! Entry point for the `boxerd` command-line tool.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use boxer_client::{BoxerClient, BoxerOp, BoxerRequest, ClientError};
use boxer_core::sample::SAMPLE_CONFIG;
use boxer_core::{BoxerConfig, CoreError};
use boxer_engine::{ProcessIo, VmCompose};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// boxerd - allocate and drive pooled hypervisor VMs
#[derive(Parser, Debug)]
#[command(name = "boxerd")]
#[command(about = "Allocate VMs from configured groups and run lifecycle commands on them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate a configuration, then print its groups
    Check {
        /// Path to the TOML configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print a sample configuration
    Sample,

    /// Allocate one VM from a group, run operations on it in order, then free it
    Run {
        /// Path to the TOML configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Group to allocate from
        #[arg(short, long)]
        group: String,

        /// Append hypervisor command output to this file instead of discarding it
        #[arg(long)]
        command_output: Option<PathBuf>,

        /// Operations to run, in order
        #[arg(required = true, value_enum)]
        ops: Vec<BoxerOp>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("cannot open command output {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode response: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting boxerd");

    let result = match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Sample => {
            print!("{SAMPLE_CONFIG}");
            Ok(())
        }
        Commands::Run { config, group, command_output, ops } => {
            run(&config, &group, command_output, &ops).await
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("boxerd=info,boxer_client=info,boxer_engine=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn check(path: &Path) -> Result<(), CliError> {
    let config = BoxerConfig::load(path)?;
    let pool = VmCompose::from_config(&config).map_err(ClientError::from)?;

    println!("{}: ok", path.display());
    for group in pool.group_names() {
        let size = pool.group_stats(&group).map_or(0, |stats| stats.size);
        println!("  group {group}: {size} VM(s)");
    }
    println!("  max concurrent allocations: {}", pool.max_operations());
    Ok(())
}

async fn run(
    path: &Path,
    group: &str,
    command_output: Option<PathBuf>,
    ops: &[BoxerOp],
) -> Result<(), CliError> {
    let config = BoxerConfig::load(path)?;
    let stdout = match command_output {
        Some(out) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&out)
                .map_err(|source| CliError::Output { path: out.clone(), source })?;
            ProcessIo::file(file)
        }
        None => ProcessIo::Null,
    };

    let client = BoxerClient::from_config(&config, ProcessIo::Null, stdout)?;
    let held = client.balloc(group)?;
    tracing::info!(group, machine = %held.machine, "box allocated");

    let mut outcome = Ok(());
    for &op in ops {
        match client.execute(&BoxerRequest::new(op, held.clone())).await {
            Ok(response) => println!("{}", serde_json::to_string(&response)?),
            Err(e) => {
                let failure = serde_json::json!({
                    "code": e.return_code(),
                    "op": op,
                    "error": e.to_string(),
                });
                println!("{failure}");
                outcome = Err(CliError::from(e));
                break;
            }
        }
    }

    client.bfree(&held)?;
    tracing::info!(group, machine = %held.machine, "box freed");
    outcome
}
