use std::path::PathBuf;

use clap::Parser;
use sift_core::error::SiftError;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "sift",
    version,
    about = "Collect, triage, and summarize research papers"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Path to the configuration file
    #[arg(long, global = true, env = "SIFT_CONFIG", default_value = "sift.toml")]
    config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a process exit code.
///
/// Exit codes:
///   0  success (including runs where individual papers failed)
///   1  general/unknown error
///   2  configuration error
///   4  database error
///   6  provider error
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(sift) = err.chain().find_map(|e| e.downcast_ref::<SiftError>()) {
        return match sift {
            SiftError::Config(_) => 2,
            SiftError::Store(_) => 4,
            SiftError::Provider(_) => 6,
            SiftError::Ingest(_) => 1,
        };
    }

    let lower = format!("{err:#}").to_lowercase();
    if lower.contains("config") {
        2
    } else if lower.contains("database") || lower.contains("sqlite") {
        4
    } else if lower.contains("provider") || lower.contains("api key") {
        6
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    let global = commands::Global {
        config: cli.config,
        quiet: cli.quiet,
    };
    match runtime.block_on(commands::run(cli.command, &global)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
