pub mod collect;
pub mod init;
pub mod run;
pub mod status;
pub mod summarize;

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;

use sift_core::config::SiftConfig;
use sift_core::store::sqlite::SqliteStore;

/// Options shared by every command.
#[derive(Debug)]
pub struct Global {
    pub config: PathBuf,
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration file and create the database
    Init(init::InitArgs),
    /// Fetch candidate papers from the feed and store the new ones
    Collect(collect::CollectArgs),
    /// Triage and summarize pending (or the given) papers
    Summarize(summarize::SummarizeArgs),
    /// Collect, then summarize
    Run(run::RunArgs),
    /// Show counts and the most recent papers
    Status(status::StatusArgs),
}

pub async fn run(cmd: Command, global: &Global) -> anyhow::Result<()> {
    match cmd {
        Command::Init(args) => init::run(args, global).await,
        Command::Collect(args) => collect::run(args, global).await,
        Command::Summarize(args) => summarize::run(args, global).await,
        Command::Run(args) => run::run(args, global).await,
        Command::Status(args) => status::run(args, global).await,
    }
}

/// Load configuration from the global `--config` path plus environment overrides.
pub fn load_config(global: &Global) -> anyhow::Result<SiftConfig> {
    SiftConfig::load(&global.config)
        .with_context(|| format!("Cannot load config: {}", global.config.display()))
}

pub fn open_store(config: &SiftConfig) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&config.store.path)
        .with_context(|| format!("Cannot open database: {}", config.store.path.display()))
}
