use anyhow::Context;
use clap::Args;

use sift_core::config::SiftConfig;

use super::Global;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

#[allow(clippy::unused_async)]
pub async fn run(args: InitArgs, global: &Global) -> anyhow::Result<()> {
    let path = &global.config;

    if path.exists() && !args.force {
        println!("Config already exists: {} (use --force to overwrite)", path.display());
    } else {
        let text = SiftConfig::default()
            .to_toml()
            .context("Cannot serialize default config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Cannot write config: {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    let config = super::load_config(global)?;
    super::open_store(&config)?;
    println!("Database ready: {}", config.store.path.display());
    println!();
    println!("Next: run `sift collect` to fetch papers, then `sift summarize`.");
    Ok(())
}
