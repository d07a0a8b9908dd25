use clap::Args;

use sift_core::pipeline::Selection;

use super::Global;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Re-summarize the most recent papers even if already summarized
    #[arg(long)]
    pub force: bool,
}

pub async fn run(args: RunArgs, global: &Global) -> anyhow::Result<()> {
    let config = super::load_config(global)?;
    let store = super::open_store(&config)?;

    let ingested = super::collect::collect(&config, &store).await?;
    if !global.quiet {
        super::collect::print_ingest(&ingested);
        println!();
    }

    let stats = super::summarize::summarize(
        &config,
        &store,
        &Selection::Auto,
        args.force,
        global.quiet,
    )
    .await?;
    if !global.quiet {
        super::summarize::print_run(&stats, false);
    }
    Ok(())
}
