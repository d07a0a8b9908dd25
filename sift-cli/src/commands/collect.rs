use anyhow::Context;
use chrono::Utc;
use clap::Args;

use sift_core::config::SiftConfig;
use sift_core::feed::{HuggingFaceFeed, PaperFeed};
use sift_core::ingest::{IngestStats, ingest};
use sift_core::store::PaperStore;

use super::Global;

#[derive(Args, Debug)]
pub struct CollectArgs {}

/// Fetch from the configured feed and ingest into `store`.
pub async fn collect(config: &SiftConfig, store: &dyn PaperStore) -> anyhow::Result<IngestStats> {
    let feed = HuggingFaceFeed::from_config(&config.feed).context("Cannot build feed client")?;
    let candidates = feed.fetch().await;
    if candidates.is_empty() {
        return Ok(IngestStats::default());
    }
    Ok(ingest(store, &candidates, &config.feed.category, Utc::now()).await)
}

pub fn print_ingest(stats: &IngestStats) {
    if stats.seen() == 0 {
        println!("No papers found.");
        return;
    }
    println!("Collection complete");
    println!("  New papers added:   {}", stats.added);
    println!("  Duplicates skipped: {}", stats.skipped);
    if stats.failed > 0 {
        println!("  Failed:             {}", stats.failed);
    }
}

pub async fn run(_args: CollectArgs, global: &Global) -> anyhow::Result<()> {
    let config = super::load_config(global)?;
    let store = super::open_store(&config)?;

    let stats = collect(&config, &store).await?;
    if !global.quiet {
        print_ingest(&stats);
    }
    Ok(())
}
