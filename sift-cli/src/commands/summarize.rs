use anyhow::Context;
use clap::Args;

use sift_core::config::SiftConfig;
use sift_core::pipeline::{RunStats, Selection, SiftPipeline};
use sift_core::progress::IndicatifReporter;
use sift_core::store::PaperStore;
use sift_core::types::PaperId;

use super::Global;

#[derive(Args, Debug)]
pub struct SummarizeArgs {
    /// Paper IDs to process (default: pending papers up to the batch size)
    pub ids: Vec<i64>,

    /// Re-summarize papers that already have a summary
    #[arg(long)]
    pub force: bool,

    /// Print run statistics as JSON
    #[arg(long)]
    pub json: bool,
}

impl SummarizeArgs {
    pub fn selection(&self) -> Selection {
        if self.ids.is_empty() {
            Selection::Auto
        } else {
            Selection::Ids(self.ids.iter().copied().map(PaperId).collect())
        }
    }
}

/// Build the pipeline from `config` and run it over `selection`.
pub async fn summarize(
    config: &SiftConfig,
    store: &dyn PaperStore,
    selection: &Selection,
    force: bool,
    quiet: bool,
) -> anyhow::Result<RunStats> {
    let pipeline = SiftPipeline::from_config(config).context("Cannot set up providers")?;
    let progress = if quiet {
        IndicatifReporter::hidden()
    } else {
        IndicatifReporter::new()
    };
    pipeline
        .run(store, selection, force, &progress)
        .await
        .context("Cannot select papers")
}

pub fn print_run(stats: &RunStats, explicit: bool) {
    for id in &stats.missing {
        println!("Paper {id} not found");
    }
    if stats.selected == 0 {
        if explicit {
            println!("No matching papers to summarize.");
        } else {
            println!("No papers need summaries.");
        }
        return;
    }

    println!("Pipeline summary");
    println!("  Papers selected:        {}", stats.selected);
    if stats.already_done > 0 {
        println!("  Already summarized:     {}", stats.already_done);
    }
    println!("  Papers triaged:         {}", stats.triaged);
    if stats.triage_failures > 0 {
        println!("  Triage failures:        {}", stats.triage_failures);
    }
    println!("  Skipped (not relevant): {}", stats.skipped_irrelevant);
    println!("  Summarized:             {}", stats.summarized);
    let failures = stats.summary_failures + stats.store_failures;
    if failures > 0 {
        println!("  Failed:                 {failures}");
    }
    if let Some(rate) = stats.pass_rate() {
        println!("  Pass rate:              {rate:.1}%");
    }
    println!("  Triage tokens used:     {}", stats.triage_tokens);
    println!("  Summary tokens used:    {}", stats.summary_tokens);
    if stats.summarized > 0 {
        println!("  Estimated cost:         ${:.2}", stats.estimated_cost_usd);
    }
    println!("  Duration:               {:.2?}", stats.duration);
}

pub fn print_json(stats: &RunStats) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(stats).context("Cannot serialize run stats")?;
    println!("{text}");
    Ok(())
}

pub async fn run(args: SummarizeArgs, global: &Global) -> anyhow::Result<()> {
    let config = super::load_config(global)?;
    let store = super::open_store(&config)?;

    let selection = args.selection();
    let stats = summarize(&config, &store, &selection, args.force, global.quiet || args.json).await?;

    if args.json {
        print_json(&stats)?;
    } else if !global.quiet {
        print_run(&stats, !args.ids.is_empty());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_from_ids() {
        let args = SummarizeArgs {
            ids: vec![3, 1],
            force: false,
            json: false,
        };
        assert_eq!(args.selection(), Selection::Ids(vec![PaperId(3), PaperId(1)]));

        let auto = SummarizeArgs {
            ids: Vec::new(),
            force: true,
            json: false,
        };
        assert_eq!(auto.selection(), Selection::Auto);
    }
}
