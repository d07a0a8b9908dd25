use anyhow::Context;
use clap::Args;

use sift_core::store::PaperStore;
use sift_core::types::{Paper, SummaryState};

use super::Global;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Number of recent papers to list
    #[arg(long, default_value_t = 5)]
    pub recent: u32,
}

pub async fn run(args: StatusArgs, global: &Global) -> anyhow::Result<()> {
    let config = super::load_config(global)?;
    let db_path = &config.store.path;
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found: {}. Run `sift init` first.",
            db_path.display()
        );
    }

    let store = super::open_store(&config)?;
    let stats = store.stats().await.context("Failed to read store stats")?;

    println!("Sift status");
    println!();
    println!("  Database: {}", db_path.display());
    if stats.db_size_bytes > 0 {
        println!("  Size:     {}", format_bytes(stats.db_size_bytes));
    }
    println!("  Provider: {} ({})", config.provider.mode.as_str(), config.provider.active().model);
    println!();

    println!("  Papers:     {} total", stats.total_papers);
    println!("    summarized {:>6}", stats.summarized);
    println!("    skipped    {:>6}", stats.skipped);
    println!("    pending    {:>6}", stats.pending);
    println!("    scored     {:>6}", stats.scored);

    if args.recent > 0 {
        let recent = store
            .recent_papers(args.recent)
            .await
            .context("Failed to read recent papers")?;
        if !recent.is_empty() {
            println!();
            println!("  Recent:");
            for paper in &recent {
                println!("    {}", recent_line(paper));
            }
        }
    }

    Ok(())
}

fn recent_line(paper: &Paper) -> String {
    let state = match paper.summary_state() {
        SummaryState::Missing => "pending",
        SummaryState::Skipped => "skipped",
        SummaryState::Genuine => "done",
    };
    let score = if paper.excitement_score.is_scored() {
        format!("{:>2}/10", paper.excitement_score.value())
    } else {
        "  -  ".to_string()
    };
    format!("{:>5}  {state:<7} {score}  {}", paper.id.0, paper.title)
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
