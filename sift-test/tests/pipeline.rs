use std::time::Duration;

use chrono::Utc;

use sift_core::feed::{PaperFeed, StaticFeed};
use sift_core::ingest::ingest;
use sift_core::llm::retry::{RetryPolicy, RetryingProvider};
use sift_core::pipeline::{Selection, SiftPipeline};
use sift_core::progress::NoopReporter;
use sift_core::store::PaperStore;
use sift_core::summarize::{DIGEST_MAX_CHARS, Summarizer};
use sift_core::triage::{TriageAttempt, Triager};
use sift_core::types::{ExcitementScore, SKIP_SENTINEL, SummaryState};
use sift_test::{
    CountingStore, KeywordClassifier, Reply, ScriptedProvider, reasoning_paper, seeded_store,
    summary_markdown, systems_paper,
};

fn keyword_triager() -> (Triager, sift_test::CallCount) {
    let classifier = KeywordClassifier::new("gemini-1.5-flash");
    let calls = classifier.calls();
    let fallback = ScriptedProvider::failing("gpt-4o-mini", 401);
    (Triager::new(Box::new(classifier), Box::new(fallback)), calls)
}

// ── End to end ──────────────────────────────────────────────────

#[tokio::test]
async fn relevant_paper_is_summarized() {
    let (store, ids) = seeded_store(&[reasoning_paper()]).await;
    let (triager, _) = keyword_triager();
    let summarizer = Summarizer::new(Box::new(ScriptedProvider::always(
        "gpt-4o",
        &summary_markdown("Reasoning traces make planners better.", 8),
    )));
    let pipeline = SiftPipeline::new(triager, summarizer);

    let stats = pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(stats.summarized, 1);
    assert_eq!(stats.skipped_irrelevant, 0);

    let paper = store.get_paper(ids[0]).await.unwrap().unwrap();
    assert_eq!(paper.summary_state(), SummaryState::Genuine);
    let summary = paper.summary_md.as_deref().unwrap();
    assert!(!summary.is_empty());
    assert_ne!(summary, SKIP_SENTINEL);
    let digest = paper.digest.as_deref().unwrap();
    assert_eq!(digest, "Reasoning traces make planners better.");
    assert!(digest.chars().count() <= DIGEST_MAX_CHARS);
    assert_eq!(paper.excitement_score.value(), 8);
    assert_eq!(
        paper.score_breakdown.to_string(),
        "Novelty:2, Impact:3, Results:1, Access:1"
    );
    assert!(paper.last_summarized_at.is_some());
}

#[tokio::test]
async fn irrelevant_paper_gets_skip_sentinel() {
    let (store, ids) = seeded_store(&[systems_paper()]).await;
    let (triager, _) = keyword_triager();
    let summary_provider = ScriptedProvider::always("gpt-4o", &summary_markdown("Unused.", 5));
    let summary_calls = summary_provider.calls();
    let pipeline = SiftPipeline::new(triager, Summarizer::new(Box::new(summary_provider)));

    let stats = pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(stats.skipped_irrelevant, 1);
    assert_eq!(summary_calls.get(), 0);

    let paper = store.get_paper(ids[0]).await.unwrap().unwrap();
    assert_eq!(paper.summary_md.as_deref(), Some(SKIP_SENTINEL));
    assert_eq!(
        paper.digest.as_deref(),
        Some("Primarily about systems, not reasoning.")
    );
    assert_eq!(paper.excitement_score, ExcitementScore::UNSCORED);
}

// ── Idempotence and dedup ───────────────────────────────────────

#[tokio::test]
async fn second_unforced_run_makes_no_provider_calls() {
    let (store, _) = seeded_store(&[reasoning_paper(), systems_paper()]).await;
    let (triager, triage_calls) = keyword_triager();
    let summary_provider = ScriptedProvider::always("gpt-4o", &summary_markdown("Done.", 6));
    let summary_calls = summary_provider.calls();
    let pipeline = SiftPipeline::new(triager, Summarizer::new(Box::new(summary_provider)));

    let first = pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(first.selected, 2);
    assert_eq!(triage_calls.get(), 2);
    assert_eq!(summary_calls.get(), 1);

    let second = pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(second.selected, 0);
    assert_eq!(triage_calls.get(), 2);
    assert_eq!(summary_calls.get(), 1);
    assert_eq!(store.stats().await.unwrap().pending, 0);
}

#[tokio::test]
async fn collecting_the_same_feed_twice_adds_nothing() {
    let store = sift_core::store::sqlite::SqliteStore::in_memory().unwrap();
    let feed = StaticFeed::new(vec![reasoning_paper(), systems_paper()]);

    let first = ingest(&store, &feed.fetch().await, "huggingface", Utc::now()).await;
    assert_eq!(first.added, 2);

    let second = ingest(&store, &feed.fetch().await, "huggingface", Utc::now()).await;
    assert_eq!(second.added, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(store.stats().await.unwrap().total_papers, 2);
}

// ── Triage fallback ─────────────────────────────────────────────

#[tokio::test]
async fn fallback_invoked_exactly_once_when_primary_fails() {
    let primary = ScriptedProvider::failing("gemini-1.5-flash", 500);
    let primary_calls = primary.calls();
    let fallback = KeywordClassifier::new("gpt-4o-mini");
    let fallback_calls = fallback.calls();
    let triager = Triager::new(Box::new(primary), Box::new(fallback));

    let paper = reasoning_paper();
    let attempt = triager.attempt(&paper.title, &paper.abstract_text).await;
    assert!(attempt.used_fallback());
    match attempt {
        TriageAttempt::Fallback { verdict, .. } => {
            assert!(verdict.relevant);
            assert_eq!(verdict.model_used, "gpt-4o-mini (fallback)");
            assert_eq!(verdict.tokens, 40);
        }
        other => panic!("expected fallback verdict, got {other:?}"),
    }
    assert_eq!(primary_calls.get(), 1);
    assert_eq!(fallback_calls.get(), 1);
}

#[tokio::test]
async fn unconfigured_primary_goes_straight_to_fallback() {
    let (store, ids) = seeded_store(&[systems_paper()]).await;
    let fallback = KeywordClassifier::new("gpt-4o-mini");
    let fallback_calls = fallback.calls();
    let triager = Triager::fallback_only("GOOGLE_API_KEY is not set", Box::new(fallback));
    let pipeline = SiftPipeline::new(
        triager,
        Summarizer::new(Box::new(ScriptedProvider::always("gpt-4o", "unused"))),
    );

    let stats = pipeline
        .run(&store, &Selection::Ids(ids), false, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(fallback_calls.get(), 1);
    assert_eq!(stats.skipped_irrelevant, 1);
    assert_eq!(stats.triage_tokens, 40);
}

#[tokio::test]
async fn both_classifiers_failing_still_summarizes() {
    let (store, ids) = seeded_store(&[systems_paper()]).await;
    let triager = Triager::new(
        Box::new(ScriptedProvider::failing("gemini-1.5-flash", 403)),
        Box::new(ScriptedProvider::failing("gpt-4o-mini", 401)),
    );
    let pipeline = SiftPipeline::new(
        triager,
        Summarizer::new(Box::new(ScriptedProvider::always(
            "gpt-4o",
            &summary_markdown("Summarized regardless.", 3),
        ))),
    );

    let stats = pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(stats.triage_failures, 1);
    assert_eq!(stats.summarized, 1);

    let paper = store.get_paper(ids[0]).await.unwrap().unwrap();
    assert_eq!(paper.digest.as_deref(), Some("Summarized regardless."));
}

// ── Retry ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_one_write() {
    let (inner, ids) = seeded_store(&[reasoning_paper()]).await;
    let store = CountingStore::new(inner);

    let flaky = ScriptedProvider::new(
        "gpt-4o",
        vec![
            Reply::Transient(429),
            Reply::Transient(503),
            Reply::Transient(429),
            Reply::text(summary_markdown("Recovered after retries.", 7)),
        ],
    );
    let flaky_calls = flaky.calls();
    let retrying = RetryingProvider::new(flaky, RetryPolicy::default());
    let (triager, _) = keyword_triager();
    let pipeline = SiftPipeline::new(triager, Summarizer::new(Box::new(retrying)));

    let started = tokio::time::Instant::now();
    let stats = pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();

    assert_eq!(flaky_calls.get(), 4);
    assert_eq!(stats.summarized, 1);
    assert_eq!(stats.summary_failures, 0);
    assert_eq!(store.writes(), 1);
    // 5s + 10s + 20s of backoff on the paused clock.
    assert!(started.elapsed() >= Duration::from_secs(35));

    let paper = store.get_paper(ids[0]).await.unwrap().unwrap();
    assert_eq!(paper.digest.as_deref(), Some("Recovered after retries."));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_leave_paper_pending() {
    let (inner, ids) = seeded_store(&[reasoning_paper()]).await;
    let store = CountingStore::new(inner);

    let down = ScriptedProvider::new("gpt-4o", vec![Reply::Transient(503)]);
    let down_calls = down.calls();
    let policy = RetryPolicy {
        max_attempts: 3,
        ..RetryPolicy::default()
    };
    let (triager, _) = keyword_triager();
    let pipeline = SiftPipeline::new(
        triager,
        Summarizer::new(Box::new(RetryingProvider::new(down, policy))),
    );

    let stats = pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(down_calls.get(), 3);
    assert_eq!(stats.summary_failures, 1);
    assert_eq!(store.writes(), 0);

    let paper = store.get_paper(ids[0]).await.unwrap().unwrap();
    assert!(paper.needs_processing());
}

// ── Selection ───────────────────────────────────────────────────

#[tokio::test]
async fn forced_run_resummarizes_recent_papers() {
    let (store, ids) = seeded_store(&[reasoning_paper()]).await;
    let (triager, _) = keyword_triager();
    let summary_provider = ScriptedProvider::new(
        "gpt-4o",
        vec![
            Reply::text(summary_markdown("First pass.", 4)),
            Reply::text(summary_markdown("Second pass.", 9)),
        ],
    );
    let summary_calls = summary_provider.calls();
    let pipeline = SiftPipeline::new(triager, Summarizer::new(Box::new(summary_provider)));

    pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();
    let unforced = pipeline
        .run(&store, &Selection::Ids(ids.clone()), false, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(unforced.already_done, 1);
    assert_eq!(summary_calls.get(), 1);

    let forced = pipeline
        .run(&store, &Selection::Auto, true, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(forced.summarized, 1);
    assert_eq!(summary_calls.get(), 2);

    let paper = store.get_paper(ids[0]).await.unwrap().unwrap();
    assert_eq!(paper.digest.as_deref(), Some("Second pass."));
    assert_eq!(paper.excitement_score.value(), 9);
}

#[tokio::test]
async fn forced_rerun_that_skips_clears_the_old_score() {
    let (store, ids) = seeded_store(&[reasoning_paper()]).await;
    let classifier = ScriptedProvider::new(
        "gemini-1.5-flash",
        vec![
            Reply::text("RELEVANT: YES\nREASON: Reasoning traces."),
            Reply::text("RELEVANT: NO\nREASON: Really a benchmark dump."),
        ],
    );
    let triager = Triager::new(
        Box::new(classifier),
        Box::new(ScriptedProvider::failing("gpt-4o-mini", 401)),
    );
    let summarizer = Summarizer::new(Box::new(ScriptedProvider::always(
        "gpt-4o",
        &summary_markdown("Worth reading.", 7),
    )));
    let pipeline = SiftPipeline::new(triager, summarizer);

    pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();
    let paper = store.get_paper(ids[0]).await.unwrap().unwrap();
    assert_eq!(paper.excitement_score.value(), 7);

    let forced = pipeline
        .run(&store, &Selection::Auto, true, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(forced.skipped_irrelevant, 1);

    let paper = store.get_paper(ids[0]).await.unwrap().unwrap();
    assert_eq!(paper.summary_md.as_deref(), Some(SKIP_SENTINEL));
    assert_eq!(paper.digest.as_deref(), Some("Really a benchmark dump."));
    assert_eq!(paper.excitement_score, ExcitementScore::UNSCORED);
    assert!(paper.score_breakdown.to_string().is_empty());
    assert!(paper.model_used.is_none());
}

#[tokio::test]
async fn batch_size_caps_auto_selection() {
    let papers: Vec<_> = (0..5)
        .map(|i| {
            sift_test::stub(
                &format!("2502.0000{i}"),
                &format!("Agent planning study {i}"),
                "Reasoning.",
            )
        })
        .collect();
    let (store, ids) = seeded_store(&papers).await;
    let (triager, _) = keyword_triager();
    let pipeline = SiftPipeline::new(
        triager,
        Summarizer::new(Box::new(ScriptedProvider::always(
            "gpt-4o",
            &summary_markdown("Ok.", 5),
        ))),
    )
    .with_batch_size(2);

    let stats = pipeline
        .run(&store, &Selection::Auto, false, &NoopReporter)
        .await
        .unwrap();
    assert_eq!(stats.selected, 2);

    // Newest first: the last two ingested were processed.
    assert!(!store.get_paper(ids[4]).await.unwrap().unwrap().needs_processing());
    assert!(!store.get_paper(ids[3]).await.unwrap().unwrap().needs_processing());
    assert!(store.get_paper(ids[0]).await.unwrap().unwrap().needs_processing());
}
