// Ingestion: normalize candidate ids, skip known papers, insert the rest.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::store::PaperStore;
use crate::types::{NewPaper, PaperStub};

/// Counts from one ingestion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub added: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl IngestStats {
    pub fn seen(&self) -> u64 {
        self.added + self.skipped + self.failed
    }
}

/// Canonical form of an external paper identifier.
///
/// Accepts bare ids (`2401.00001v2`), `arXiv:` prefixed ids, and abs/pdf
/// URLs; the result is lowercase with any trailing version suffix removed.
pub fn normalize_external_id(raw: &str) -> String {
    let mut id = raw.trim().to_lowercase();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = id.strip_prefix(scheme) {
            id = rest.to_string();
        }
    }
    if let Some(rest) = id.strip_prefix("www.") {
        id = rest.to_string();
    }
    for prefix in ["arxiv.org/abs/", "arxiv.org/pdf/", "arxiv:"] {
        if let Some(rest) = id.strip_prefix(prefix) {
            id = rest.to_string();
            break;
        }
    }
    if let Some(rest) = id.strip_suffix(".pdf") {
        id = rest.to_string();
    }
    let id = id.trim_end_matches('/').trim();

    strip_version(id).to_string()
}

fn strip_version(id: &str) -> &str {
    let Some(pos) = id.rfind('v') else {
        return id;
    };
    let (head, version) = (&id[..pos], &id[pos + 1..]);
    let numbered = !version.is_empty() && version.chars().all(|c| c.is_ascii_digit());
    let after_digit = head.chars().last().is_some_and(|c| c.is_ascii_digit());
    if numbered && after_digit { head } else { id }
}

/// Notes attached to auto-collected papers.
pub fn collection_note(now: DateTime<Utc>) -> String {
    format!("Auto-collected from HF on {}", now.format("%Y-%m-%d"))
}

fn to_new_paper(
    stub: &PaperStub,
    external_id: String,
    category: &str,
    now: DateTime<Utc>,
) -> NewPaper {
    NewPaper {
        external_id,
        title: stub.title.clone(),
        authors: stub.authors.clone(),
        published: stub.published.clone(),
        abstract_text: stub.abstract_text.clone(),
        source_url: stub.source_url.clone(),
        category: Some(category.to_string()),
        notes: collection_note(now),
        date_added: now,
    }
}

/// Insert every candidate not already in the store.
///
/// Failures are per candidate: they are logged and counted, and the rest of
/// the batch still runs.
pub async fn ingest(
    store: &dyn PaperStore,
    candidates: &[PaperStub],
    category: &str,
    now: DateTime<Utc>,
) -> IngestStats {
    let mut stats = IngestStats::default();
    let mut batch_ids: HashSet<String> = HashSet::with_capacity(candidates.len());

    for stub in candidates {
        let external_id = normalize_external_id(&stub.external_id);
        if external_id.is_empty() {
            let err = IngestError::MissingId(stub.title.clone());
            warn!(error = %err, "Dropping candidate");
            stats.failed += 1;
            continue;
        }
        if !batch_ids.insert(external_id.clone()) {
            debug!(%external_id, "Duplicate within batch");
            stats.skipped += 1;
            continue;
        }

        match store.contains_external_id(&external_id).await {
            Ok(true) => {
                debug!(%external_id, "Already stored");
                stats.skipped += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(%external_id, error = %e, "Lookup failed");
                stats.failed += 1;
                continue;
            }
        }

        let paper = to_new_paper(stub, external_id, category, now);
        match store.insert_paper(&paper).await {
            Ok(id) => {
                info!(%id, external_id = %paper.external_id, title = %paper.title, "Added paper");
                stats.added += 1;
            }
            Err(e) => {
                warn!(external_id = %paper.external_id, error = %e, "Insert failed");
                stats.failed += 1;
            }
        }
    }

    info!(
        added = stats.added,
        skipped = stats.skipped,
        failed = stats.failed,
        "Ingestion complete"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;

    fn stub(id: &str, title: &str) -> PaperStub {
        PaperStub {
            external_id: id.to_string(),
            title: title.to_string(),
            authors: "A. Author".to_string(),
            abstract_text: "An abstract.".to_string(),
            source_url: format!("https://arxiv.org/abs/{id}"),
            published: "2025-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn normalization_forms() {
        assert_eq!(normalize_external_id(" 2401.00001 "), "2401.00001");
        assert_eq!(normalize_external_id("2401.00001v3"), "2401.00001");
        assert_eq!(normalize_external_id("arXiv:2401.00001v1"), "2401.00001");
        assert_eq!(
            normalize_external_id("https://arxiv.org/abs/2401.00001v2"),
            "2401.00001"
        );
        assert_eq!(
            normalize_external_id("http://www.arxiv.org/pdf/2401.00001.pdf"),
            "2401.00001"
        );
        assert_eq!(normalize_external_id("hep-th/9901001v1"), "hep-th/9901001");
        assert_eq!(normalize_external_id("   "), "");
    }

    #[test]
    fn version_strip_requires_numeric_suffix() {
        assert_eq!(normalize_external_id("rev"), "rev");
        assert_eq!(normalize_external_id("2401.0000v"), "2401.0000v");
        assert_eq!(normalize_external_id("abcv2"), "abcv2");
    }

    #[test]
    fn note_format() {
        let now = DateTime::parse_from_rfc3339("2025-06-07T08:09:10Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(collection_note(now), "Auto-collected from HF on 2025-06-07");
    }

    #[tokio::test]
    async fn ingesting_twice_adds_nothing_new() {
        let store = SqliteStore::in_memory().unwrap();
        let batch = vec![stub("2401.00001", "One"), stub("2401.00002", "Two")];

        let first = ingest(&store, &batch, "huggingface", Utc::now()).await;
        assert_eq!(first, IngestStats { added: 2, skipped: 0, failed: 0 });

        let second = ingest(&store, &batch, "huggingface", Utc::now()).await;
        assert_eq!(second, IngestStats { added: 0, skipped: 2, failed: 0 });
        assert_eq!(store.stats().await.unwrap().total_papers, 2);
    }

    #[tokio::test]
    async fn version_variants_deduplicate() {
        let store = SqliteStore::in_memory().unwrap();
        let first = ingest(&store, &[stub("2401.00001v1", "One")], "hf", Utc::now()).await;
        assert_eq!(first.added, 1);

        let second = ingest(
            &store,
            &[stub("arXiv:2401.00001v2", "One, again")],
            "hf",
            Utc::now(),
        )
        .await;
        assert_eq!(second.skipped, 1);
        assert_eq!(second.added, 0);
    }

    #[tokio::test]
    async fn prefix_ids_are_not_confused() {
        let store = SqliteStore::in_memory().unwrap();
        ingest(&store, &[stub("2401.000011", "Long")], "hf", Utc::now()).await;
        let stats = ingest(&store, &[stub("2401.00001", "Short")], "hf", Utc::now()).await;
        assert_eq!(stats.added, 1);
    }

    #[tokio::test]
    async fn in_batch_duplicates_and_blank_ids() {
        let store = SqliteStore::in_memory().unwrap();
        let batch = vec![
            stub("2401.00001", "One"),
            stub("2401.00001v2", "One v2"),
            stub("", "No id"),
        ];
        let stats = ingest(&store, &batch, "huggingface", Utc::now()).await;
        assert_eq!(stats, IngestStats { added: 1, skipped: 1, failed: 1 });
        assert_eq!(stats.seen(), 3);

        let papers = store.recent_papers(10).await.unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].category.as_deref(), Some("huggingface"));
        assert!(papers[0].notes.starts_with("Auto-collected from HF on "));
        assert!(papers[0].summary_md.is_none());
    }
}
