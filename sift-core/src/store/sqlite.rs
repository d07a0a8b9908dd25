use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{SiftError, StoreError};
use crate::types::{
    ExcitementScore, NewPaper, Paper, PaperId, SKIP_SENTINEL, ScoreBreakdown, StoreStats,
    SummaryUpdate,
};

use super::PaperStore;
use super::schema::{self, PAPER_COLUMNS};

/// SQLite-backed implementation of `PaperStore`.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path, creating parent directories.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Schema(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("sift store mutex poisoned")
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.lock();

        conn.execute_batch("PRAGMA synchronous = NORMAL;")
            .map_err(StoreError::Sqlite)?;
        // WAL is unavailable for in-memory databases
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;
        conn.execute(
            "INSERT OR IGNORE INTO sift_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        Ok(())
    }

    fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
        let raw = raw?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                // Rows written by older tooling use naive ISO timestamps.
                chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| naive.and_utc())
            })
            .ok()
    }

    fn row_to_paper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Paper> {
        let tokens: Option<i64> = row.get("summary_tokens")?;
        let summary_tokens = tokens.and_then(|t| u64::try_from(t).ok());
        let breakdown: String = row.get("score_breakdown")?;
        Ok(Paper {
            id: PaperId(row.get("id")?),
            external_id: row.get("arxiv_id")?,
            title: row.get("title")?,
            authors: row.get("authors")?,
            published: row.get("date")?,
            abstract_text: row.get("abstract")?,
            source_url: row.get("arxiv_link")?,
            category: row.get("reasoning_category")?,
            notes: row.get("notes")?,
            date_added: Self::parse_timestamp(row.get("date_added")?),
            summary_md: row.get("summary_md")?,
            digest: row.get("tldr")?,
            excitement_score: ExcitementScore::from_stored(row.get("excitement_score")?),
            score_breakdown: ScoreBreakdown::parse(&breakdown),
            excitement_reasoning: row.get("excitement_reasoning")?,
            model_used: row.get("model_used")?,
            summary_tokens,
            last_summarized_at: Self::parse_timestamp(row.get("last_summarized_at")?),
            last_scored_at: Self::parse_timestamp(row.get("last_scored_at")?),
        })
    }

    fn query_papers(
        conn: &Connection,
        sql: &str,
        limit: u32,
    ) -> crate::error::Result<Vec<Paper>> {
        let mut stmt = conn.prepare_cached(sql).map_err(StoreError::Sqlite)?;
        let papers = stmt
            .query_map(params![limit], Self::row_to_paper)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(papers)
    }

    fn expect_one_row(changed: usize, id: PaperId) -> crate::error::Result<()> {
        if changed == 0 {
            return Err(SiftError::Store(StoreError::NotFound(id.to_string())));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PaperStore for SqliteStore {
    // ── Ingestion ──────────────────────────────────────────────────

    async fn contains_external_id(&self, external_id: &str) -> crate::error::Result<bool> {
        let conn = self.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM papers WHERE arxiv_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Sqlite)?;
        Ok(found.is_some())
    }

    async fn insert_paper(&self, paper: &NewPaper) -> crate::error::Result<PaperId> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO papers (
                arxiv_id, title, authors, date, abstract, arxiv_link,
                reasoning_category, keywords, notes, date_added
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '', ?8, ?9)",
            params![
                paper.external_id,
                paper.title,
                paper.authors,
                paper.published,
                paper.abstract_text,
                paper.source_url,
                paper.category,
                paper.notes,
                paper.date_added.to_rfc3339(),
            ],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(PaperId(conn.last_insert_rowid()))
    }

    // ── Selection ──────────────────────────────────────────────────

    async fn get_paper(&self, id: PaperId) -> crate::error::Result<Option<Paper>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {PAPER_COLUMNS} FROM papers WHERE id = ?1"),
            params![id.0],
            Self::row_to_paper,
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(SiftError::Store)
    }

    async fn get_papers(&self, ids: &[PaperId]) -> crate::error::Result<Vec<Paper>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached(&format!("SELECT {PAPER_COLUMNS} FROM papers WHERE id = ?1"))
            .map_err(StoreError::Sqlite)?;
        let mut papers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(paper) = stmt
                .query_row(params![id.0], Self::row_to_paper)
                .optional()
                .map_err(StoreError::Sqlite)?
            {
                papers.push(paper);
            }
        }
        Ok(papers)
    }

    async fn pending_papers(&self, limit: u32) -> crate::error::Result<Vec<Paper>> {
        let conn = self.lock();
        Self::query_papers(
            &conn,
            &format!(
                "SELECT {PAPER_COLUMNS} FROM papers
                 WHERE (summary_md IS NULL OR TRIM(summary_md) = '')
                    OR (tldr IS NULL OR TRIM(tldr) = '')
                 ORDER BY id DESC
                 LIMIT ?1"
            ),
            limit,
        )
    }

    async fn recent_papers(&self, limit: u32) -> crate::error::Result<Vec<Paper>> {
        let conn = self.lock();
        Self::query_papers(
            &conn,
            &format!("SELECT {PAPER_COLUMNS} FROM papers ORDER BY id DESC LIMIT ?1"),
            limit,
        )
    }

    // ── Outcomes ───────────────────────────────────────────────────

    async fn save_summary(&self, id: PaperId, update: &SummaryUpdate) -> crate::error::Result<()> {
        let conn = self.lock();
        let summarized_at = update.summarized_at.to_rfc3339();
        let tokens: Option<i64> = update.tokens.and_then(|t| i64::try_from(t).ok());

        // Every score column is rewritten; an unscored summary resets them.
        let (score, breakdown, reasoning, scored_at) = match &update.excitement {
            Some(e) => (
                i64::from(e.score.value()),
                Some(e.breakdown.to_string()),
                Some(e.reasoning.clone()),
                Some(summarized_at.clone()),
            ),
            None => (i64::from(ExcitementScore::UNSCORED.value()), None, None, None),
        };

        let changed = conn
            .execute(
                "UPDATE papers
                 SET summary_md = ?1,
                     tldr = ?2,
                     model_used = ?3,
                     summary_tokens = ?4,
                     last_summarized_at = ?5,
                     excitement_score = ?6,
                     score_breakdown = ?7,
                     excitement_reasoning = ?8,
                     last_scored_at = ?9
                 WHERE id = ?10",
                params![
                    update.summary_md,
                    update.digest,
                    update.model_used,
                    tokens,
                    summarized_at,
                    score,
                    breakdown,
                    reasoning,
                    scored_at,
                    id.0,
                ],
            )
            .map_err(StoreError::Sqlite)?;
        Self::expect_one_row(changed, id)
    }

    async fn mark_skipped(&self, id: PaperId, reason: &str) -> crate::error::Result<()> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE papers
                 SET summary_md = ?1,
                     tldr = ?2,
                     model_used = NULL,
                     summary_tokens = NULL,
                     last_summarized_at = NULL,
                     excitement_score = 0,
                     score_breakdown = NULL,
                     excitement_reasoning = NULL,
                     last_scored_at = NULL
                 WHERE id = ?3",
                params![SKIP_SENTINEL, reason, id.0],
            )
            .map_err(StoreError::Sqlite)?;
        Self::expect_one_row(changed, id)
    }

    // ── Metrics ────────────────────────────────────────────────────

    async fn stats(&self) -> crate::error::Result<StoreStats> {
        let conn = self.lock();
        let count = |sql: &str| -> crate::error::Result<u64> {
            conn.query_row(sql, [], |row| row.get(0))
                .map_err(StoreError::Sqlite)
                .map_err(SiftError::Store)
        };

        let total_papers = count("SELECT COUNT(*) FROM papers")?;
        let skipped = count("SELECT COUNT(*) FROM papers WHERE summary_md LIKE '[Skipped%'")?;
        let summarized = count(
            "SELECT COUNT(*) FROM papers
             WHERE TRIM(COALESCE(summary_md, '')) != '' AND summary_md NOT LIKE '[Skipped%'",
        )?;
        let pending = count(
            "SELECT COUNT(*) FROM papers
             WHERE TRIM(COALESCE(summary_md, '')) = '' OR TRIM(COALESCE(tldr, '')) = ''",
        )?;
        let scored = count("SELECT COUNT(*) FROM papers WHERE excitement_score > 0")?;

        let db_size_bytes = self
            .db_path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map_or(0, |m| m.len());

        Ok(StoreStats {
            total_papers,
            summarized,
            skipped,
            pending,
            scored,
            db_size_bytes,
        })
    }
}
