/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// SQL schema for Sift's `SQLite` database. Idempotent.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS sift_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per paper; processing fields stay NULL until a pipeline pass fills them
CREATE TABLE IF NOT EXISTS papers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    arxiv_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '',
    date TEXT NOT NULL DEFAULT '',
    abstract TEXT NOT NULL DEFAULT '',
    arxiv_link TEXT NOT NULL DEFAULT '',
    reasoning_category TEXT,
    keywords TEXT DEFAULT '',
    notes TEXT DEFAULT '',
    date_added TEXT,
    summary_md TEXT,
    tldr TEXT,
    excitement_score INTEGER NOT NULL DEFAULT 0
        CHECK (excitement_score BETWEEN 0 AND 10),
    score_breakdown TEXT,
    excitement_reasoning TEXT,
    model_used TEXT,
    summary_tokens INTEGER,
    last_summarized_at TEXT,
    last_scored_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_papers_date_added ON papers(date_added);
";

/// Columns read back into a [`crate::types::Paper`].
pub const PAPER_COLUMNS: &str = "id, arxiv_id, title, authors, date, abstract, arxiv_link,
    reasoning_category, COALESCE(notes, '') AS notes, date_added, summary_md, tldr,
    COALESCE(excitement_score, 0) AS excitement_score,
    COALESCE(score_breakdown, '') AS score_breakdown,
    COALESCE(excitement_reasoning, '') AS excitement_reasoning,
    model_used, summary_tokens, last_summarized_at, last_scored_at";
