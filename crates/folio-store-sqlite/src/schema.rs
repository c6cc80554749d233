//! SQL schema for the Folio content store.
//!
//! Every statement is idempotent (`IF NOT EXISTS`) because a migration step
//! may be re-run after an interrupted launch. Columns that older bundles lack
//! are added separately through [`add_column_if_absent`].

use rusqlite::Connection;

/// Schema version this build migrates to.
pub const TARGET_SCHEMA_VERSION: i64 = 2;

/// Lowest schema version the health gate accepts.
pub const MIN_SCHEMA_VERSION: i64 = 2;

/// Tables whose absence makes the store structurally invalid.
pub const REQUIRED_TABLES: &[&str] = &["works", "sections", "paragraphs"];

/// Identity columns added by the version 2 step.
pub const IDENTITY_COLUMNS: &[&str] = &["book_id", "section_uid", "version"];

/// Name of the unique `(book_id, section_uid)` index.
pub const UNIQUE_UID_INDEX: &str = "idx_sections_book_uid";

/// Core corpus tables (version 1).
pub const CORE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS works (
    id          TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    order_index INTEGER NOT NULL DEFAULT 0,
    category    TEXT,
    meta_json   TEXT
);

CREATE TABLE IF NOT EXISTS sections (
    id          TEXT PRIMARY KEY,
    work_id     TEXT NOT NULL REFERENCES works(id),
    parent_id   TEXT,
    title       TEXT NOT NULL,
    order_index INTEGER NOT NULL DEFAULT 0,
    type        TEXT             -- 'main' | 'sub' | 'footnote'
);
CREATE INDEX IF NOT EXISTS idx_sections_work ON sections(work_id);

CREATE TABLE IF NOT EXISTS paragraphs (
    id          TEXT PRIMARY KEY,
    section_id  TEXT NOT NULL REFERENCES sections(id),
    text        TEXT NOT NULL,
    order_index INTEGER NOT NULL DEFAULT 0,
    is_arabic   INTEGER DEFAULT 0,
    page_no     INTEGER
);
CREATE INDEX IF NOT EXISTS idx_paragraphs_section       ON paragraphs(section_id);
CREATE INDEX IF NOT EXISTS idx_paragraphs_section_order ON paragraphs(section_id, order_index);

CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dictionary (
    term    TEXT PRIMARY KEY,
    meaning TEXT NOT NULL
);
";

/// Columns of `sections` that bundles built before nesting support lack.
pub const STRUCTURE_COLUMNS: &[(&str, &str)] = &[("parent_id", "TEXT"), ("type", "TEXT")];

/// Paragraph full-text index plus the triggers that keep it in sync.
pub const FULL_TEXT: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS paragraphs_fts USING fts5(
    text,
    content='paragraphs',
    content_rowid='rowid',
    tokenize='unicode61'
);

CREATE TRIGGER IF NOT EXISTS paragraphs_ai AFTER INSERT ON paragraphs BEGIN
    INSERT INTO paragraphs_fts(rowid, text) VALUES (new.rowid, new.text);
END;

CREATE TRIGGER IF NOT EXISTS paragraphs_ad AFTER DELETE ON paragraphs BEGIN
    INSERT INTO paragraphs_fts(paragraphs_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
END;

CREATE TRIGGER IF NOT EXISTS paragraphs_au AFTER UPDATE ON paragraphs BEGIN
    INSERT INTO paragraphs_fts(paragraphs_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
    INSERT INTO paragraphs_fts(rowid, text) VALUES (new.rowid, new.text);
END;
";

/// Populate a freshly created full-text index from existing paragraphs.
pub const FULL_TEXT_REBUILD: &str =
  "INSERT INTO paragraphs_fts(paragraphs_fts) VALUES ('rebuild');";

/// Identity indexes (version 2).
pub const IDENTITY_INDEXES: &str = "
CREATE UNIQUE INDEX IF NOT EXISTS idx_sections_book_uid    ON sections(book_id, section_uid);
CREATE INDEX        IF NOT EXISTS idx_sections_book_lookup ON sections(book_id);
";

// ─── Introspection ───────────────────────────────────────────────────────────

pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
  conn.query_row(
    "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
    [name],
    |r| r.get::<_, i64>(0),
  )
  .map(|n| n > 0)
}

pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
  let columns = stmt
    .query_map([], |row| row.get::<_, String>(1))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(columns)
}

/// `ALTER TABLE … ADD COLUMN` unless the column is already there. Returns
/// whether the column was added.
pub fn add_column_if_absent(
  conn: &Connection,
  table: &str,
  column: &str,
  decl: &str,
) -> rusqlite::Result<bool> {
  if table_columns(conn, table)?.iter().any(|c| c == column) {
    return Ok(false);
  }
  conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl};"))?;
  Ok(true)
}

pub fn missing_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
  let mut missing = Vec::new();
  for table in REQUIRED_TABLES {
    if !table_exists(conn, table)? {
      missing.push((*table).to_owned());
    }
  }
  Ok(missing)
}

pub fn user_version(conn: &Connection) -> rusqlite::Result<i64> {
  conn.pragma_query_value(None, "user_version", |r| r.get(0))
}
