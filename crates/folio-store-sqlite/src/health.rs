//! Health fingerprint gate.
//!
//! Runs a fixed, ordered checklist against the store and stops at the first
//! failure; earlier checks indicate more severe defects:
//!
//! 1. native integrity check            → `ERR_DB_INTEGRITY_FAIL`
//! 2. identity columns on `sections`    → `ERR_SCHEMA_COLUMNS_MISSING`
//! 3. unique `(book_id, section_uid)`   → `ERR_UNIQUE_INDEX_MISSING`
//! 4. schema version ≥ minimum          → `ERR_SCHEMA_VERSION_LOW`
//! 5. flagship work has sections        → `ERR_<WORK>_MISSING`
//! 6. no flagship section lacks a uid   → `ERR_UID_NULL`
//! 7. flagship has a `main` section     → `ERR_MAIN_SECTIONS_MISSING`
//! 8. no duplicate `(book_id, uid)`     → `ERR_UID_DUPLICATE`
//!
//! Diagnostics are collected up front so every verdict carries them.

use chrono::Utc;
use folio_core::{
  defect::DefectCode,
  health::{Diagnostics, Fingerprint, HealthReport, IndexInfo},
  profile::{CorpusProfile, WorkProfile},
};
use rusqlite::{Connection, Params};
use serde_json::json;

use crate::{
  ContentDb, Result,
  backfill::duplicate_uids,
  schema::{self, IDENTITY_COLUMNS, MIN_SCHEMA_VERSION, UNIQUE_UID_INDEX},
  state::StateStore,
};

const SAMPLE_LIMIT: usize = 10;
const DUPLICATE_SAMPLE_LIMIT: usize = 20;

const ORPHAN_PARAGRAPH_COUNT: &str = "
SELECT COUNT(*) FROM paragraphs p
 WHERE NOT EXISTS (SELECT 1 FROM sections s WHERE s.id = p.section_id)";

const ORPHAN_PARAGRAPH_SAMPLE: &str = "
SELECT p.id FROM paragraphs p
 WHERE NOT EXISTS (SELECT 1 FROM sections s WHERE s.id = p.section_id)
 ORDER BY p.id LIMIT ?1";

/// The gate together with fingerprint persistence.
pub struct HealthGate<'a> {
  db:     &'a ContentDb,
  corpus: &'a CorpusProfile,
  state:  &'a StateStore,
}

impl<'a> HealthGate<'a> {
  pub fn new(db: &'a ContentDb, corpus: &'a CorpusProfile, state: &'a StateStore) -> Self {
    Self { db, corpus, state }
  }

  /// Run the checklist. A healthy fingerprint is saved and compared with the
  /// previous one; drift is only logged.
  pub async fn check(&self) -> Result<HealthReport> {
    let report = check_health(self.db, self.corpus).await?;

    if report.healthy
      && let Some(fingerprint) = &report.fingerprint
    {
      match self.state.swap_fingerprint(fingerprint.clone()).await {
        Ok(Some(previous)) => {
          for drift in fingerprint.drift(&previous) {
            tracing::warn!(
              field = drift.field,
              previous = drift.previous,
              current = drift.current,
              "fingerprint drift since last launch"
            );
          }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "failed to persist fingerprint"),
      }
      tracing::info!(
        sections = fingerprint.section_count,
        integrity = %report.diagnostics.integrity_check,
        "content store healthy"
      );
    } else if let Some(code) = &report.code {
      tracing::warn!(%code, details = ?report.details, "content store unhealthy");
    }

    Ok(report)
  }
}

/// Run the checklist without touching persisted state.
pub async fn check_health(db: &ContentDb, corpus: &CorpusProfile) -> Result<HealthReport> {
  let corpus = corpus.clone();
  db.run(move |conn| evaluate(conn, &corpus)).await
}

/// Collect diagnostics only.
pub async fn run_diagnostics(db: &ContentDb, corpus: &CorpusProfile) -> Result<Diagnostics> {
  let corpus = corpus.clone();
  db.run(move |conn| Ok(collect_diagnostics(conn, corpus.flagship_work()?)))
    .await
}

pub fn evaluate(conn: &Connection, corpus: &CorpusProfile) -> Result<HealthReport> {
  let flagship = corpus.flagship_work()?;
  let diagnostics = collect_diagnostics(conn, flagship);

  match run_checklist(conn, flagship, &diagnostics) {
    Ok(Verdict::Healthy(fingerprint)) => Ok(HealthReport::healthy(fingerprint, diagnostics)),
    Ok(Verdict::Defect { code, fingerprint, details }) => {
      Ok(HealthReport::defect(code, fingerprint, details, diagnostics))
    }
    Err(e) => {
      tracing::error!(error = %e, "health checklist query failed");
      Ok(HealthReport::defect(
        DefectCode::CheckException,
        None,
        Some(json!({ "error": e.to_string() })),
        diagnostics,
      ))
    }
  }
}

enum Verdict {
  Healthy(Fingerprint),
  Defect {
    code:        DefectCode,
    fingerprint: Option<Fingerprint>,
    details:     Option<serde_json::Value>,
  },
}

impl Verdict {
  fn defect(code: DefectCode) -> Self { Self::Defect { code, fingerprint: None, details: None } }
}

fn run_checklist(
  conn: &Connection,
  flagship: &WorkProfile,
  diagnostics: &Diagnostics,
) -> rusqlite::Result<Verdict> {
  // 1.
  if !diagnostics.integrity_ok() {
    return Ok(Verdict::defect(DefectCode::DbIntegrityFail));
  }

  // 2.
  let columns = schema::table_columns(conn, "sections")?;
  let missing: Vec<&str> = IDENTITY_COLUMNS
    .iter()
    .copied()
    .filter(|c| !columns.iter().any(|have| have == c))
    .collect();
  if !missing.is_empty() {
    return Ok(Verdict::Defect {
      code:        DefectCode::SchemaColumnsMissing,
      fingerprint: None,
      details:     Some(json!({ "missing": missing })),
    });
  }

  // 3.
  let has_unique = section_indexes(conn)?
    .iter()
    .any(|i| i.name == UNIQUE_UID_INDEX && i.unique);
  if !has_unique {
    return Ok(Verdict::defect(DefectCode::UniqueIndexMissing));
  }

  let fingerprint = fingerprint(conn, flagship)?;
  let with = |code: DefectCode, details: Option<serde_json::Value>| Verdict::Defect {
    code,
    fingerprint: Some(fingerprint.clone()),
    details,
  };

  // 4.
  if fingerprint.schema_version < MIN_SCHEMA_VERSION {
    return Ok(with(
      DefectCode::SchemaVersionLow,
      Some(json!({ "minimum": MIN_SCHEMA_VERSION, "actual": fingerprint.schema_version })),
    ));
  }

  // 5.
  if fingerprint.section_count == 0 {
    return Ok(with(DefectCode::WorkMissing { work_id: flagship.work_id.clone() }, None));
  }

  // 6.
  if fingerprint.null_uid_count > 0 {
    return Ok(with(
      DefectCode::UidNull,
      Some(json!({ "sample": diagnostics.null_uid_sample })),
    ));
  }

  // 7.
  if fingerprint.main_section_count == 0 {
    return Ok(with(DefectCode::MainSectionsMissing, None));
  }

  // 8.
  let duplicates = duplicate_uids(conn, None, SAMPLE_LIMIT)?;
  if !duplicates.is_empty() {
    return Ok(with(DefectCode::UidDuplicate, Some(json!({ "duplicates": duplicates }))));
  }

  Ok(Verdict::Healthy(fingerprint))
}

// ─── Fingerprint ─────────────────────────────────────────────────────────────

pub fn fingerprint(conn: &Connection, flagship: &WorkProfile) -> rusqlite::Result<Fingerprint> {
  let book = flagship.book_id.as_str();
  Ok(Fingerprint {
    schema_version:      schema::user_version(conn)?,
    section_count:       count(conn, "SELECT COUNT(*) FROM sections WHERE book_id = ?1", [book])?,
    null_uid_count:      null_uid_count(conn, book)?,
    duplicate_uid_count: duplicate_group_count(conn, book)?,
    main_section_count:  count(
      conn,
      "SELECT COUNT(*) FROM sections WHERE book_id = ?1 AND type = 'main'",
      [book],
    )?,
    null_book_id_count:  null_book_id_count(conn, &flagship.work_id)?,
    taken_at:            Utc::now(),
  })
}

fn count<P: Params>(conn: &Connection, sql: &str, params: P) -> rusqlite::Result<u64> {
  conn.query_row(sql, params, |r| r.get::<_, i64>(0)).map(|n| n as u64)
}

fn null_uid_count(conn: &Connection, book_id: &str) -> rusqlite::Result<u64> {
  count(
    conn,
    "SELECT COUNT(*) FROM sections
      WHERE book_id = ?1 AND (section_uid IS NULL OR section_uid = '')",
    [book_id],
  )
}

fn duplicate_group_count(conn: &Connection, book_id: &str) -> rusqlite::Result<u64> {
  count(
    conn,
    "SELECT COUNT(*) FROM (
       SELECT 1 FROM sections
        WHERE book_id = ?1 AND section_uid IS NOT NULL AND section_uid <> ''
        GROUP BY section_uid
       HAVING COUNT(*) > 1
     )",
    [book_id],
  )
}

fn null_book_id_count(conn: &Connection, work_id: &str) -> rusqlite::Result<u64> {
  count(
    conn,
    "SELECT COUNT(*) FROM sections WHERE work_id = ?1 AND (book_id IS NULL OR book_id = '')",
    [work_id],
  )
}

// ─── Diagnostics ─────────────────────────────────────────────────────────────

/// Every probe is independent; one that fails is logged and left empty.
pub fn collect_diagnostics(conn: &Connection, flagship: &WorkProfile) -> Diagnostics {
  let book = flagship.book_id.as_str();

  Diagnostics {
    integrity_check:         pragma_check(conn, "integrity_check"),
    quick_check:             pragma_check(conn, "quick_check"),
    foreign_key_violations:  probe("foreign_key_check", || foreign_key_violations(conn)),
    orphan_paragraph_count:  probe("orphan_paragraphs", || {
      count(conn, ORPHAN_PARAGRAPH_COUNT, rusqlite::params![])
    }),
    orphan_paragraph_sample: probe("orphan_paragraph_sample", || {
      id_sample(conn, ORPHAN_PARAGRAPH_SAMPLE, rusqlite::params![SAMPLE_LIMIT as i64])
    })
    .unwrap_or_default(),
    user_version:            probe("user_version", || schema::user_version(conn)),
    section_indexes:         probe("index_list", || section_indexes(conn)).unwrap_or_default(),
    null_uid_count:          probe("null_uid_count", || null_uid_count(conn, book)),
    null_uid_sample:         probe("null_uid_sample", || {
      id_sample(
        conn,
        "SELECT id FROM sections
          WHERE book_id = ?1 AND (section_uid IS NULL OR section_uid = '')
          ORDER BY order_index LIMIT ?2",
        rusqlite::params![book, SAMPLE_LIMIT as i64],
      )
    })
    .unwrap_or_default(),
    duplicate_uid_count:     probe("duplicate_uid_count", || duplicate_group_count(conn, book)),
    duplicate_uid_sample:    probe("duplicate_uid_sample", || {
      duplicate_uids(conn, Some(book), DUPLICATE_SAMPLE_LIMIT)
    })
    .unwrap_or_default(),
    null_book_id_count:      probe("null_book_id_count", || {
      null_book_id_count(conn, &flagship.work_id)
    }),
  }
}

fn probe<T>(name: &str, f: impl FnOnce() -> rusqlite::Result<T>) -> Option<T> {
  match f() {
    Ok(value) => Some(value),
    Err(e) => {
      tracing::warn!(probe = name, error = %e, "diagnostic probe failed");
      None
    }
  }
}

/// First line of `PRAGMA integrity_check(1)` / `quick_check(1)`; a failure
/// to run the pragma is reported in-band.
fn pragma_check(conn: &Connection, pragma: &str) -> String {
  conn
    .query_row(&format!("PRAGMA {pragma}(1)"), [], |r| r.get::<_, String>(0))
    .unwrap_or_else(|e| format!("error: {e}"))
}

fn foreign_key_violations(conn: &Connection) -> rusqlite::Result<u64> {
  let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
  let mut rows = stmt.query([])?;
  let mut n = 0;
  while rows.next()?.is_some() {
    n += 1;
  }
  Ok(n)
}

fn section_indexes(conn: &Connection) -> rusqlite::Result<Vec<IndexInfo>> {
  let mut stmt = conn.prepare("PRAGMA index_list(sections)")?;
  let indexes = stmt
    .query_map([], |row| {
      Ok(IndexInfo { name: row.get(1)?, unique: row.get::<_, i64>(2)? == 1 })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(indexes)
}

fn id_sample<P: Params>(conn: &Connection, sql: &str, params: P) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(sql)?;
  let ids = stmt
    .query_map(params, |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(ids)
}
