//! Forward-only schema migrations gated on `PRAGMA user_version`.
//!
//! Pending steps and the version bump run in one transaction: a failure in
//! any step leaves the persisted version untouched, and the next launch
//! re-runs the steps from there. Each step is idempotent so a step that was
//! already applied by an interrupted run is safe to apply again.

use folio_core::profile::CorpusProfile;
use rusqlite::Connection;
use serde::Serialize;

use crate::{
  ContentDb, Error, Result,
  backfill::{BackfillReport, backfill_scope},
  schema::{
    self, CORE_TABLES, FULL_TEXT, FULL_TEXT_REBUILD, IDENTITY_COLUMNS, IDENTITY_INDEXES,
    STRUCTURE_COLUMNS, TARGET_SCHEMA_VERSION,
  },
};

/// What a migration run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
  pub from:      i64,
  pub to:        i64,
  /// Versions whose step ran, ascending.
  pub applied:   Vec<i64>,
  pub backfills: Vec<BackfillReport>,
  /// `false` when the full-text index could not be created.
  pub full_text: bool,
}

impl MigrationReport {
  pub fn is_noop(&self) -> bool { self.applied.is_empty() }
}

type StepFn = fn(&Connection, &CorpusProfile, &mut MigrationReport) -> Result<()>;

struct Step {
  version: i64,
  name:    &'static str,
  apply:   StepFn,
}

const STEPS: &[Step] = &[
  Step { version: 1, name: "core tables", apply: apply_core_tables },
  Step { version: 2, name: "section identity", apply: apply_section_identity },
];

/// Bring the store up to [`TARGET_SCHEMA_VERSION`].
pub async fn migrate_if_needed(db: &ContentDb, corpus: &CorpusProfile) -> Result<MigrationReport> {
  let corpus = corpus.clone();
  db.run(move |conn| migrate_connection(conn, &corpus)).await
}

pub fn migrate_connection(conn: &mut Connection, corpus: &CorpusProfile) -> Result<MigrationReport> {
  let current = schema::user_version(conn)?;
  tracing::info!(current, target = TARGET_SCHEMA_VERSION, "checking schema version");

  let mut report = MigrationReport { from: current, to: current, ..Default::default() };

  if current >= TARGET_SCHEMA_VERSION {
    let missing = schema::missing_tables(conn)?;
    if !missing.is_empty() {
      tracing::warn!(?missing, "schema is current but tables are missing; recreating");
      let tx = conn.transaction()?;
      apply_core_tables(&tx, corpus, &mut report)?;
      // A recreated sections table is empty, so identity needs no backfill.
      if missing.iter().any(|t| t == "sections") {
        apply_identity_schema(&tx)?;
      }
      ensure_required_tables(&tx)?;
      tx.commit()?;
      report.applied.push(1);
    }
    return Ok(report);
  }

  let tx = conn.transaction()?;
  for step in STEPS.iter().filter(|s| s.version > current) {
    tracing::info!(version = step.version, name = step.name, "applying migration step");
    (step.apply)(&tx, corpus, &mut report).map_err(|e| Error::Migration {
      version: step.version,
      source:  Box::new(e),
    })?;
    report.applied.push(step.version);
  }

  ensure_required_tables(&tx)?;
  tx.pragma_update(None, "user_version", TARGET_SCHEMA_VERSION)?;
  tx.commit()?;

  report.to = TARGET_SCHEMA_VERSION;
  tracing::info!(from = current, to = TARGET_SCHEMA_VERSION, "schema migrated");
  Ok(report)
}

fn ensure_required_tables(conn: &Connection) -> Result<()> {
  let missing = schema::missing_tables(conn)?;
  if missing.is_empty() { Ok(()) } else { Err(Error::SchemaInvalid { missing }) }
}

// ─── Steps ───────────────────────────────────────────────────────────────────

/// 0 → 1: corpus tables and the paragraph full-text index.
fn apply_core_tables(
  conn: &Connection,
  _corpus: &CorpusProfile,
  report: &mut MigrationReport,
) -> Result<()> {
  conn.execute_batch(CORE_TABLES)?;
  for (column, decl) in STRUCTURE_COLUMNS {
    if schema::add_column_if_absent(conn, "sections", column, decl)? {
      tracing::info!(column, "added sections column");
    }
  }
  report.full_text = create_full_text(conn)?;
  Ok(())
}

/// Best-effort; full-text support is optional on some SQLite builds.
fn create_full_text(conn: &Connection) -> Result<bool> {
  let existed = schema::table_exists(conn, "paragraphs_fts")?;

  conn.execute_batch("SAVEPOINT full_text;")?;
  let created = conn.execute_batch(FULL_TEXT).and_then(|()| {
    if existed { Ok(()) } else { conn.execute_batch(FULL_TEXT_REBUILD) }
  });

  match created {
    Ok(()) => {
      conn.execute_batch("RELEASE full_text;")?;
      Ok(true)
    }
    Err(e) => {
      tracing::warn!(error = %e, "full-text index unavailable; continuing without it");
      conn.execute_batch("ROLLBACK TO full_text; RELEASE full_text;")?;
      Ok(false)
    }
  }
}

/// 1 → 2: identity columns, backfill of every registered work, unique index.
fn apply_section_identity(
  conn: &Connection,
  corpus: &CorpusProfile,
  report: &mut MigrationReport,
) -> Result<()> {
  add_identity_columns(conn)?;
  for work in &corpus.works {
    report.backfills.push(backfill_scope(conn, work)?);
  }
  conn.execute_batch(IDENTITY_INDEXES)?;
  Ok(())
}

fn add_identity_columns(conn: &Connection) -> rusqlite::Result<()> {
  for column in IDENTITY_COLUMNS {
    if schema::add_column_if_absent(conn, "sections", column, "TEXT")? {
      tracing::info!(column, "added sections column");
    }
  }
  Ok(())
}

/// Identity columns and indexes on a `sections` table that has no rows.
fn apply_identity_schema(conn: &Connection) -> Result<()> {
  add_identity_columns(conn)?;
  conn.execute_batch(IDENTITY_INDEXES)?;
  Ok(())
}
