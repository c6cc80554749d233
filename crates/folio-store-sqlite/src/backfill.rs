//! Deterministic identity backfill.
//!
//! Fills `section_uid` for sections that lack one, deriving it from the
//! section's normalized title, position, and ancestor chain
//! (see [`folio_core::identity`]). Identifiers that already exist are never
//! touched. After every pass two guards run over the whole book scope and
//! fail the pass on a missing book scope or a duplicate identifier.

use std::collections::{HashMap, HashSet};

use folio_core::{
  health::DuplicateUid,
  identity::{Ancestor, Position, SectionSeed},
  profile::WorkProfile,
};
use rusqlite::{Connection, ErrorCode, types::ValueRef};
use serde::Serialize;

use crate::{ContentDb, Error, Result};

/// Upper bound on duplicate samples carried in an error.
pub(crate) const DUPLICATE_SAMPLE_LIMIT: usize = 20;

/// What one backfill pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
  pub work_id:    String,
  /// Rows whose empty `book_id` or `version` was filled.
  pub normalized: usize,
  /// Rows that received a new `section_uid`.
  pub assigned:   usize,
}

/// A section as the seed builder sees it.
#[derive(Debug)]
struct SectionNode {
  id:          String,
  parent_id:   Option<String>,
  title:       String,
  position:    Position,
  missing_uid: bool,
}

/// Backfill one work inside its own transaction. A failed guard rolls back
/// every write of the pass.
pub async fn backfill(db: &ContentDb, work: &WorkProfile) -> Result<BackfillReport> {
  let work = work.clone();
  db.run(move |conn| {
    let tx = conn.transaction()?;
    let report = backfill_scope(&tx, &work)?;
    tx.commit()?;
    Ok(report)
  })
  .await
}

/// Backfill one work on an existing connection or transaction.
pub fn backfill_scope(conn: &Connection, work: &WorkProfile) -> Result<BackfillReport> {
  tracing::info!(work_id = %work.work_id, book_id = %work.book_id, "starting section_uid backfill");

  // 1. Canonical book scope and version tag.
  let normalized = conn.execute(
    "UPDATE sections
        SET book_id = COALESCE(NULLIF(book_id, ''), ?1),
            version = COALESCE(NULLIF(version, ''), ?2)
      WHERE work_id = ?3
        AND (book_id IS NULL OR book_id = '' OR version IS NULL OR version = '')",
    rusqlite::params![work.book_id, work.version, work.work_id],
  )?;
  if normalized > 0 {
    tracing::info!(work_id = %work.work_id, normalized, "normalized book_id/version");
  }

  // 2. Candidates, in position order.
  let nodes = load_sections(conn, &work.work_id)?;
  let by_id: HashMap<&str, &SectionNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

  let mut assigned = 0;
  for node in nodes.iter().filter(|n| n.missing_uid) {
    // 3–4. Seed and identifier.
    let chain = ancestor_chain(node, &by_id);
    let seed = SectionSeed::new(&node.title, node.position, &chain);
    let uid = seed.uid();
    tracing::debug!(section_id = %node.id, %seed, %uid, "derived section_uid");

    // 5. Write.
    let written = conn
      .execute(
        "UPDATE sections
            SET section_uid = ?1,
                book_id     = COALESCE(NULLIF(book_id, ''), ?2),
                version     = COALESCE(NULLIF(version, ''), ?3)
          WHERE id = ?4
            AND (section_uid IS NULL OR section_uid = '')",
        rusqlite::params![uid, work.book_id, work.version, node.id],
      )
      .map_err(|e| {
        if is_unique_violation(&e) {
          Error::UidDuplicateGenerated {
            book_id:    work.book_id.clone(),
            duplicates: vec![DuplicateUid {
              book_id:     work.book_id.clone(),
              section_uid: uid.clone(),
              count:       2,
            }],
          }
        } else {
          Error::Sqlite(e)
        }
      })?;
    assigned += written;
  }
  tracing::info!(work_id = %work.work_id, assigned, "section_uid backfill written");

  // 6. Guards over the whole scope.
  guard_book_scope(conn, work)?;
  guard_unique_uids(conn, work)?;

  Ok(BackfillReport { work_id: work.work_id.clone(), normalized, assigned })
}

fn load_sections(conn: &Connection, work_id: &str) -> Result<Vec<SectionNode>> {
  let mut stmt = conn.prepare(
    "SELECT id, parent_id, title, order_index,
            (section_uid IS NULL OR section_uid = '') AS missing_uid
       FROM sections
      WHERE work_id = ?1
      ORDER BY order_index ASC",
  )?;
  let nodes = stmt
    .query_map([work_id], |row| {
      Ok(SectionNode {
        id:          row.get(0)?,
        parent_id:   row.get(1)?,
        title:       row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        position:    position_from(row.get_ref(3)?),
        missing_uid: row.get(4)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(nodes)
}

fn position_from(value: ValueRef<'_>) -> Position {
  match value {
    ValueRef::Integer(n) => Position::Index(n),
    ValueRef::Real(x) => Position::from_real(x),
    ValueRef::Text(t) => std::str::from_utf8(t)
      .ok()
      .and_then(|s| s.trim().parse::<i64>().ok())
      .map_or(Position::Missing, Position::Index),
    ValueRef::Null | ValueRef::Blob(_) => Position::Missing,
  }
}

/// Ancestors of `node`, outermost first. Walking stops at a parent outside
/// the work or at a cycle.
fn ancestor_chain(node: &SectionNode, by_id: &HashMap<&str, &SectionNode>) -> Vec<Ancestor> {
  let mut chain = Vec::new();
  let mut seen: HashSet<&str> = HashSet::from([node.id.as_str()]);
  let mut current = node;

  while let Some(parent_id) = current.parent_id.as_deref() {
    let Some(parent) = by_id.get(parent_id).copied() else { break };
    if !seen.insert(parent.id.as_str()) {
      tracing::warn!(section_id = %node.id, "cycle in section parent chain");
      break;
    }
    chain.push(Ancestor { title: parent.title.clone(), position: parent.position });
    current = parent;
  }

  chain.reverse();
  chain
}

fn guard_book_scope(conn: &Connection, work: &WorkProfile) -> Result<()> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM sections WHERE work_id = ?1 AND (book_id IS NULL OR book_id = '')",
    [&work.work_id],
    |r| r.get(0),
  )?;
  if count > 0 {
    tracing::error!(work_id = %work.work_id, count, "sections without book_id after normalization");
    return Err(Error::BookIdNullPresent { work_id: work.work_id.clone(), count: count as u64 });
  }
  Ok(())
}

fn guard_unique_uids(conn: &Connection, work: &WorkProfile) -> Result<()> {
  let duplicates = duplicate_uids(conn, Some(&work.book_id), DUPLICATE_SAMPLE_LIMIT)?;
  if !duplicates.is_empty() {
    tracing::error!(book_id = %work.book_id, ?duplicates, "duplicate section_uid after backfill");
    return Err(Error::UidDuplicateGenerated { book_id: work.book_id.clone(), duplicates });
  }
  Ok(())
}

/// `(book_id, section_uid)` pairs held by more than one section, optionally
/// restricted to one book scope. Rows without a book scope never collide,
/// matching the unique index.
pub(crate) fn duplicate_uids(
  conn: &Connection,
  book_id: Option<&str>,
  limit: usize,
) -> rusqlite::Result<Vec<DuplicateUid>> {
  let mut stmt = conn.prepare(
    "SELECT book_id, section_uid, COUNT(*) AS c
       FROM sections
      WHERE section_uid IS NOT NULL AND section_uid <> ''
        AND book_id IS NOT NULL AND book_id <> ''
        AND (?1 IS NULL OR book_id = ?1)
      GROUP BY book_id, section_uid
     HAVING c > 1
      ORDER BY c DESC, section_uid
      LIMIT ?2",
  )?;
  let duplicates = stmt
    .query_map(rusqlite::params![book_id, limit as i64], |row| {
      Ok(DuplicateUid {
        book_id:     row.get::<_, Option<String>>(0)?.unwrap_or_default(),
        section_uid: row.get(1)?,
        count:       row.get::<_, i64>(2)? as u64,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(duplicates)
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}
