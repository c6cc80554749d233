//! Declarative normalization patches for known historical data defects.
//!
//! Each rule names a table, a predicate selecting the defective rows, and the
//! `SET` clause that corrects them. Work-scoped rules run once per registered
//! work with `:work_id`, `:book_id`, and `:version` bound; global rules run
//! once. Rules apply in table order, after migration and before the health
//! gate, and a rule whose predicate matches nothing writes nothing. A rule
//! that would move a section_uid onto one already in the target book scope
//! fails the whole set with `ERR_UID_DUPLICATE_GENERATED`.

use folio_core::{
  health::DuplicateUid,
  profile::{CorpusProfile, WorkProfile},
};
use rusqlite::{Connection, Statement};
use serde::Serialize;

use crate::{
  ContentDb, Error, Result,
  backfill::{DUPLICATE_SAMPLE_LIMIT, is_unique_violation},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchScope {
  PerWork,
  Global,
}

/// One `{ predicate, corrective action }` rule.
#[derive(Debug)]
pub struct Patch {
  pub name:      &'static str,
  pub table:     &'static str,
  pub scope:     PatchScope,
  pub predicate: &'static str,
  pub action:    &'static str,
}

pub const PATCHES: &[Patch] = &[
  Patch {
    name:      "section_book_id_missing",
    table:     "sections",
    scope:     PatchScope::PerWork,
    predicate: "work_id = :work_id AND (book_id IS NULL OR book_id = '')",
    action:    "book_id = :book_id",
  },
  Patch {
    name:      "section_book_id_mismatch",
    table:     "sections",
    scope:     PatchScope::PerWork,
    predicate: "work_id = :work_id AND book_id <> '' AND book_id <> :book_id",
    action:    "book_id = :book_id",
  },
  Patch {
    name:      "section_version_missing",
    table:     "sections",
    scope:     PatchScope::PerWork,
    predicate: "work_id = :work_id AND (version IS NULL OR version = '')",
    action:    "version = :version",
  },
  Patch {
    name:      "section_type_missing_root",
    table:     "sections",
    scope:     PatchScope::PerWork,
    predicate: "work_id = :work_id AND (type IS NULL OR type = '') AND parent_id IS NULL",
    action:    "type = 'main'",
  },
  Patch {
    name:      "section_type_missing_child",
    table:     "sections",
    scope:     PatchScope::PerWork,
    predicate: "work_id = :work_id AND (type IS NULL OR type = '') AND parent_id IS NOT NULL",
    action:    "type = 'sub'",
  },
  // Such parents were never part of an ancestor chain, so clearing them
  // leaves every derived section_uid unchanged.
  Patch {
    name:      "section_parent_dangling",
    table:     "sections",
    scope:     PatchScope::PerWork,
    predicate: "work_id = :work_id AND parent_id IS NOT NULL \
                AND parent_id NOT IN (SELECT id FROM sections WHERE work_id = :work_id)",
    action:    "parent_id = NULL",
  },
  Patch {
    name:      "paragraph_type_missing",
    table:     "paragraphs",
    scope:     PatchScope::Global,
    predicate: "is_arabic IS NULL",
    action:    "is_arabic = 0",
  },
];

/// Rows a rule corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
  pub patch:   &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub work_id: Option<String>,
  pub rows:    usize,
}

/// Apply [`PATCHES`] in one transaction. Only rules that changed rows are
/// reported.
pub async fn apply_patches(db: &ContentDb, corpus: &CorpusProfile) -> Result<Vec<PatchOutcome>> {
  let corpus = corpus.clone();
  db.run(move |conn| {
    let tx = conn.transaction()?;
    let outcomes = apply_patch_set(&tx, PATCHES, &corpus)?;
    tx.commit()?;
    Ok(outcomes)
  })
  .await
}

pub fn apply_patch_set(
  conn: &Connection,
  patches: &[Patch],
  corpus: &CorpusProfile,
) -> Result<Vec<PatchOutcome>> {
  let mut outcomes = Vec::new();

  for patch in patches {
    match patch.scope {
      PatchScope::Global => {
        if let Some(outcome) = apply_one(conn, patch, None)? {
          outcomes.push(outcome);
        }
      }
      PatchScope::PerWork => {
        for work in &corpus.works {
          if let Some(outcome) = apply_one(conn, patch, Some(work))? {
            outcomes.push(outcome);
          }
        }
      }
    }
  }

  Ok(outcomes)
}

fn apply_one(
  conn: &Connection,
  patch: &Patch,
  work: Option<&WorkProfile>,
) -> Result<Option<PatchOutcome>> {
  let mut count = conn.prepare(&format!(
    "SELECT COUNT(*) FROM {} WHERE {}",
    patch.table, patch.predicate
  ))?;
  bind_scope(&mut count, work)?;
  let matching: i64 = {
    let mut rows = count.raw_query();
    match rows.next()? {
      Some(row) => row.get(0)?,
      None => 0,
    }
  };
  if matching == 0 {
    return Ok(None);
  }

  let mut update = conn.prepare(&format!(
    "UPDATE {} SET {} WHERE {}",
    patch.table, patch.action, patch.predicate
  ))?;
  bind_scope(&mut update, work)?;
  let rows = update.raw_execute().map_err(|e| match work {
    Some(work) if is_unique_violation(&e) => {
      let duplicates = collisions(conn, patch, work).unwrap_or_else(|e| {
        tracing::warn!(patch = patch.name, error = %e, "failed to sample colliding section_uids");
        Vec::new()
      });
      tracing::error!(patch = patch.name, book_id = %work.book_id, ?duplicates, "patch would duplicate section_uid");
      Error::UidDuplicateGenerated { book_id: work.book_id.clone(), duplicates }
    }
    _ => Error::Sqlite(e),
  })?;

  tracing::info!(
    patch = patch.name,
    work_id = work.map(|w| w.work_id.as_str()),
    rows,
    "applied normalization patch"
  );

  Ok(Some(PatchOutcome {
    patch: patch.name,
    work_id: work.map(|w| w.work_id.clone()),
    rows,
  }))
}

/// Identifiers the rows matched by `patch` would share, once moved into the
/// work's book scope, with rows already there or with each other.
fn collisions(conn: &Connection, patch: &Patch, work: &WorkProfile) -> Result<Vec<DuplicateUid>> {
  if patch.table != "sections" {
    return Ok(Vec::new());
  }
  let limit = DUPLICATE_SAMPLE_LIMIT;
  let mut stmt = conn.prepare(&format!(
    "SELECT section_uid,
            COUNT(*) + (SELECT COUNT(*) FROM sections t
                         WHERE t.book_id = :book_id
                           AND t.section_uid = sections.section_uid) AS c
       FROM sections
      WHERE {predicate} AND section_uid IS NOT NULL AND section_uid <> ''
      GROUP BY section_uid
     HAVING c > 1
      ORDER BY c DESC, section_uid
      LIMIT {limit}",
    predicate = patch.predicate
  ))?;
  bind_scope(&mut stmt, Some(work))?;

  let mut duplicates = Vec::new();
  let mut rows = stmt.raw_query();
  while let Some(row) = rows.next()? {
    duplicates.push(DuplicateUid {
      book_id:     work.book_id.clone(),
      section_uid: row.get(0)?,
      count:       row.get::<_, i64>(1)? as u64,
    });
  }
  Ok(duplicates)
}

/// Bind whichever scope parameters the statement mentions.
fn bind_scope(stmt: &mut Statement<'_>, work: Option<&WorkProfile>) -> Result<()> {
  let Some(work) = work else { return Ok(()) };
  for (name, value) in [
    (":work_id", &work.work_id),
    (":book_id", &work.book_id),
    (":version", &work.version),
  ] {
    if let Some(index) = stmt.parameter_index(name)? {
      stmt.raw_bind_parameter(index, value)?;
    }
  }
  Ok(())
}
