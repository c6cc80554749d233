//! Health-gate records: the advisory fingerprint, the diagnostics bundle, and
//! the gate's verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defect::DefectCode;

// ─── Fingerprint ─────────────────────────────────────────────────────────────

/// Snapshot of store health metrics for the flagship work. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
  pub schema_version:      i64,
  pub section_count:       u64,
  pub null_uid_count:      u64,
  pub duplicate_uid_count: u64,
  pub main_section_count:  u64,
  pub null_book_id_count:  u64,
  pub taken_at:            DateTime<Utc>,
}

/// A metric that changed between two fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintDrift {
  pub field:    &'static str,
  pub previous: i64,
  pub current:  i64,
}

impl Fingerprint {
  /// Metrics that differ from `previous`. The timestamp is ignored.
  pub fn drift(&self, previous: &Fingerprint) -> Vec<FingerprintDrift> {
    let pairs: [(&'static str, i64, i64); 6] = [
      ("schemaVersion", previous.schema_version, self.schema_version),
      ("sectionCount", previous.section_count as i64, self.section_count as i64),
      ("nullUidCount", previous.null_uid_count as i64, self.null_uid_count as i64),
      (
        "duplicateUidCount",
        previous.duplicate_uid_count as i64,
        self.duplicate_uid_count as i64,
      ),
      (
        "mainSectionCount",
        previous.main_section_count as i64,
        self.main_section_count as i64,
      ),
      (
        "nullBookIdCount",
        previous.null_book_id_count as i64,
        self.null_book_id_count as i64,
      ),
    ];

    pairs
      .into_iter()
      .filter(|(_, before, after)| before != after)
      .map(|(field, previous, current)| FingerprintDrift { field, previous, current })
      .collect()
  }
}

// ─── Diagnostics ─────────────────────────────────────────────────────────────

/// An entry of `PRAGMA index_list(sections)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
  pub name:   String,
  pub unique: bool,
}

/// A `(book_id, section_uid)` pair held by more than one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateUid {
  pub book_id:     String,
  pub section_uid: String,
  pub count:       u64,
}

/// Everything the gate learned about the store, collected whether or not a
/// check fails. A probe that could not run leaves its field `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
  pub integrity_check:         String,
  pub quick_check:             String,
  pub foreign_key_violations:  Option<u64>,
  pub orphan_paragraph_count:  Option<u64>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub orphan_paragraph_sample: Vec<String>,
  pub user_version:            Option<i64>,
  #[serde(default)]
  pub section_indexes:         Vec<IndexInfo>,
  pub null_uid_count:          Option<u64>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub null_uid_sample:         Vec<String>,
  pub duplicate_uid_count:     Option<u64>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub duplicate_uid_sample:    Vec<DuplicateUid>,
  pub null_book_id_count:      Option<u64>,
}

impl Diagnostics {
  pub fn integrity_ok(&self) -> bool { self.integrity_check.eq_ignore_ascii_case("ok") }
}

// ─── Verdict ─────────────────────────────────────────────────────────────────

/// Outcome of one pass over the health checklist.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
  pub healthy:     bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub code:        Option<DefectCode>,
  /// Absent when the store failed before the fingerprint could be computed.
  pub fingerprint: Option<Fingerprint>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details:     Option<serde_json::Value>,
  pub diagnostics: Diagnostics,
}

impl HealthReport {
  pub fn healthy(fingerprint: Fingerprint, diagnostics: Diagnostics) -> Self {
    Self {
      healthy: true,
      code: None,
      fingerprint: Some(fingerprint),
      details: None,
      diagnostics,
    }
  }

  pub fn defect(
    code: DefectCode,
    fingerprint: Option<Fingerprint>,
    details: Option<serde_json::Value>,
    diagnostics: Diagnostics,
  ) -> Self {
    Self { healthy: false, code: Some(code), fingerprint, details, diagnostics }
  }
}
