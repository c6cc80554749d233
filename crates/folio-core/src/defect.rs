//! Health-gate defect codes and the repair class each one maps to.

use std::fmt;

use serde::{Serialize, Serializer};

/// A defect reported by the health gate, in checklist priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefectCode {
  /// `PRAGMA integrity_check` did not report `ok`.
  DbIntegrityFail,
  /// `sections` lacks one of the identity columns.
  SchemaColumnsMissing,
  /// The unique `(book_id, section_uid)` index is absent.
  UniqueIndexMissing,
  SchemaVersionLow,
  /// The flagship work has no sections at all.
  WorkMissing { work_id: String },
  /// A flagship section has no stable identifier.
  UidNull,
  MainSectionsMissing,
  /// Two sections share a `(book_id, section_uid)` pair.
  UidDuplicate,
  /// A checklist query failed unexpectedly.
  CheckException,
}

/// How the self-heal controller treats a defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairClass {
  /// Re-run migration and backfill.
  Additive,
  /// Never repaired automatically; manual reinstall only.
  Lockdown,
  /// No write; re-check to see whether the condition was transient.
  Recheck,
}

impl DefectCode {
  /// Stable string code surfaced to the application shell.
  pub fn code(&self) -> String {
    match self {
      Self::DbIntegrityFail => "ERR_DB_INTEGRITY_FAIL".into(),
      Self::SchemaColumnsMissing => "ERR_SCHEMA_COLUMNS_MISSING".into(),
      Self::UniqueIndexMissing => "ERR_UNIQUE_INDEX_MISSING".into(),
      Self::SchemaVersionLow => "ERR_SCHEMA_VERSION_LOW".into(),
      Self::WorkMissing { work_id } => format!("ERR_{}_MISSING", code_segment(work_id)),
      Self::UidNull => "ERR_UID_NULL".into(),
      Self::MainSectionsMissing => "ERR_MAIN_SECTIONS_MISSING".into(),
      Self::UidDuplicate => "ERR_UID_DUPLICATE".into(),
      Self::CheckException => "ERR_CHECK_EXCEPTION".into(),
    }
  }

  pub fn repair_class(&self) -> RepairClass {
    match self {
      Self::SchemaVersionLow | Self::UidNull => RepairClass::Additive,
      Self::WorkMissing { .. } | Self::DbIntegrityFail => RepairClass::Lockdown,
      _ => RepairClass::Recheck,
    }
  }

  pub fn is_lockdown(&self) -> bool { self.repair_class() == RepairClass::Lockdown }
}

/// Uppercase ASCII alphanumerics; everything else becomes `_`.
fn code_segment(work_id: &str) -> String {
  work_id
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
    .collect()
}

impl fmt::Display for DefectCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.code()) }
}

impl Serialize for DefectCode {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.code())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn work_missing_code_is_derived_from_work_id() {
    let code = DefectCode::WorkMissing { work_id: "sozler".into() };
    assert_eq!(code.code(), "ERR_SOZLER_MISSING");

    let code = DefectCode::WorkMissing { work_id: "barla-lahikasi".into() };
    assert_eq!(code.code(), "ERR_BARLA_LAHIKASI_MISSING");
  }

  #[test]
  fn repair_classes() {
    assert_eq!(DefectCode::SchemaVersionLow.repair_class(), RepairClass::Additive);
    assert_eq!(DefectCode::UidNull.repair_class(), RepairClass::Additive);
    assert!(DefectCode::DbIntegrityFail.is_lockdown());
    assert!(DefectCode::WorkMissing { work_id: "x".into() }.is_lockdown());
    assert_eq!(DefectCode::UidDuplicate.repair_class(), RepairClass::Recheck);
    assert_eq!(DefectCode::UniqueIndexMissing.repair_class(), RepairClass::Recheck);
  }

  #[test]
  fn serializes_as_code_string() {
    let json = serde_json::to_string(&DefectCode::UidNull).unwrap();
    assert_eq!(json, "\"ERR_UID_NULL\"");
  }
}
