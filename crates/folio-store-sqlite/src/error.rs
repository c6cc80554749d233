//! Error type for `folio-store-sqlite`.

use std::path::PathBuf;

use folio_core::health::DuplicateUid;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] folio_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// The packaged store or its descriptor is not where the bundle says.
  #[error("bundled asset not found: {}", path.display())]
  AssetMissing { path: PathBuf },

  #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
  CopyFailed {
    from:   PathBuf,
    to:     PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("copied store checksum {actual} does not match bundled {expected}")]
  ChecksumMismatch { expected: String, actual: String },

  #[error("{count} section(s) of work {work_id:?} have no book_id after normalization")]
  BookIdNullPresent { work_id: String, count: u64 },

  #[error("duplicate section_uid generated in book scope {book_id:?}: {duplicates:?}")]
  UidDuplicateGenerated {
    book_id:    String,
    duplicates: Vec<DuplicateUid>,
  },

  #[error("required tables missing after migration: {missing:?}")]
  SchemaInvalid { missing: Vec<String> },

  #[error("migration to schema version {version} failed: {source}")]
  Migration {
    version: i64,
    #[source]
    source:  Box<Error>,
  },

  #[error("lifecycle state I/O failed at {}: {source}", path.display())]
  State {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("content store is not open")]
  StoreClosed,
}

impl Error {
  /// Stable string code for the fatal error contract.
  pub fn code(&self) -> &'static str {
    match self {
      Self::AssetMissing { .. } => "ERR_ASSET_MISSING",
      Self::CopyFailed { .. } | Self::ChecksumMismatch { .. } => "ERR_COPY_FAILED",
      Self::BookIdNullPresent { .. } => "ERR_BOOK_ID_NULL_PRESENT",
      Self::UidDuplicateGenerated { .. } => "ERR_UID_DUPLICATE_GENERATED",
      Self::SchemaInvalid { .. } => "ERR_SCHEMA_INVALID",
      Self::Migration { source, .. } if source.is_identity_error() => source.code(),
      Self::Migration { .. } => "ERR_MIGRATION_FAILED",
      Self::State { .. } => "ERR_STATE_IO",
      Self::StoreClosed => "ERR_STORE_CLOSED",
      Self::Core(_) => "ERR_CONFIG_INVALID",
      Self::Database(_) | Self::Sqlite(_) | Self::Json(_) => "ERR_DATABASE",
    }
  }

  /// Backfill guard failures; always fatal, never self-healed.
  pub fn is_identity_error(&self) -> bool {
    match self {
      Self::BookIdNullPresent { .. } | Self::UidDuplicateGenerated { .. } => true,
      Self::Migration { source, .. } => source.is_identity_error(),
      _ => false,
    }
  }

  /// The SQLite primary result code behind this error, if any.
  pub fn sqlite_code(&self) -> Option<ErrorCode> {
    match self {
      Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => Some(e.code),
      Self::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))) => {
        Some(e.code)
      }
      Self::Migration { source, .. } => source.sqlite_code(),
      _ => None,
    }
  }

  /// The file is not a usable SQLite database at all.
  pub fn is_structural(&self) -> bool {
    matches!(self, Self::SchemaInvalid { .. })
      || matches!(
        self.sqlite_code(),
        Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
      )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
