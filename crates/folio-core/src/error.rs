//! Error types for `folio-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("flagship work {0:?} is not registered in the corpus profile")]
  FlagshipUnregistered(String),

  #[error("work {0:?} is registered more than once")]
  DuplicateWork(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
