//! File-backed persistence for [`LifecycleState`] and small JSON records.

use std::path::{Path, PathBuf};

use folio_core::{health::Fingerprint, state::LifecycleState};
use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, Result};

/// Loads and saves the lifecycle state file. Every save replaces the file
/// atomically.
#[derive(Debug, Clone)]
pub struct StateStore {
  path: PathBuf,
}

impl StateStore {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }

  /// Missing file → defaults. Unreadable file → [`LifecycleState::fail_closed`].
  pub async fn load(&self) -> Result<LifecycleState> {
    match read_json::<LifecycleState>(&self.path).await {
      Ok(Some(state)) => Ok(state),
      Ok(None) => Ok(LifecycleState::default()),
      Err(Error::Json(e)) => {
        tracing::warn!(path = %self.path.display(), error = %e, "unreadable lifecycle state; blocking self-heal");
        Ok(LifecycleState::fail_closed())
      }
      Err(e) => Err(e),
    }
  }

  pub async fn save(&self, state: &LifecycleState) -> Result<()> {
    write_json_atomic(&self.path, state).await
  }

  /// Load, apply `f`, save.
  pub async fn update(&self, f: impl FnOnce(&mut LifecycleState)) -> Result<LifecycleState> {
    let mut state = self.load().await?;
    f(&mut state);
    self.save(&state).await?;
    Ok(state)
  }

  pub async fn self_heal_attempted(&self) -> Result<bool> {
    Ok(self.load().await?.self_heal_attempted)
  }

  pub async fn mark_self_heal_attempted(&self) -> Result<()> {
    self.update(|s| s.self_heal_attempted = true).await.map(drop)
  }

  pub async fn clear_self_heal(&self) -> Result<()> {
    self.update(|s| s.self_heal_attempted = false).await.map(drop)
  }

  pub async fn set_schema_invalid(&self, invalid: bool) -> Result<()> {
    self.update(|s| s.schema_invalid = invalid).await.map(drop)
  }

  /// Replace the stored fingerprint, returning the previous one.
  pub async fn swap_fingerprint(&self, fingerprint: Fingerprint) -> Result<Option<Fingerprint>> {
    let mut previous = None;
    self
      .update(|s| previous = s.last_fingerprint.replace(fingerprint))
      .await?;
    Ok(previous)
  }
}

// ─── JSON file helpers ───────────────────────────────────────────────────────

/// `Ok(None)` when the file does not exist.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
  match tokio::fs::read(path).await {
    Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(source) => Err(Error::State { path: path.to_path_buf(), source }),
  }
}

/// Write to a sibling temporary file, then rename over `path`.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  let bytes = serde_json::to_vec_pretty(value)?;
  let io_err = |source: std::io::Error| Error::State { path: path.to_path_buf(), source };

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
  }

  let tmp = temp_sibling(path);
  tokio::fs::write(&tmp, &bytes).await.map_err(io_err)?;
  tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
  Ok(())
}

pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".tmp");
  path.with_file_name(name)
}
