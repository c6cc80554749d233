//! Asset installer: copies the packaged store into private storage when the
//! installed copy is absent, stale, or marked structurally invalid.
//!
//! The installed descriptor is written only after the copy has been verified
//! and moved into place, so a crash at any point simply repeats the install
//! on the next launch.

use std::path::{Path, PathBuf};

use folio_core::descriptor::ContentDescriptor;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt as _;

use crate::{
  Error, Result, Settings,
  state::{StateStore, read_json, temp_sibling, write_json_atomic},
};

/// SQLite files that live next to the store and must go with it.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstallReason {
  /// A previous launch found the installed file unusable.
  MarkedInvalid,
  DatabaseMissing,
  DescriptorChanged {
    installed: Option<ContentDescriptor>,
    bundled:   ContentDescriptor,
  },
  /// Explicit user-requested reinstall.
  Forced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
  UpToDate,
  Installed { reason: InstallReason },
}

pub struct AssetInstaller<'a> {
  settings: &'a Settings,
  state:    &'a StateStore,
}

impl<'a> AssetInstaller<'a> {
  pub fn new(settings: &'a Settings, state: &'a StateStore) -> Self { Self { settings, state } }

  /// Install the bundled store if needed.
  pub async fn ensure_installed(&self) -> Result<InstallOutcome> {
    let bundled = self.bundled_descriptor().await?;
    let installed = self.installed_descriptor().await;
    let db_path = self.settings.installed_db();
    let db_exists = tokio::fs::try_exists(&db_path).await.unwrap_or(false);
    let marked_invalid = self.state.load().await?.schema_invalid;

    let reason = if marked_invalid {
      InstallReason::MarkedInvalid
    } else if !db_exists {
      InstallReason::DatabaseMissing
    } else if bundled.is_stale(installed.as_ref()) {
      InstallReason::DescriptorChanged { installed, bundled: bundled.clone() }
    } else {
      tracing::debug!(version = %bundled.version, "installed content is current");
      return Ok(InstallOutcome::UpToDate);
    };

    tracing::info!(?reason, "installing bundled content store");
    self.install(&bundled).await?;
    Ok(InstallOutcome::Installed { reason })
  }

  /// Unconditional reinstall. The installed descriptor is removed first so an
  /// interrupted reinstall is retried on the next launch.
  pub async fn force_install(&self) -> Result<InstallOutcome> {
    let bundled = self.bundled_descriptor().await?;
    let descriptor = self.settings.installed_descriptor();
    remove_if_exists(&descriptor)
      .await
      .map_err(|source| Error::State { path: descriptor.clone(), source })?;
    tracing::info!(version = %bundled.version, "reinstalling bundled content store");
    self.install(&bundled).await?;
    Ok(InstallOutcome::Installed { reason: InstallReason::Forced })
  }

  async fn install(&self, bundled: &ContentDescriptor) -> Result<()> {
    copy_into_place(&self.settings.bundled_db(), &self.settings.installed_db()).await?;
    write_json_atomic(&self.settings.installed_descriptor(), bundled).await?;
    if self.state.load().await?.schema_invalid {
      self.state.set_schema_invalid(false).await?;
    }
    tracing::info!(version = %bundled.version, build_date = %bundled.build_date, "content store installed");
    Ok(())
  }

  async fn bundled_descriptor(&self) -> Result<ContentDescriptor> {
    let db = self.settings.bundled_db();
    if !tokio::fs::try_exists(&db).await.unwrap_or(false) {
      return Err(Error::AssetMissing { path: db });
    }

    let path = self.settings.bundled_descriptor();
    match read_json::<ContentDescriptor>(&path).await {
      Ok(Some(descriptor)) => Ok(descriptor),
      Ok(None) => Err(Error::AssetMissing { path }),
      Err(e) => {
        tracing::error!(path = %path.display(), error = %e, "bundled descriptor is unreadable");
        Err(Error::AssetMissing { path })
      }
    }
  }

  /// Absent or unparsable descriptors both read as `None` (stale).
  async fn installed_descriptor(&self) -> Option<ContentDescriptor> {
    let path = self.settings.installed_descriptor();
    match read_json::<ContentDescriptor>(&path).await {
      Ok(descriptor) => descriptor,
      Err(e) => {
        tracing::warn!(path = %path.display(), error = %e, "installed descriptor unreadable; forcing reinstall");
        None
      }
    }
  }
}

// ─── File operations ─────────────────────────────────────────────────────────

/// Copy `from` to a temporary sibling of `to`, fsync and verify it, remove the
/// old store with its sidecars, then rename the copy over `to`.
async fn copy_into_place(from: &Path, to: &Path) -> Result<()> {
  let copy_err = |source: std::io::Error| Error::CopyFailed {
    from: from.to_path_buf(),
    to: to.to_path_buf(),
    source,
  };

  if let Some(parent) = to.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent).await.map_err(copy_err)?;
  }

  let tmp = temp_sibling(to);
  tokio::fs::copy(from, &tmp).await.map_err(copy_err)?;
  tokio::fs::File::open(&tmp)
    .await
    .map_err(copy_err)?
    .sync_all()
    .await
    .map_err(copy_err)?;

  let expected = sha256_file(from).await.map_err(copy_err)?;
  let actual = sha256_file(&tmp).await.map_err(copy_err)?;
  if expected != actual {
    let _ = tokio::fs::remove_file(&tmp).await;
    return Err(Error::ChecksumMismatch { expected, actual });
  }

  remove_store_files(to).await.map_err(copy_err)?;
  tokio::fs::rename(&tmp, to).await.map_err(copy_err)?;
  Ok(())
}

/// Delete the store file and its sidecars; missing files are fine.
pub(crate) async fn remove_store_files(db_path: &Path) -> std::io::Result<()> {
  remove_if_exists(db_path).await?;
  for suffix in SIDECAR_SUFFIXES {
    remove_if_exists(&sidecar(db_path, suffix)).await?;
  }
  Ok(())
}

fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
  let mut name = db_path.as_os_str().to_os_string();
  name.push(suffix);
  PathBuf::from(name)
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
  match tokio::fs::remove_file(path).await {
    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}

async fn sha256_file(path: &Path) -> std::io::Result<String> {
  let mut file = tokio::fs::File::open(path).await?;
  let mut hasher = Sha256::new();
  let mut buf = vec![0u8; 64 * 1024];
  loop {
    let n = file.read(&mut buf).await?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }
  Ok(hex::encode(hasher.finalize()))
}
