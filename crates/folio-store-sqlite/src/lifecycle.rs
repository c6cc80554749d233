//! [`ContentLifecycle`], the startup orchestrator and sole owner of the
//! store handle.
//!
//! ```text
//! installer → open → migration → patches → gate ─┬─ healthy → report
//!                                                └─ defect → self-heal → gate
//! ```
//!
//! Installer, migration, and identity errors abort at once; only a defect
//! reported by the gate is eligible for self-heal. Every failure leaves as a
//! single [`FatalError`].

use folio_core::{
  fatal::FatalError,
  health::{Diagnostics, HealthReport},
};
use serde::Serialize;
use serde_json::json;

use crate::{
  ContentDb, Error, Result, Settings,
  health::{HealthGate, run_diagnostics},
  installer::{AssetInstaller, InstallOutcome},
  migration::{MigrationReport, migrate_if_needed},
  patches::{PatchOutcome, apply_patches},
  self_heal::{RepairOutcome, SelfHeal},
  state::StateStore,
};

/// Everything a successful [`ContentLifecycle::start`] did.
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
  pub install:   InstallOutcome,
  pub migration: MigrationReport,
  pub patches:   Vec<PatchOutcome>,
  pub health:    HealthReport,
  /// Present when the first gate pass failed and a repair ran.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub self_heal: Option<RepairOutcome>,
}

pub struct ContentLifecycle {
  settings: Settings,
  state:    StateStore,
  db:       Option<ContentDb>,
}

impl ContentLifecycle {
  pub fn new(settings: Settings) -> Result<Self> {
    settings.corpus.validate()?;
    let state = StateStore::new(settings.state_path());
    Ok(Self { settings, state, db: None })
  }

  pub fn settings(&self) -> &Settings { &self.settings }

  pub fn state(&self) -> &StateStore { &self.state }

  /// The open store, once [`start`](Self::start) has opened it.
  pub fn db(&self) -> Result<&ContentDb> { self.db.as_ref().ok_or(Error::StoreClosed) }

  /// Run the startup sequence.
  pub async fn start(&mut self) -> Result<StartupReport, FatalError> {
    let install = match AssetInstaller::new(&self.settings, &self.state).ensure_installed().await {
      Ok(outcome) => outcome,
      Err(e) => return Err(self.fatal(e).await),
    };

    let db = match self.ensure_open().await {
      Ok(db) => db,
      Err(e) => return Err(self.fatal(e).await),
    };
    let corpus = &self.settings.corpus;

    let migration = match migrate_if_needed(&db, corpus).await {
      Ok(report) => report,
      Err(e) => return Err(self.fatal(e).await),
    };

    let patches = match apply_patches(&db, corpus).await {
      Ok(patches) => patches,
      Err(e) => return Err(self.fatal(e).await),
    };

    let gate = HealthGate::new(&db, corpus, &self.state);
    let initial = match gate.check().await {
      Ok(report) => report,
      Err(e) => return Err(self.fatal(e).await),
    };

    let Some(defect) = initial.code.clone() else {
      return Ok(StartupReport { install, migration, patches, health: initial, self_heal: None });
    };

    let (outcome, after) = SelfHeal::new(&db, corpus, &self.state)
      .attempt_with_report(&defect)
      .await;
    // Without a post-repair gate pass the store is as the first pass saw it.
    let health = after.unwrap_or_else(|| initial.clone());

    if health.healthy {
      tracing::info!(initial = %defect, "content store recovered by self-heal");
      return Ok(StartupReport { install, migration, patches, health, self_heal: Some(outcome) });
    }

    let code = health.code.as_ref().unwrap_or(&defect).code();
    tracing::error!(%code, initial = %defect, ?outcome, "content store unusable; manual action required");

    let details = json!({
      "initialCode":       defect.code(),
      "selfHealAttempted": !matches!(outcome, RepairOutcome::AlreadyAttempted),
      "lockdown":          defect.is_lockdown(),
      "repair":            outcome,
      "defect":            health.details.clone().or_else(|| initial.details.clone()),
    });
    let diagnostics = self.fresh_diagnostics(health.diagnostics).await;

    Err(FatalError::new(code).with_details(details).with_diagnostics(diagnostics))
  }

  /// Manual full reinstall: close, replace the file, reset the descriptor
  /// and the self-heal flag, reopen.
  pub async fn reinstall(&mut self) -> Result<InstallOutcome> {
    self.close().await?;
    let outcome = AssetInstaller::new(&self.settings, &self.state).force_install().await?;
    self.state.clear_self_heal().await?;
    self.ensure_open().await?;
    tracing::info!("manual reinstall complete");
    Ok(outcome)
  }

  /// "Retry automatic repair".
  pub async fn reset_self_heal(&self) -> Result<()> { self.state.clear_self_heal().await }

  /// Run the gate against the installed store without installing anything.
  pub async fn check_health(&mut self) -> Result<HealthReport> {
    let db = self.open_installed().await?;
    HealthGate::new(&db, &self.settings.corpus, &self.state).check().await
  }

  pub async fn diagnostics(&mut self) -> Result<Diagnostics> {
    let db = self.open_installed().await?;
    run_diagnostics(&db, &self.settings.corpus).await
  }

  /// Release the store handle.
  pub async fn close(&mut self) -> Result<()> {
    if let Some(db) = self.db.take() {
      db.close().await?;
      tracing::debug!("content store closed");
    }
    Ok(())
  }

  async fn ensure_open(&mut self) -> Result<ContentDb> {
    if let Some(db) = &self.db {
      return Ok(db.clone());
    }
    let path = self.settings.installed_db();
    tracing::debug!(path = %path.display(), "opening content store");
    let db = ContentDb::open(&path).await?;
    self.db = Some(db.clone());
    Ok(db)
  }

  /// Like [`ensure_open`](Self::ensure_open), but never creates the file.
  async fn open_installed(&mut self) -> Result<ContentDb> {
    let installed = tokio::fs::try_exists(self.settings.installed_db())
      .await
      .unwrap_or(false);
    if self.db.is_none() && !installed {
      return Err(Error::StoreClosed);
    }
    self.ensure_open().await
  }

  /// Diagnostics from the open store, or `fallback` if there is none or the
  /// probe itself fails.
  async fn fresh_diagnostics(&self, fallback: Diagnostics) -> Diagnostics {
    let Some(db) = &self.db else { return fallback };
    match run_diagnostics(db, &self.settings.corpus).await {
      Ok(diagnostics) => diagnostics,
      Err(e) => {
        tracing::warn!(error = %e, "failed to collect final diagnostics");
        fallback
      }
    }
  }

  /// A structurally invalid store is also marked for replacement by the
  /// installer on the next launch.
  async fn fatal(&self, error: Error) -> FatalError {
    tracing::error!(code = error.code(), error = %error, "content lifecycle failed");
    if error.is_structural() {
      tracing::error!("installed store is structurally invalid; scheduling reinstall");
      if let Err(e) = self.state.set_schema_invalid(true).await {
        tracing::error!(error = %e, "failed to persist schema_invalid");
      }
    }
    let details = match &error {
      Error::BookIdNullPresent { work_id, count } => {
        json!({ "error": error.to_string(), "workId": work_id, "count": count })
      }
      Error::UidDuplicateGenerated { book_id, duplicates } => {
        json!({ "error": error.to_string(), "bookId": book_id, "duplicates": duplicates })
      }
      Error::SchemaInvalid { missing } => json!({ "error": error.to_string(), "missing": missing }),
      Error::Migration { version, .. } => json!({ "error": error.to_string(), "version": version }),
      _ => json!({ "error": error.to_string() }),
    };
    let fatal = FatalError::new(error.code()).with_details(details);

    // Nothing worth probing before the store exists.
    if matches!(
      error,
      Error::AssetMissing { .. } | Error::CopyFailed { .. } | Error::ChecksumMismatch { .. }
    ) {
      return fatal;
    }
    fatal.with_diagnostics(self.fresh_diagnostics(Diagnostics::default()).await)
  }
}
