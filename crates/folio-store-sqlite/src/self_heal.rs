//! One-shot self-heal controller.
//!
//! The attempt flag is persisted before any repair starts and is never
//! cleared automatically, so automation gets exactly one try per install
//! lifetime even if the repair itself crashes the process.

use folio_core::{
  defect::{DefectCode, RepairClass},
  health::HealthReport,
  profile::CorpusProfile,
};
use serde::Serialize;

use crate::{
  ContentDb, Result, backfill::backfill, health::HealthGate, migration::migrate_if_needed,
  state::StateStore,
};

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepairOutcome {
  /// A previous attempt exists; nothing was done.
  AlreadyAttempted,
  /// The defect is unrecoverable by automation; nothing was written.
  Lockdown,
  Repaired,
  StillUnhealthy { code: Option<String> },
  Failed { error: String },
}

impl RepairOutcome {
  pub fn succeeded(&self) -> bool { matches!(self, Self::Repaired) }
}

pub struct SelfHeal<'a> {
  db:     &'a ContentDb,
  corpus: &'a CorpusProfile,
  state:  &'a StateStore,
}

impl<'a> SelfHeal<'a> {
  pub fn new(db: &'a ContentDb, corpus: &'a CorpusProfile, state: &'a StateStore) -> Self {
    Self { db, corpus, state }
  }

  pub async fn has_attempted(&self) -> Result<bool> { self.state.self_heal_attempted().await }

  /// Manual reset ("retry automatic repair").
  pub async fn reset(&self) -> Result<()> {
    tracing::info!("self-heal flag reset");
    self.state.clear_self_heal().await
  }

  /// `true` only if the store is healthy after the repair.
  pub async fn attempt_repair(&self, defect: &DefectCode) -> bool {
    self.attempt(defect).await.succeeded()
  }

  pub async fn attempt(&self, defect: &DefectCode) -> RepairOutcome {
    self.attempt_with_report(defect).await.0
  }

  /// Like [`attempt`](Self::attempt), also returning the report of the gate
  /// pass that followed the repair, if one ran.
  pub async fn attempt_with_report(
    &self,
    defect: &DefectCode,
  ) -> (RepairOutcome, Option<HealthReport>) {
    match self.state.self_heal_attempted().await {
      Ok(false) => {}
      Ok(true) => {
        tracing::warn!(code = %defect, "self-heal already attempted; refusing to avoid a repair loop");
        return (RepairOutcome::AlreadyAttempted, None);
      }
      Err(e) => {
        tracing::error!(error = %e, "cannot read self-heal flag; refusing");
        return (RepairOutcome::Failed { error: e.to_string() }, None);
      }
    }

    if let Err(e) = self.state.mark_self_heal_attempted().await {
      tracing::error!(error = %e, "cannot persist self-heal flag; refusing");
      return (RepairOutcome::Failed { error: e.to_string() }, None);
    }

    let class = defect.repair_class();
    tracing::info!(code = %defect, ?class, "starting self-heal");

    match class {
      RepairClass::Lockdown => {
        tracing::warn!(code = %defect, "defect is unrecoverable by automation; manual reinstall required");
        return (RepairOutcome::Lockdown, None);
      }
      RepairClass::Additive => {
        if let Err(e) = self.migrate_and_backfill().await {
          tracing::error!(code = %defect, error = %e, "self-heal repair failed");
          return (RepairOutcome::Failed { error: e.to_string() }, None);
        }
      }
      RepairClass::Recheck => {}
    }

    match HealthGate::new(self.db, self.corpus, self.state).check().await {
      Ok(report) if report.healthy => {
        tracing::info!(code = %defect, "self-heal succeeded");
        (RepairOutcome::Repaired, Some(report))
      }
      Ok(report) => {
        tracing::warn!(code = %defect, after = ?report.code.as_ref().map(|c| c.code()), "store still unhealthy after self-heal");
        let code = report.code.as_ref().map(|c| c.code());
        (RepairOutcome::StillUnhealthy { code }, Some(report))
      }
      Err(e) => (RepairOutcome::Failed { error: e.to_string() }, None),
    }
  }

  async fn migrate_and_backfill(&self) -> Result<()> {
    migrate_if_needed(self.db, self.corpus).await?;
    for work in &self.corpus.works {
      backfill(self.db, work).await?;
    }
    Ok(())
  }
}
