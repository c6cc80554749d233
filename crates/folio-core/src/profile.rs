//! The corpus profile: which works the lifecycle manages and the canonical
//! book scope and version tag stamped onto their sections.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Canonical identity of one registered work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkProfile {
  /// Value of `sections.work_id` for this work.
  pub work_id: String,
  /// Book scope written to `sections.book_id`; the uniqueness partition for
  /// stable identifiers.
  pub book_id: String,
  /// Content version tag written to `sections.version`.
  pub version: String,
}

impl WorkProfile {
  pub fn new(
    work_id: impl Into<String>,
    book_id: impl Into<String>,
    version: impl Into<String>,
  ) -> Self {
    Self {
      work_id: work_id.into(),
      book_id: book_id.into(),
      version: version.into(),
    }
  }
}

/// All works known to the lifecycle, plus the flagship the health gate checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusProfile {
  /// `work_id` of the primary work.
  pub flagship: String,
  pub works:    Vec<WorkProfile>,
}

impl Default for CorpusProfile {
  fn default() -> Self {
    Self {
      flagship: "sozler".into(),
      works:    vec![WorkProfile::new("sozler", "risale.sozler@diyanet.tr", "1.0.0")],
    }
  }
}

impl CorpusProfile {
  /// Check that the flagship is registered and no work is listed twice.
  pub fn validate(&self) -> Result<()> {
    for (i, work) in self.works.iter().enumerate() {
      if self.works[..i].iter().any(|w| w.work_id == work.work_id) {
        return Err(Error::DuplicateWork(work.work_id.clone()));
      }
    }
    if self.work(&self.flagship).is_none() {
      return Err(Error::FlagshipUnregistered(self.flagship.clone()));
    }
    Ok(())
  }

  pub fn work(&self, work_id: &str) -> Option<&WorkProfile> {
    self.works.iter().find(|w| w.work_id == work_id)
  }

  pub fn flagship_work(&self) -> Result<&WorkProfile> {
    self
      .work(&self.flagship)
      .ok_or_else(|| Error::FlagshipUnregistered(self.flagship.clone()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_profile_is_valid() {
    let profile = CorpusProfile::default();
    profile.validate().unwrap();
    assert_eq!(profile.flagship_work().unwrap().book_id, "risale.sozler@diyanet.tr");
  }

  #[test]
  fn unregistered_flagship_is_rejected() {
    let profile = CorpusProfile {
      flagship: "mektubat".into(),
      works:    vec![WorkProfile::new("sozler", "a", "1")],
    };
    assert!(matches!(profile.validate(), Err(Error::FlagshipUnregistered(w)) if w == "mektubat"));
  }

  #[test]
  fn duplicate_work_is_rejected() {
    let profile = CorpusProfile {
      flagship: "sozler".into(),
      works:    vec![
        WorkProfile::new("sozler", "a", "1"),
        WorkProfile::new("sozler", "b", "1"),
      ],
    };
    assert!(matches!(profile.validate(), Err(Error::DuplicateWork(_))));
  }
}
