//! Lifecycle state persisted outside the content store.

use serde::{Deserialize, Serialize};

use crate::health::Fingerprint;

/// Flags that must survive process restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LifecycleState {
  /// Set the instant an automatic repair begins; cleared only by explicit
  /// user action.
  pub self_heal_attempted: bool,
  /// The installed store could not be migrated into a valid shape and must
  /// be replaced by the installer on the next launch.
  pub schema_invalid:      bool,
  /// Fingerprint from the last healthy gate pass.
  pub last_fingerprint:    Option<Fingerprint>,
}

impl LifecycleState {
  /// State assumed when the persisted file exists but cannot be read:
  /// automatic repair stays blocked.
  pub fn fail_closed() -> Self {
    Self { self_heal_attempted: true, ..Self::default() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_fields_default() {
    let state: LifecycleState = serde_json::from_str(r#"{"selfHealAttempted":true}"#).unwrap();
    assert!(state.self_heal_attempted);
    assert!(!state.schema_invalid);
    assert!(state.last_fingerprint.is_none());
  }

  #[test]
  fn fail_closed_blocks_repair() {
    assert!(LifecycleState::fail_closed().self_heal_attempted);
  }
}
