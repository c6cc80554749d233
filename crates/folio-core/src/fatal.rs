//! The structured fatal error handed to the application shell.
//!
//! The shell catches it, reads `code`, and routes to the recovery screen
//! ("retry automatic repair" / "manual full reinstall").

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::health::Diagnostics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatalError {
  pub code:        String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details:     Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub diagnostics: Option<Diagnostics>,
}

impl FatalError {
  pub fn new(code: impl Into<String>) -> Self {
    Self { code: code.into(), details: None, diagnostics: None }
  }

  pub fn with_details(mut self, details: serde_json::Value) -> Self {
    self.details = Some(details);
    self
  }

  pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
    self.diagnostics = Some(diagnostics);
    self
  }

  /// The JSON message carried by the error.
  pub fn message(&self) -> String {
    serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"code\":{:?}}}", self.code))
  }

  /// Parse a message produced by [`FatalError::message`].
  pub fn from_message(message: &str) -> crate::Result<Self> {
    Ok(serde_json::from_str(message)?)
  }
}

impl fmt::Display for FatalError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.message()) }
}

impl std::error::Error for FatalError {}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn message_roundtrips_through_shell() {
    let err = FatalError::new("ERR_SOZLER_MISSING")
      .with_details(json!({ "selfHealAttempted": true }))
      .with_diagnostics(Diagnostics { integrity_check: "ok".into(), ..Default::default() });

    let parsed = FatalError::from_message(&err.to_string()).unwrap();
    assert_eq!(parsed, err);
  }

  #[test]
  fn bare_error_omits_optional_fields() {
    assert_eq!(FatalError::new("ERR_ASSET_MISSING").message(), r#"{"code":"ERR_ASSET_MISSING"}"#);
  }
}
