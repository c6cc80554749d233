//! The installed-content descriptor bundled next to the packaged store.

use serde::{Deserialize, Serialize};

/// `{ "version": …, "buildDate": … }`, compared by equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDescriptor {
  pub version:    String,
  pub build_date: String,
}

impl ContentDescriptor {
  /// `true` when `installed` is absent or differs in any field.
  pub fn is_stale(&self, installed: Option<&Self>) -> bool {
    installed != Some(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_camel_case() {
    let d: ContentDescriptor =
      serde_json::from_str(r#"{"version":"3","buildDate":"2026-01-02"}"#).unwrap();
    assert_eq!(d.version, "3");
    assert_eq!(d.build_date, "2026-01-02");
  }

  #[test]
  fn staleness() {
    let bundled = ContentDescriptor { version: "3".into(), build_date: "b".into() };
    assert!(bundled.is_stale(None));
    assert!(!bundled.is_stale(Some(&bundled.clone())));
    let rebuilt = ContentDescriptor { build_date: "c".into(), ..bundled.clone() };
    assert!(bundled.is_stale(Some(&rebuilt)));
  }
}
