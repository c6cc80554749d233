//! Runtime settings, deserialised by the binary from `folio.toml` and the
//! environment.

use std::path::PathBuf;

use folio_core::profile::CorpusProfile;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Directory holding the packaged store and its descriptor.
  pub asset_dir:       PathBuf,
  /// Private storage the store is installed into.
  pub data_dir:        PathBuf,
  pub database_file:   String,
  pub descriptor_file: String,
  pub state_file:      String,
  pub corpus:          CorpusProfile,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      asset_dir:       PathBuf::from("assets/content"),
      data_dir:        PathBuf::from("data"),
      database_file:   "content.db".into(),
      descriptor_file: "content.meta.json".into(),
      state_file:      "lifecycle-state.json".into(),
      corpus:          CorpusProfile::default(),
    }
  }
}

impl Settings {
  pub fn bundled_db(&self) -> PathBuf { self.asset_dir.join(&self.database_file) }

  pub fn bundled_descriptor(&self) -> PathBuf { self.asset_dir.join(&self.descriptor_file) }

  pub fn installed_db(&self) -> PathBuf { self.data_dir.join(&self.database_file) }

  pub fn installed_descriptor(&self) -> PathBuf { self.data_dir.join(&self.descriptor_file) }

  pub fn state_path(&self) -> PathBuf { self.data_dir.join(&self.state_file) }
}
