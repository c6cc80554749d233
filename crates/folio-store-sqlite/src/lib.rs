//! SQLite backend for the Folio content-store lifecycle.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every component takes the
//! [`ContentDb`] handle as a parameter; [`ContentLifecycle`] is its single
//! owner.

mod schema;

pub mod backfill;
pub mod db;
pub mod error;
pub mod health;
pub mod installer;
pub mod lifecycle;
pub mod migration;
pub mod patches;
pub mod self_heal;
pub mod settings;
pub mod state;

pub use db::ContentDb;
pub use error::{Error, Result};
pub use lifecycle::{ContentLifecycle, StartupReport};
pub use settings::Settings;
