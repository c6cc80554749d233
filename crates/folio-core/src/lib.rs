//! Core types for the Folio content-store lifecycle.
//!
//! This crate is deliberately free of database and file-system dependencies.
//! The SQLite backend and the CLI depend on it; it depends on nothing
//! proprietary.

pub mod defect;
pub mod descriptor;
pub mod error;
pub mod fatal;
pub mod health;
pub mod identity;
pub mod profile;
pub mod state;

pub use error::{Error, Result};
