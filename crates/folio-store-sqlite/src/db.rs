//! [`ContentDb`], the explicitly owned handle to the content store.

use std::path::{Path, PathBuf};

use crate::Result;

/// Handle to the on-device content store.
///
/// Cloning is cheap; the inner connection is reference-counted. Only
/// [`ContentLifecycle`](crate::ContentLifecycle) opens and closes it; every
/// other component borrows it.
#[derive(Clone)]
pub struct ContentDb {
  conn: tokio_rusqlite::Connection,
  path: Option<PathBuf>,
}

impl ContentDb {
  /// Open (or create) the store at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let conn = tokio_rusqlite::Connection::open(&path).await?;
    let db = Self { conn, path: Some(path) };
    db.init_connection().await?;
    Ok(db)
  }

  /// Open an in-memory store. Useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let db = Self { conn, path: None };
    db.init_connection().await?;
    Ok(db)
  }

  async fn init_connection(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

  /// Run `f` on the connection thread.
  ///
  /// `f` returns this crate's [`Result`], so domain errors raised inside the
  /// closure come back unchanged rather than wrapped in
  /// [`tokio_rusqlite::Error`].
  pub async fn run<F, T>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Close the connection, releasing the file handle.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }
}
