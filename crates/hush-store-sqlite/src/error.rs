//! Error type for `hush-store-sqlite`.

use hush_core::store::StoreError;
use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self { Self::Database(err.into()) }
}

impl StoreError for Error {
  /// A primary-key or unique violation means the id was taken between the
  /// read of the maximum and the insert.
  fn is_conflict(&self) -> bool {
    let Self::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(
      failure,
      _,
    ))) = self
    else {
      return false;
    };
    matches!(
      failure.extended_code,
      ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
