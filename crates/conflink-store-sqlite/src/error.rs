//! Error type for `conflink-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// A stored version column held a negative number.
  #[error("corrupt version {0} in kv table")]
  CorruptVersion(i64),

  #[error("version {0} does not fit in an sqlite integer")]
  VersionOutOfRange(u64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
