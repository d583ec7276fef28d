//! Error type for `formtable-store-sqlite`.

use formtable_core::{ErrorClass, ErrorKind};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(formtable_core::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored discriminant that no longer maps to a known variant.
  #[error("unrecognised stored value: {0}")]
  Decode(String),
}

impl From<formtable_core::Error> for Error {
  fn from(e: formtable_core::Error) -> Self { Self::Core(e) }
}

/// Domain errors raised inside a `Connection::call` closure travel as
/// `tokio_rusqlite::Error::Other`; unwrap them back into [`Error::Core`].
impl From<tokio_rusqlite::Error> for Error {
  fn from(e: tokio_rusqlite::Error) -> Self {
    match e {
      tokio_rusqlite::Error::Other(boxed) => match boxed.downcast::<formtable_core::Error>() {
        Ok(core) => Self::Core(*core),
        Err(other) => Self::Database(tokio_rusqlite::Error::Other(other)),
      },
      other => Self::Database(other),
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Self::Database(tokio_rusqlite::Error::Rusqlite(e)) }
}

/// Wrap a domain error for return from inside a `Connection::call` closure.
pub(crate) fn raise(e: formtable_core::Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

fn is_contention(e: &rusqlite::Error) -> bool {
  matches!(
    e.sqlite_error_code(),
    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

impl ErrorClass for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Database(tokio_rusqlite::Error::ConnectionClosed)
      | Self::Database(tokio_rusqlite::Error::Close(_)) => ErrorKind::Transient,
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) if is_contention(e) => {
        ErrorKind::Transient
      }
      _ => ErrorKind::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn core_errors_survive_the_connection_thread() {
    let wrapped = raise(formtable_core::Error::Irreversible("gone".into()));
    let e = Error::from(wrapped);
    assert!(matches!(e, Error::Core(formtable_core::Error::Irreversible(_))));
    assert_eq!(e.kind(), ErrorKind::Irreversible);
  }

  #[test]
  fn busy_database_is_transient() {
    let busy = rusqlite::Error::SqliteFailure(
      rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
      Some("database is locked".into()),
    );
    assert_eq!(Error::from(busy).kind(), ErrorKind::Transient);
    assert_eq!(Error::Database(tokio_rusqlite::Error::ConnectionClosed).kind(), ErrorKind::Transient);
  }

  #[test]
  fn decode_failures_are_internal() {
    assert_eq!(Error::Decode("x".into()).kind(), ErrorKind::Internal);
  }
}
