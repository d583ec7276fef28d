//! Engine error type.

use formtable_core::{ErrorClass, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] formtable_core::Error),

  /// A storage backend failure, classified when it was raised.
  #[error("{source}")]
  Store {
    kind:   ErrorKind,
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

impl Error {
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + ErrorClass + Send + Sync + 'static,
  {
    Self::Store { kind: err.kind(), source: Box::new(err) }
  }
}

impl ErrorClass for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Store { kind, .. } => *kind,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_errors_keep_their_class() {
    let err = Error::store(formtable_core::Error::Transient("database is locked".into()));
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(err.to_string(), "transient failure: database is locked");
  }

  #[test]
  fn core_errors_are_transparent() {
    let err: Error = formtable_core::Error::not_found("backup", "b1").into();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "backup not found: b1");
  }
}
