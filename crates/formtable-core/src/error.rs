//! Error types for `formtable-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The stable classification every error in the workspace reduces to.
///
/// The queue decides whether to retry from this value, and the HTTP layer maps
/// it to a status code. It never carries the underlying message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// Malformed intent, unresolvable identifier collision, unsupported type
  /// conversion, or a row that failed conversion.
  Validation,
  /// Unknown table, migration record, or backup.
  NotFound,
  /// Connectivity, lock contention, or timeout. Retried by the queue.
  Transient,
  /// Rollback or restore requested but the data needed is gone.
  Irreversible,
  /// Anything else; the message is not shown to callers.
  Internal,
}

impl ErrorKind {
  pub fn is_retryable(self) -> bool { matches!(self, Self::Transient) }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Validation => "validation",
      Self::NotFound => "not_found",
      Self::Transient => "transient",
      Self::Irreversible => "irreversible",
      Self::Internal => "internal",
    }
  }
}

impl std::fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Implemented by every error type that crosses a crate boundary, so generic
/// code over a [`crate::store::SchemaStore`] can classify backend failures.
pub trait ErrorClass {
  fn kind(&self) -> ErrorKind;
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid identifier {0:?}")]
  InvalidIdentifier(String),

  #[error("invalid change intent: {0}")]
  InvalidIntent(String),

  #[error("{0}")]
  Validation(String),

  #[error("unsupported conversion from {from} to {to}")]
  UnsupportedConversion { from: String, to: String },

  #[error("row {row_id} of column {column:?} cannot be converted: {reason}")]
  Conversion {
    row_id: i64,
    column: String,
    reason: String,
  },

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("transient failure: {0}")]
  Transient(String),

  #[error("irreversible operation: {0}")]
  Irreversible(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    Self::NotFound { entity, id: id.to_string() }
  }
}

impl ErrorClass for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidIdentifier(_)
      | Self::InvalidIntent(_)
      | Self::Validation(_)
      | Self::UnsupportedConversion { .. }
      | Self::Conversion { .. } => ErrorKind::Validation,
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::Transient(_) => ErrorKind::Transient,
      Self::Irreversible(_) => ErrorKind::Irreversible,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
