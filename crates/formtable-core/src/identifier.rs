//! [`Identifier`]: a validated, storage-safe table or column name.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum identifier length in bytes (PostgreSQL's limit; also applied to
/// SQLite so generated schemas stay portable).
pub const MAX_LEN: usize = 63;

/// A lowercase ASCII name matching `^[a-z_][a-z0-9_]*$`, at most
/// [`MAX_LEN`] bytes long.
///
/// Construction always validates, including on deserialisation, so any value
/// of this type can be interpolated into DDL inside double quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
  pub fn parse(s: impl Into<String>) -> Result<Self> {
    let s = s.into();
    if is_valid(&s) { Ok(Self(s)) } else { Err(Error::InvalidIdentifier(s)) }
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The identifier wrapped in double quotes for use in SQL text.
  pub fn quoted(&self) -> String { format!("\"{}\"", self.0) }
}

/// Returns `true` if `s` satisfies the identifier grammar.
pub fn is_valid(s: &str) -> bool {
  let bytes = s.as_bytes();
  let Some(&first) = bytes.first() else { return false };
  bytes.len() <= MAX_LEN
    && (first.is_ascii_lowercase() || first == b'_')
    && bytes
      .iter()
      .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'_')
}

impl TryFrom<String> for Identifier {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(s) }
}

impl From<Identifier> for String {
  fn from(id: Identifier) -> Self { id.0 }
}

impl AsRef<str> for Identifier {
  fn as_ref(&self) -> &str { &self.0 }
}

impl Borrow<str> for Identifier {
  fn borrow(&self) -> &str { &self.0 }
}

impl fmt::Display for Identifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
