//! [`ChangeIntent`]: one structural operation on a dynamic table.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  field::LogicalType,
  identifier::Identifier,
  types::{Conversion, conversion, physical_type},
};

/// The four structural operations the engine knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
  Add,
  Drop,
  Rename,
  Retype,
}

impl ChangeKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Add => "ADD",
      Self::Drop => "DROP",
      Self::Rename => "RENAME",
      Self::Retype => "RETYPE",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "ADD" => Some(Self::Add),
      "DROP" => Some(Self::Drop),
      "RENAME" => Some(Self::Rename),
      "RETYPE" => Some(Self::Retype),
      _ => None,
    }
  }
}

impl std::fmt::Display for ChangeKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One structural diff item. Fields not relevant to `kind` are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeIntent {
  pub kind:            ChangeKind,
  pub field_id:        String,
  #[serde(default)]
  pub old_column_name: Option<Identifier>,
  #[serde(default)]
  pub new_column_name: Option<Identifier>,
  #[serde(default)]
  pub old_type:        Option<LogicalType>,
  #[serde(default)]
  pub new_type:        Option<LogicalType>,
  /// Source label, used to generate a name when `new_column_name` is absent.
  #[serde(default)]
  pub label:           Option<String>,
}

impl ChangeIntent {
  pub fn add(
    field_id: impl Into<String>,
    label: impl Into<String>,
    column: Option<Identifier>,
    ty: LogicalType,
  ) -> Self {
    Self {
      kind:            ChangeKind::Add,
      field_id:        field_id.into(),
      old_column_name: None,
      new_column_name: column,
      old_type:        None,
      new_type:        Some(ty),
      label:           Some(label.into()),
    }
  }

  pub fn drop(field_id: impl Into<String>, column: Identifier, ty: Option<LogicalType>) -> Self {
    Self {
      kind:            ChangeKind::Drop,
      field_id:        field_id.into(),
      old_column_name: Some(column),
      new_column_name: None,
      old_type:        ty,
      new_type:        None,
      label:           None,
    }
  }

  pub fn rename(field_id: impl Into<String>, from: Identifier, to: Identifier) -> Self {
    Self {
      kind:            ChangeKind::Rename,
      field_id:        field_id.into(),
      old_column_name: Some(from),
      new_column_name: Some(to),
      old_type:        None,
      new_type:        None,
      label:           None,
    }
  }

  pub fn retype(
    field_id: impl Into<String>,
    column: Identifier,
    from: LogicalType,
    to: LogicalType,
  ) -> Self {
    Self {
      kind:            ChangeKind::Retype,
      field_id:        field_id.into(),
      old_column_name: Some(column.clone()),
      new_column_name: Some(column),
      old_type:        Some(from),
      new_type:        Some(to),
      label:           None,
    }
  }

  /// The column a RETYPE applies to: the new name if present, else the old.
  pub fn retype_column(&self) -> Option<&Identifier> {
    self.new_column_name.as_ref().or(self.old_column_name.as_ref())
  }

  /// Check that the fields required by `kind` are present.
  pub fn validate(&self) -> Result<()> {
    let fail = |msg: &str| Err(Error::InvalidIntent(format!("{} {}: {msg}", self.kind, self.field_id)));

    if self.field_id.trim().is_empty() {
      return fail("field_id must not be empty");
    }

    match self.kind {
      ChangeKind::Add => {
        if self.new_type.is_none() {
          return fail("new_type is required");
        }
        if self.new_column_name.is_none() && self.label.is_none() {
          return fail("either new_column_name or label is required");
        }
      }
      ChangeKind::Drop => {
        if self.old_column_name.is_none() {
          return fail("old_column_name is required");
        }
      }
      ChangeKind::Rename => {
        if self.old_column_name.is_none() {
          return fail("old_column_name is required");
        }
        if self.new_column_name.is_none() && self.label.is_none() {
          return fail("either new_column_name or label is required");
        }
        if self.old_column_name == self.new_column_name {
          return fail("old and new column names are identical");
        }
      }
      ChangeKind::Retype => {
        if self.retype_column().is_none() {
          return fail("a column name is required");
        }
        let (Some(from), Some(to)) = (self.old_type, self.new_type) else {
          return fail("old_type and new_type are required");
        };
        if conversion(from, to) == Conversion::Unsupported {
          return Err(Error::UnsupportedConversion {
            from: physical_type(from).sql(),
            to:   physical_type(to).sql(),
          });
        }
      }
    }
    Ok(())
  }

  /// Human-readable summary of the prior state, for audit rows.
  pub fn old_value(&self) -> Option<String> {
    match self.kind {
      ChangeKind::Add => None,
      ChangeKind::Drop | ChangeKind::Rename => {
        self.old_column_name.as_ref().map(ToString::to_string)
      }
      ChangeKind::Retype => self.old_type.map(|t| t.to_string()),
    }
  }

  /// Human-readable summary of the resulting state, for audit rows.
  pub fn new_value(&self) -> Option<String> {
    match self.kind {
      ChangeKind::Add => match (&self.new_column_name, self.new_type) {
        (Some(c), Some(t)) => Some(format!("{c}:{t}")),
        (Some(c), None) => Some(c.to_string()),
        _ => None,
      },
      ChangeKind::Drop => None,
      ChangeKind::Rename => self.new_column_name.as_ref().map(ToString::to_string),
      ChangeKind::Retype => self.new_type.map(|t| t.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn id(s: &str) -> Identifier { Identifier::parse(s).unwrap() }

  #[test]
  fn kind_serialises_uppercase() {
    let json = serde_json::to_string(&ChangeKind::Retype).unwrap();
    assert_eq!(json, "\"RETYPE\"");
  }

  #[test]
  fn add_requires_type() {
    let mut intent = ChangeIntent::add("f1", "Age", None, LogicalType::Number);
    assert!(intent.validate().is_ok());
    intent.new_type = None;
    assert!(intent.validate().is_err());
  }

  #[test]
  fn add_requires_name_or_label() {
    let mut intent = ChangeIntent::add("f1", "Age", None, LogicalType::Number);
    intent.label = None;
    assert!(intent.validate().is_err());
  }

  #[test]
  fn rename_to_same_name_is_rejected() {
    let intent = ChangeIntent::rename("f1", id("a"), id("a"));
    assert!(intent.validate().is_err());
  }

  #[test]
  fn retype_requires_both_types() {
    let mut intent = ChangeIntent::retype("f1", id("a"), LogicalType::ShortText, LogicalType::Number);
    assert!(intent.validate().is_ok());
    intent.old_type = None;
    assert!(intent.validate().is_err());
  }

  #[test]
  fn unsupported_retype_is_rejected() {
    let intent = ChangeIntent::retype("f1", id("born"), LogicalType::Date, LogicalType::Number);
    assert!(matches!(intent.validate(), Err(Error::UnsupportedConversion { .. })));

    let widening = ChangeIntent::retype("f1", id("born"), LogicalType::Date, LogicalType::Timestamp);
    assert!(widening.validate().is_ok());
  }

  #[test]
  fn audit_values() {
    let intent = ChangeIntent::rename("f1", id("full_name"), id("name"));
    assert_eq!(intent.old_value().as_deref(), Some("full_name"));
    assert_eq!(intent.new_value().as_deref(), Some("name"));

    let add = ChangeIntent::add("f2", "Age", Some(id("age")), LogicalType::Number);
    assert_eq!(add.new_value().as_deref(), Some("age:number"));
  }
}
