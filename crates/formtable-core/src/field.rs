//! Form field definitions and the physical table they are bound to.
//!
//! Both types are owned by the form-authoring subsystem. The engine receives
//! them as immutable snapshots and never writes them back.

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

// ─── Logical type ────────────────────────────────────────────────────────────

/// The form-level type of a field, as chosen by the form author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
  ShortText,
  LongText,
  Email,
  Phone,
  Url,
  Number,
  Date,
  Time,
  Timestamp,
  SingleChoice,
  Rating,
  NumericSlider,
  /// Latitude/longitude pair, stored as JSON.
  GeoPoint,
  /// Province / district / sub-district selection, stored as JSON.
  MultiSelectRegion,
  FileRef,
  ImageRef,
}

impl LogicalType {
  /// The discriminant string used in serialised intents and audit rows.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ShortText => "short_text",
      Self::LongText => "long_text",
      Self::Email => "email",
      Self::Phone => "phone",
      Self::Url => "url",
      Self::Number => "number",
      Self::Date => "date",
      Self::Time => "time",
      Self::Timestamp => "timestamp",
      Self::SingleChoice => "single_choice",
      Self::Rating => "rating",
      Self::NumericSlider => "numeric_slider",
      Self::GeoPoint => "geo_point",
      Self::MultiSelectRegion => "multi_select_region",
      Self::FileRef => "file_ref",
      Self::ImageRef => "image_ref",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    serde_json::from_value(serde_json::Value::String(s.to_owned())).ok()
  }
}

impl std::fmt::Display for LogicalType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Field ───────────────────────────────────────────────────────────────────

/// One logical field of a form or sub-form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
  /// Stable identity, assigned once at field creation and never reused.
  pub field_id:     String,
  /// Human-entered label; may be any script.
  pub label:        String,
  pub logical_type: LogicalType,
  /// Physical column name. `None` until the engine has assigned one.
  #[serde(default)]
  pub column_name:  Option<Identifier>,
  /// Display order. Ignored by migration logic.
  #[serde(default)]
  pub order:        i32,
}

// ─── Table ───────────────────────────────────────────────────────────────────

/// Whether a dynamic table backs a top-level form or a nested sub-form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
  Form,
  SubForm,
}

/// A physical table bound 1:1 to a form or sub-form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTarget {
  pub table_name: Identifier,
  pub owner_kind: OwnerKind,
  pub owner_id:   String,
}

/// Columns every dynamic table carries. Generated field names never use them.
pub const SYSTEM_COLUMNS: &[&str] = &["id", "created_at", "updated_at", "parent_id"];
