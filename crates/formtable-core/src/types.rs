//! Type mapper: logical field types → physical column types, the
//! compatibility matrix used to validate RETYPE, and the per-row cast.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::field::LogicalType;

// ─── Column type ─────────────────────────────────────────────────────────────

/// A physical column type, rendered as an SQL declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "length", rename_all = "snake_case")]
pub enum ColumnType {
  VarChar(u16),
  Text,
  Integer,
  Numeric,
  Date,
  Time,
  Timestamp,
  Json,
}

impl ColumnType {
  /// The declared type used in `ADD COLUMN`.
  pub fn sql(self) -> String {
    match self {
      Self::VarChar(n) => format!("VARCHAR({n})"),
      Self::Text => "TEXT".into(),
      Self::Integer => "INTEGER".into(),
      Self::Numeric => "NUMERIC".into(),
      Self::Date => "DATE".into(),
      Self::Time => "TIME".into(),
      Self::Timestamp => "TIMESTAMP".into(),
      // Declared with TEXT so SQLite gives the column text affinity.
      Self::Json => "JSON TEXT".into(),
    }
  }

  /// Parse a declared type as reported by `PRAGMA table_info`.
  /// Unknown declarations are treated as `TEXT`.
  pub fn from_declared(s: &str) -> Self {
    let upper = s.trim().to_ascii_uppercase();
    if let Some(rest) = upper.strip_prefix("VARCHAR(")
      && let Some(n) = rest.strip_suffix(')').and_then(|n| n.trim().parse().ok())
    {
      return Self::VarChar(n);
    }
    match upper.as_str() {
      "INTEGER" | "INT" | "BIGINT" => Self::Integer,
      "NUMERIC" | "DECIMAL" | "REAL" | "DOUBLE" => Self::Numeric,
      "DATE" => Self::Date,
      "TIME" => Self::Time,
      "TIMESTAMP" | "DATETIME" => Self::Timestamp,
      "JSON TEXT" | "JSON" | "JSONB" => Self::Json,
      _ => Self::Text,
    }
  }

  fn is_textual(self) -> bool { matches!(self, Self::VarChar(_) | Self::Text) }

  fn is_numeric(self) -> bool { matches!(self, Self::Integer | Self::Numeric) }

  fn is_temporal(self) -> bool { matches!(self, Self::Date | Self::Time | Self::Timestamp) }
}

impl std::fmt::Display for ColumnType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.sql())
  }
}

/// Static mapping from the form-level type to the physical column type.
pub fn physical_type(ty: LogicalType) -> ColumnType {
  use LogicalType::*;
  match ty {
    ShortText | Email | SingleChoice => ColumnType::VarChar(255),
    Phone => ColumnType::VarChar(20),
    Url | FileRef | ImageRef => ColumnType::VarChar(500),
    LongText => ColumnType::Text,
    Number | NumericSlider => ColumnType::Numeric,
    Rating => ColumnType::Integer,
    Date => ColumnType::Date,
    Time => ColumnType::Time,
    Timestamp => ColumnType::Timestamp,
    GeoPoint | MultiSelectRegion => ColumnType::Json,
  }
}

// ─── Compatibility ───────────────────────────────────────────────────────────

/// How a RETYPE between two physical types must be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
  /// Same physical type; no DDL needed.
  Identity,
  /// Every existing value is representable in the new type.
  Widening,
  /// Each row must be validated; a backup is taken first.
  Narrowing,
  /// Rejected outright.
  Unsupported,
}

/// Classify a change between two physical types.
pub fn column_conversion(from: ColumnType, to: ColumnType) -> Conversion {
  use ColumnType::*;
  if from == to {
    return Conversion::Identity;
  }
  match (from, to) {
    (_, Text) => Conversion::Widening,
    (VarChar(m), VarChar(n)) if m <= n => Conversion::Widening,
    (VarChar(_), VarChar(_)) => Conversion::Narrowing,
    (f, VarChar(n)) if (f.is_numeric() || f.is_temporal()) && n >= 32 => Conversion::Widening,
    (_, VarChar(_)) => Conversion::Narrowing,
    (Integer, Numeric) => Conversion::Widening,
    (Numeric, Integer) => Conversion::Narrowing,
    (Date, Timestamp) => Conversion::Widening,
    (Timestamp, Date) => Conversion::Narrowing,
    (f, Integer | Numeric | Date | Time | Timestamp) if f.is_textual() => Conversion::Narrowing,
    (f, Json) if f.is_textual() || f.is_numeric() => Conversion::Narrowing,
    _ => Conversion::Unsupported,
  }
}

/// Classify a change between two logical types via their physical types.
pub fn conversion(from: LogicalType, to: LogicalType) -> Conversion {
  column_conversion(physical_type(from), physical_type(to))
}

/// `true` if every value of `from` is safely representable as `to`.
pub fn is_widening_conversion(from: LogicalType, to: LogicalType) -> bool {
  matches!(conversion(from, to), Conversion::Identity | Conversion::Widening)
}

// ─── Cell values ─────────────────────────────────────────────────────────────

/// A single stored value, mirroring SQLite's storage classes so that backups
/// restore byte-for-byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum CellValue {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
  Blob(Vec<u8>),
}

impl CellValue {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }
}

/// Cast one stored value to `target`, returning the reason on failure.
pub fn convert_cell(value: &CellValue, target: ColumnType) -> Result<CellValue, String> {
  use CellValue as V;

  let text = match value {
    V::Null => return Ok(V::Null),
    V::Blob(bytes) => match std::str::from_utf8(bytes) {
      Ok(s) => s.to_owned(),
      Err(_) => return Err("binary value is not valid UTF-8".into()),
    },
    V::Integer(i) => i.to_string(),
    V::Real(r) => r.to_string(),
    V::Text(s) => s.clone(),
  };

  if !matches!(target, ColumnType::Text | ColumnType::VarChar(_)) && text.trim().is_empty() {
    return Ok(V::Null);
  }

  match target {
    ColumnType::Text => Ok(V::Text(text)),
    ColumnType::VarChar(n) => {
      let len = text.chars().count();
      if len > n as usize {
        Err(format!("value has {len} characters, limit is {n}"))
      } else {
        Ok(V::Text(text))
      }
    }
    ColumnType::Integer => match value {
      V::Integer(i) => Ok(V::Integer(*i)),
      _ => parse_integer(text.trim()).map(V::Integer),
    },
    ColumnType::Numeric => match value {
      V::Integer(i) => Ok(V::Integer(*i)),
      V::Real(r) => Ok(V::Real(*r)),
      _ => parse_numeric(text.trim()),
    },
    ColumnType::Date => parse_date(text.trim()).map(|d| V::Text(d.format("%Y-%m-%d").to_string())),
    ColumnType::Time => parse_time(text.trim()).map(|t| V::Text(t.format("%H:%M:%S").to_string())),
    ColumnType::Timestamp => parse_timestamp(text.trim()).map(|ts| V::Text(ts.to_rfc3339())),
    ColumnType::Json => match value {
      V::Integer(i) => Ok(V::Text(i.to_string())),
      V::Real(r) => Ok(V::Text(r.to_string())),
      _ => serde_json::from_str::<serde_json::Value>(&text)
        .map(|_| V::Text(text))
        .map_err(|e| format!("not valid JSON: {e}")),
    },
  }
}

fn parse_integer(s: &str) -> Result<i64, String> {
  if let Ok(i) = s.parse::<i64>() {
    return Ok(i);
  }
  match s.parse::<f64>() {
    Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
    _ => Err(format!("{s:?} is not an integer")),
  }
}

fn parse_numeric(s: &str) -> Result<CellValue, String> {
  if let Ok(i) = s.parse::<i64>() {
    return Ok(CellValue::Integer(i));
  }
  match s.parse::<f64>() {
    Ok(f) if f.is_finite() => Ok(CellValue::Real(f)),
    _ => Err(format!("{s:?} is not a number")),
  }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
  if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return Ok(d);
  }
  match parse_timestamp(s) {
    Ok(ts) if ts.time() == NaiveTime::MIN => Ok(ts.date_naive()),
    Ok(_) => Err(format!("{s:?} has a non-midnight time component")),
    Err(_) => Err(format!("{s:?} is not a date")),
  }
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
  NaiveTime::parse_from_str(s, "%H:%M:%S")
    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
    .map_err(|_| format!("{s:?} is not a time"))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
    return Ok(naive.and_utc());
  }
  if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return Ok(date.and_time(NaiveTime::MIN).and_utc());
  }
  Err(format!("{s:?} is not a timestamp"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mapping_covers_text_and_numbers() {
    assert_eq!(physical_type(LogicalType::ShortText), ColumnType::VarChar(255));
    assert_eq!(physical_type(LogicalType::Rating), ColumnType::Integer);
    assert_eq!(physical_type(LogicalType::GeoPoint), ColumnType::Json);
  }

  #[test]
  fn declared_type_roundtrip() {
    for ty in [
      ColumnType::VarChar(20),
      ColumnType::Text,
      ColumnType::Integer,
      ColumnType::Numeric,
      ColumnType::Date,
      ColumnType::Time,
      ColumnType::Timestamp,
      ColumnType::Json,
    ] {
      assert_eq!(ColumnType::from_declared(&ty.sql()), ty);
    }
  }

  #[test]
  fn json_is_declared_with_text_affinity() {
    let declared = ColumnType::Json.sql();
    assert!(declared.contains("TEXT") && !declared.contains("INT"));
    assert_eq!(ColumnType::from_declared("json"), ColumnType::Json);
  }

  #[test]
  fn text_to_number_is_narrowing() {
    assert_eq!(
      conversion(LogicalType::ShortText, LogicalType::Number),
      Conversion::Narrowing
    );
    assert!(!is_widening_conversion(LogicalType::ShortText, LogicalType::Number));
  }

  #[test]
  fn number_to_text_is_widening() {
    assert!(is_widening_conversion(LogicalType::Number, LogicalType::ShortText));
    assert!(is_widening_conversion(LogicalType::Number, LogicalType::LongText));
  }

  #[test]
  fn same_physical_type_is_identity() {
    assert_eq!(conversion(LogicalType::Email, LogicalType::ShortText), Conversion::Identity);
  }

  #[test]
  fn numeric_to_date_is_unsupported() {
    assert_eq!(conversion(LogicalType::Number, LogicalType::Date), Conversion::Unsupported);
    assert_eq!(conversion(LogicalType::GeoPoint, LogicalType::Number), Conversion::Unsupported);
  }

  #[test]
  fn shorter_varchar_is_narrowing() {
    assert_eq!(conversion(LogicalType::ShortText, LogicalType::Phone), Conversion::Narrowing);
    assert_eq!(conversion(LogicalType::Phone, LogicalType::ShortText), Conversion::Widening);
  }

  #[test]
  fn convert_text_to_numeric() {
    assert_eq!(
      convert_cell(&CellValue::Text("42".into()), ColumnType::Numeric),
      Ok(CellValue::Integer(42))
    );
    assert_eq!(
      convert_cell(&CellValue::Text(" 4.5 ".into()), ColumnType::Numeric),
      Ok(CellValue::Real(4.5))
    );
    assert!(convert_cell(&CellValue::Text("abc".into()), ColumnType::Numeric).is_err());
  }

  #[test]
  fn empty_text_becomes_null_for_non_text_targets() {
    assert_eq!(
      convert_cell(&CellValue::Text("".into()), ColumnType::Integer),
      Ok(CellValue::Null)
    );
    assert_eq!(
      convert_cell(&CellValue::Text("".into()), ColumnType::Text),
      Ok(CellValue::Text(String::new()))
    );
  }

  #[test]
  fn convert_to_integer_rejects_fractions() {
    assert_eq!(
      convert_cell(&CellValue::Real(3.0), ColumnType::Integer),
      Ok(CellValue::Integer(3))
    );
    assert!(convert_cell(&CellValue::Real(3.5), ColumnType::Integer).is_err());
  }

  #[test]
  fn convert_dates_and_times() {
    assert_eq!(
      convert_cell(&CellValue::Text("2024-02-29".into()), ColumnType::Date),
      Ok(CellValue::Text("2024-02-29".into()))
    );
    assert_eq!(
      convert_cell(&CellValue::Text("2024-02-29T00:00:00Z".into()), ColumnType::Date),
      Ok(CellValue::Text("2024-02-29".into()))
    );
    assert!(convert_cell(&CellValue::Text("2024-02-29T10:00:00Z".into()), ColumnType::Date).is_err());
    assert_eq!(
      convert_cell(&CellValue::Text("09:30".into()), ColumnType::Time),
      Ok(CellValue::Text("09:30:00".into()))
    );
    assert_eq!(
      convert_cell(&CellValue::Text("2024-01-01".into()), ColumnType::Timestamp),
      Ok(CellValue::Text("2024-01-01T00:00:00+00:00".into()))
    );
  }

  #[test]
  fn varchar_length_is_enforced() {
    assert!(convert_cell(&CellValue::Text("x".repeat(21)), ColumnType::VarChar(20)).is_err());
    assert!(convert_cell(&CellValue::Text("0812345678".into()), ColumnType::VarChar(20)).is_ok());
  }

  #[test]
  fn json_must_parse() {
    assert!(convert_cell(&CellValue::Text("{\"lat\":13.7}".into()), ColumnType::Json).is_ok());
    assert!(convert_cell(&CellValue::Text("{lat".into()), ColumnType::Json).is_err());
  }

  #[test]
  fn cell_value_json_is_tagged() {
    let json = serde_json::to_string(&CellValue::Integer(30)).unwrap();
    assert_eq!(json, r#"{"t":"integer","v":30}"#);
  }
}
