//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 UTC strings so that SQL string
//! comparison orders them correctly. UUIDs are hyphenated lowercase strings.
//! Column types are stored as their declared SQL type.

use chrono::{DateTime, SecondsFormat, Utc};
use formtable_core::{
  ErrorKind, Identifier,
  field::{OwnerKind, TableTarget},
  intent::ChangeKind,
  record::{BackupRow, BackupSummary, DataBackup, MigrationRecord},
  types::{CellValue, ColumnType},
};
use rusqlite::types::{Value, ValueRef};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_ident(s: String) -> Result<Identifier> { Ok(Identifier::parse(s)?) }

pub fn encode_owner_kind(k: OwnerKind) -> &'static str {
  match k {
    OwnerKind::Form => "form",
    OwnerKind::SubForm => "sub_form",
  }
}

pub fn decode_owner_kind(s: &str) -> Result<OwnerKind> {
  match s {
    "form" => Ok(OwnerKind::Form),
    "sub_form" => Ok(OwnerKind::SubForm),
    other => Err(Error::Decode(format!("unknown owner kind: {other:?}"))),
  }
}

pub fn decode_change_kind(s: &str) -> Result<ChangeKind> {
  ChangeKind::parse(s).ok_or_else(|| Error::Decode(format!("unknown change kind: {s:?}")))
}

pub fn decode_error_kind(s: &str) -> Result<ErrorKind> {
  match s {
    "validation" => Ok(ErrorKind::Validation),
    "not_found" => Ok(ErrorKind::NotFound),
    "transient" => Ok(ErrorKind::Transient),
    "irreversible" => Ok(ErrorKind::Irreversible),
    "internal" => Ok(ErrorKind::Internal),
    other => Err(Error::Decode(format!("unknown error kind: {other:?}"))),
  }
}

// ─── Cells ───────────────────────────────────────────────────────────────────

pub fn cell_from_sql(v: ValueRef<'_>) -> CellValue {
  match v {
    ValueRef::Null => CellValue::Null,
    ValueRef::Integer(i) => CellValue::Integer(i),
    ValueRef::Real(r) => CellValue::Real(r),
    ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
    ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
  }
}

pub fn cell_to_sql(v: &CellValue) -> Value {
  match v {
    CellValue::Null => Value::Null,
    CellValue::Integer(i) => Value::Integer(*i),
    CellValue::Real(r) => Value::Real(*r),
    CellValue::Text(t) => Value::Text(t.clone()),
    CellValue::Blob(b) => Value::Blob(b.clone()),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const TABLE_COLUMNS: &str = "table_name, owner_kind, owner_id";

/// Raw strings read from a `_formtable_tables` row.
pub struct RawTable {
  pub table_name: String,
  pub owner_kind: String,
  pub owner_id:   String,
}

impl RawTable {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { table_name: row.get(0)?, owner_kind: row.get(1)?, owner_id: row.get(2)? })
  }

  pub fn into_target(self) -> Result<TableTarget> {
    Ok(TableTarget {
      table_name: decode_ident(self.table_name)?,
      owner_kind: decode_owner_kind(&self.owner_kind)?,
      owner_id:   self.owner_id,
    })
  }
}

pub const RECORD_COLUMNS: &str = "record_id, table_name, field_id, kind, old_value, new_value, \
   intent_json, forward_sql, rollback_sql, success, error_kind, error_message, backup_id, \
   rollback_of, job_id, executed_by, executed_at";

/// Raw values read from a `_formtable_migrations` row.
pub struct RawRecord {
  pub record_id:     String,
  pub table_name:    String,
  pub field_id:      String,
  pub kind:          String,
  pub old_value:     Option<String>,
  pub new_value:     Option<String>,
  pub intent_json:   String,
  pub forward_sql:   String,
  pub rollback_sql:  Option<String>,
  pub success:       bool,
  pub error_kind:    Option<String>,
  pub error_message: Option<String>,
  pub backup_id:     Option<String>,
  pub rollback_of:   Option<String>,
  pub job_id:        Option<String>,
  pub executed_by:   String,
  pub executed_at:   String,
}

impl RawRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:     row.get(0)?,
      table_name:    row.get(1)?,
      field_id:      row.get(2)?,
      kind:          row.get(3)?,
      old_value:     row.get(4)?,
      new_value:     row.get(5)?,
      intent_json:   row.get(6)?,
      forward_sql:   row.get(7)?,
      rollback_sql:  row.get(8)?,
      success:       row.get(9)?,
      error_kind:    row.get(10)?,
      error_message: row.get(11)?,
      backup_id:     row.get(12)?,
      rollback_of:   row.get(13)?,
      job_id:        row.get(14)?,
      executed_by:   row.get(15)?,
      executed_at:   row.get(16)?,
    })
  }

  pub fn into_record(self) -> Result<MigrationRecord> {
    Ok(MigrationRecord {
      id:            decode_uuid(&self.record_id)?,
      table_name:    decode_ident(self.table_name)?,
      field_id:      self.field_id,
      kind:          decode_change_kind(&self.kind)?,
      old_value:     self.old_value,
      new_value:     self.new_value,
      intent:        serde_json::from_str(&self.intent_json)?,
      forward_sql:   self.forward_sql,
      rollback_sql:  self.rollback_sql,
      success:       self.success,
      error_kind:    self.error_kind.as_deref().map(decode_error_kind).transpose()?,
      error_message: self.error_message,
      backup_id:     decode_opt_uuid(self.backup_id)?,
      rollback_of:   decode_opt_uuid(self.rollback_of)?,
      job_id:        decode_opt_uuid(self.job_id)?,
      executed_by:   self.executed_by,
      executed_at:   decode_dt(&self.executed_at)?,
    })
  }
}

/// A [`MigrationRecord`] flattened into bindable column values, so it can be
/// encoded on the async side and inserted on the connection thread.
pub struct EncodedRecord {
  pub record_id:     String,
  pub table_name:    String,
  pub field_id:      String,
  pub kind:          &'static str,
  pub old_value:     Option<String>,
  pub new_value:     Option<String>,
  pub intent_json:   String,
  pub forward_sql:   String,
  pub rollback_sql:  Option<String>,
  pub success:       bool,
  pub error_kind:    Option<&'static str>,
  pub error_message: Option<String>,
  pub backup_id:     Option<String>,
  pub rollback_of:   Option<String>,
  pub job_id:        Option<String>,
  pub executed_by:   String,
  pub executed_at:   String,
}

pub fn encode_record(record: &MigrationRecord) -> Result<EncodedRecord> {
  Ok(EncodedRecord {
    record_id:     encode_uuid(record.id),
    table_name:    record.table_name.to_string(),
    field_id:      record.field_id.clone(),
    kind:          record.kind.as_str(),
    old_value:     record.old_value.clone(),
    new_value:     record.new_value.clone(),
    intent_json:   serde_json::to_string(&record.intent)?,
    forward_sql:   record.forward_sql.clone(),
    rollback_sql:  record.rollback_sql.clone(),
    success:       record.success,
    error_kind:    record.error_kind.map(ErrorKind::as_str),
    error_message: record.error_message.clone(),
    backup_id:     record.backup_id.map(encode_uuid),
    rollback_of:   record.rollback_of.map(encode_uuid),
    job_id:        record.job_id.map(encode_uuid),
    executed_by:   record.executed_by.clone(),
    executed_at:   encode_dt(record.executed_at),
  })
}

impl EncodedRecord {
  pub fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
      &format!(
        "INSERT INTO _formtable_migrations ({RECORD_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
      ),
      rusqlite::params![
        self.record_id,
        self.table_name,
        self.field_id,
        self.kind,
        self.old_value,
        self.new_value,
        self.intent_json,
        self.forward_sql,
        self.rollback_sql,
        self.success,
        self.error_kind,
        self.error_message,
        self.backup_id,
        self.rollback_of,
        self.job_id,
        self.executed_by,
        self.executed_at,
      ],
    )?;
    Ok(())
  }
}

pub const BACKUP_SUMMARY_COLUMNS: &str = "backup_id, table_name, column_name, column_type, \
   row_count, created_at, retention_until, consumed_at";

/// Raw values read from a `_formtable_backups` row, without the payload.
pub struct RawBackupSummary {
  pub backup_id:       String,
  pub table_name:      String,
  pub column_name:     String,
  pub column_type:     String,
  pub row_count:       i64,
  pub created_at:      String,
  pub retention_until: String,
  pub consumed_at:     Option<String>,
}

impl RawBackupSummary {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      backup_id:       row.get(0)?,
      table_name:      row.get(1)?,
      column_name:     row.get(2)?,
      column_type:     row.get(3)?,
      row_count:       row.get(4)?,
      created_at:      row.get(5)?,
      retention_until: row.get(6)?,
      consumed_at:     row.get(7)?,
    })
  }

  pub fn into_summary(self) -> Result<BackupSummary> {
    Ok(BackupSummary {
      id:              decode_uuid(&self.backup_id)?,
      table_name:      decode_ident(self.table_name)?,
      column_name:     decode_ident(self.column_name)?,
      column_type:     ColumnType::from_declared(&self.column_type),
      row_count:       usize::try_from(self.row_count).unwrap_or_default(),
      created_at:      decode_dt(&self.created_at)?,
      retention_until: decode_dt(&self.retention_until)?,
      consumed_at:     self.consumed_at.as_deref().map(decode_dt).transpose()?,
    })
  }

  /// Attach the decoded payload.
  pub fn into_backup(self, rows_json: &str) -> Result<DataBackup> {
    let rows: Vec<BackupRow> = serde_json::from_str(rows_json)?;
    let s = self.into_summary()?;
    Ok(DataBackup {
      id: s.id,
      table_name: s.table_name,
      column_name: s.column_name,
      column_type: s.column_type,
      rows,
      created_at: s.created_at,
      retention_until: s.retention_until,
      consumed_at: s.consumed_at,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let b = a + chrono::Duration::milliseconds(1);
    assert_eq!(encode_dt(a).len(), encode_dt(b).len());
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn cells_map_to_storage_classes() {
    assert_eq!(cell_from_sql(ValueRef::Integer(30)), CellValue::Integer(30));
    assert_eq!(cell_from_sql(ValueRef::Text(b"abc")), CellValue::Text("abc".into()));
    assert_eq!(cell_to_sql(&CellValue::Null), Value::Null);
  }

  #[test]
  fn unknown_owner_kind_is_a_decode_error() {
    assert!(matches!(decode_owner_kind("page"), Err(Error::Decode(_))));
  }
}
