//! Audit records and data backups.
//!
//! Both are append-only from the engine's point of view: a rollback writes a
//! new [`MigrationRecord`] rather than editing the one it reverses, and a
//! restore marks a [`DataBackup`] consumed rather than deleting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::ErrorKind,
  identifier::Identifier,
  intent::{ChangeIntent, ChangeKind},
  plan::MigrationPlan,
  store::ExecContext,
  types::{CellValue, ColumnType},
};

// ─── Migration record ────────────────────────────────────────────────────────

/// Immutable audit entry for one executed (or attempted) change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
  pub id:            Uuid,
  pub table_name:    Identifier,
  pub field_id:      String,
  pub kind:          ChangeKind,
  pub old_value:     Option<String>,
  pub new_value:     Option<String>,
  /// The intent with every name resolved, as executed.
  pub intent:        ChangeIntent,
  pub forward_sql:   String,
  /// `None` when the change cannot be reversed.
  pub rollback_sql:  Option<String>,
  pub success:       bool,
  pub error_kind:    Option<ErrorKind>,
  pub error_message: Option<String>,
  pub backup_id:     Option<Uuid>,
  /// Set when this record documents the reversal of another record.
  pub rollback_of:   Option<Uuid>,
  pub job_id:        Option<Uuid>,
  pub executed_by:   String,
  /// The instant the intent was dequeued.
  pub executed_at:   DateTime<Utc>,
}

impl MigrationRecord {
  /// The record written alongside a successfully applied plan.
  pub fn succeeded(plan: &MigrationPlan, ctx: &ExecContext) -> Self {
    Self {
      id:            Uuid::new_v4(),
      table_name:    plan.table.clone(),
      field_id:      plan.intent.field_id.clone(),
      kind:          plan.intent.kind,
      old_value:     plan.intent.old_value(),
      new_value:     plan.intent.new_value(),
      intent:        plan.intent.clone(),
      forward_sql:   plan.forward_sql.clone(),
      rollback_sql:  plan.rollback_sql.clone(),
      success:       true,
      error_kind:    None,
      error_message: None,
      backup_id:     plan.backup_id,
      rollback_of:   ctx.rollback_of,
      job_id:        ctx.job_id,
      executed_by:   ctx.executed_by.clone(),
      executed_at:   ctx.executed_at,
    }
  }

  /// The record for an intent that did not apply. `plan` is absent when the
  /// intent failed before a plan could be built.
  pub fn failed(
    table: &Identifier,
    intent: &ChangeIntent,
    plan: Option<&MigrationPlan>,
    ctx: &ExecContext,
    kind: ErrorKind,
    message: impl Into<String>,
  ) -> Self {
    let intent = plan.map(|p| &p.intent).unwrap_or(intent);
    Self {
      id:            Uuid::new_v4(),
      table_name:    table.clone(),
      field_id:      intent.field_id.clone(),
      kind:          intent.kind,
      old_value:     intent.old_value(),
      new_value:     intent.new_value(),
      intent:        intent.clone(),
      forward_sql:   plan.map(|p| p.forward_sql.clone()).unwrap_or_default(),
      rollback_sql:  None,
      success:       false,
      error_kind:    Some(kind),
      error_message: Some(message.into()),
      backup_id:     None,
      rollback_of:   ctx.rollback_of,
      job_id:        ctx.job_id,
      executed_by:   ctx.executed_by.clone(),
      executed_at:   ctx.executed_at,
    }
  }

  /// Whether this record reverses another one.
  pub fn is_reversal(&self) -> bool { self.rollback_of.is_some() }
}

// ─── Backups ─────────────────────────────────────────────────────────────────

/// One row of a column snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRow {
  pub row_id: i64,
  pub value:  CellValue,
}

/// A point-in-time snapshot of one column, taken before destructive DDL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBackup {
  pub id:              Uuid,
  pub table_name:      Identifier,
  pub column_name:     Identifier,
  /// Declared type at snapshot time; used to recreate a dropped column.
  pub column_type:     ColumnType,
  /// Ordered by `row_id`.
  pub rows:            Vec<BackupRow>,
  pub created_at:      DateTime<Utc>,
  pub retention_until: DateTime<Utc>,
  pub consumed_at:     Option<DateTime<Utc>>,
}

impl DataBackup {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.retention_until < now }

  pub fn summary(&self) -> BackupSummary {
    BackupSummary {
      id:              self.id,
      table_name:      self.table_name.clone(),
      column_name:     self.column_name.clone(),
      column_type:     self.column_type,
      row_count:       self.rows.len(),
      created_at:      self.created_at,
      retention_until: self.retention_until,
      consumed_at:     self.consumed_at,
    }
  }
}

/// Backup metadata without the row payload, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSummary {
  pub id:              Uuid,
  pub table_name:      Identifier,
  pub column_name:     Identifier,
  pub column_type:     ColumnType,
  pub row_count:       usize,
  pub created_at:      DateTime<Utc>,
  pub retention_until: DateTime<Utc>,
  pub consumed_at:     Option<DateTime<Utc>>,
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Filter on [`MigrationRecord::success`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
  #[default]
  All,
  Success,
  Failure,
}

/// Parameters for [`crate::store::SchemaStore::list_records`].
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
  pub status: StatusFilter,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// Parameters for [`crate::store::SchemaStore::list_backups`].
#[derive(Debug, Clone)]
pub struct BackupQuery {
  /// Reference instant for deciding expiry.
  pub now:             DateTime<Utc>,
  pub include_expired: bool,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items:  Vec<T>,
  /// Total number of matching items, ignoring `limit`/`offset`.
  pub total:  usize,
  pub limit:  usize,
  pub offset: usize,
}

/// Clamp caller-supplied paging to sane bounds.
pub fn page_bounds(limit: Option<usize>, offset: Option<usize>) -> (usize, usize) {
  let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
  (limit, offset.unwrap_or(0))
}
