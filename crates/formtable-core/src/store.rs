//! The `SchemaStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g.
//! `formtable-store-sqlite`). The engine depends on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  error::ErrorClass,
  field::TableTarget,
  identifier::Identifier,
  plan::MigrationPlan,
  record::{BackupQuery, BackupSummary, DataBackup, HistoryQuery, MigrationRecord, Page},
  types::ColumnType,
};

// ─── Supporting types ────────────────────────────────────────────────────────

/// One column of a live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
  pub name:        String,
  pub column_type: ColumnType,
}

/// Who and when, attached to every write.
#[derive(Debug, Clone)]
pub struct ExecContext {
  pub executed_by: String,
  pub executed_at: DateTime<Utc>,
  pub job_id:      Option<Uuid>,
  /// Set when the plan reverses an earlier record.
  pub rollback_of: Option<Uuid>,
  /// How long backups taken by the plan are kept.
  pub retention:   Duration,
}

/// Result of [`SchemaStore::restore_backup`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreOutcome {
  pub rows_restored:    usize,
  pub column_recreated: bool,
  /// The ADD record written when the column had to be recreated.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub record:           Option<MigrationRecord>,
}

/// Which backups a retention sweep removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionCutoff {
  /// `retention_until` before the instant.
  ExpiredBefore(DateTime<Utc>),
  /// `created_at` before the instant, regardless of retention.
  CreatedBefore(DateTime<Utc>),
}

impl RetentionCutoff {
  pub fn instant(self) -> DateTime<Utc> {
    match self {
      Self::ExpiredBefore(t) | Self::CreatedBefore(t) => t,
    }
  }
}

/// Read-only dry run of a RETYPE over the live rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionProbe {
  pub rows:          usize,
  pub non_null:      usize,
  pub failures:      usize,
  /// `(row_id, reason)` of the first row that would fail.
  pub first_failure: Option<(i64, String)>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the database that holds the dynamic tables and the
/// engine's own audit tables.
///
/// All methods return `Send` futures so the trait can be used from the queue's
/// worker tasks and from axum handlers.
pub trait SchemaStore: Send + Sync {
  type Error: std::error::Error + ErrorClass + Send + Sync + 'static;

  // ── Tables ────────────────────────────────────────────────────────────

  fn table_exists<'a>(
    &'a self,
    table: &'a Identifier,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Create a dynamic table carrying only the system columns and register it.
  /// Fails if the table already exists.
  fn create_table(
    &self,
    target: TableTarget,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Every table the engine has provisioned.
  fn list_tables(&self) -> impl Future<Output = Result<Vec<TableTarget>, Self::Error>> + Send + '_;

  /// The live columns of `table`, in declaration order. Fails with a
  /// not-found error if the table does not exist.
  fn list_columns<'a>(
    &'a self,
    table: &'a Identifier,
  ) -> impl Future<Output = Result<Vec<ColumnInfo>, Self::Error>> + Send + 'a;

  /// Read every row of `column` and report how many would fail conversion to
  /// `target`. Writes nothing.
  fn probe_conversion<'a>(
    &'a self,
    table: &'a Identifier,
    column: &'a Identifier,
    target: ColumnType,
  ) -> impl Future<Output = Result<ConversionProbe, Self::Error>> + Send + 'a;

  // ── Migrations ────────────────────────────────────────────────────────

  /// Execute every step of `plan` and write its success record, all in one
  /// transaction. On error nothing is committed.
  fn apply(
    &self,
    plan: MigrationPlan,
    ctx: ExecContext,
  ) -> impl Future<Output = Result<MigrationRecord, Self::Error>> + Send + '_;

  /// Persist a record outside of any migration (failed outcomes).
  fn append_record(
    &self,
    record: MigrationRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_record(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<MigrationRecord>, Self::Error>> + Send + '_;

  /// Records for `table`, newest first.
  fn list_records<'a>(
    &'a self,
    table: &'a Identifier,
    query: &'a HistoryQuery,
  ) -> impl Future<Output = Result<Page<MigrationRecord>, Self::Error>> + Send + 'a;

  /// The successful record that reverses `id`, if any.
  fn find_reversal(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<MigrationRecord>, Self::Error>> + Send + '_;

  /// The first record written by queued job `job_id`, if any. A successful
  /// record is preferred over a failed one.
  fn record_for_job(
    &self,
    job_id: Uuid,
  ) -> impl Future<Output = Result<Option<MigrationRecord>, Self::Error>> + Send + '_;

  // ── Backups ───────────────────────────────────────────────────────────

  fn get_backup(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<DataBackup>, Self::Error>> + Send + '_;

  /// Backup metadata for `table`, newest first.
  fn list_backups<'a>(
    &'a self,
    table: &'a Identifier,
    query: &'a BackupQuery,
  ) -> impl Future<Output = Result<Page<BackupSummary>, Self::Error>> + Send + 'a;

  /// Write a backup's values back into its column and mark it consumed.
  ///
  /// `recreate`, when given, is an ADD plan run first in the same transaction;
  /// its record is returned in the outcome. Rows deleted since the snapshot
  /// are skipped. A backup that is already consumed is rejected.
  fn restore_backup(
    &self,
    backup_id: Uuid,
    recreate: Option<MigrationPlan>,
    ctx: ExecContext,
  ) -> impl Future<Output = Result<RestoreOutcome, Self::Error>> + Send + '_;

  /// Delete (or with `dry_run`, count) the backups selected by `cutoff`.
  fn delete_backups(
    &self,
    cutoff: RetentionCutoff,
    dry_run: bool,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
