//! Migration executor: resolves names, plans, and applies one intent at a
//! time against a [`SchemaStore`], under the table's lock.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use formtable_core::{
  ErrorClass, ErrorKind, Identifier,
  clock::Clock,
  field::SYSTEM_COLUMNS,
  intent::{ChangeIntent, ChangeKind},
  plan::{BackupRef, MigrationPlan, SchemaView, plan, plan_recreate, plan_reversal},
  record::{DataBackup, MigrationRecord},
  store::{ExecContext, RestoreOutcome, SchemaStore},
  types::{ColumnType, Conversion},
};
use formtable_ident::{IdentifierGenerator, NameContext, Translator};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  locks::TableLocks,
  queue::{JobFailure, JobHandler, QueueJob},
};

// ─── Preview types ───────────────────────────────────────────────────────────

/// Why an intent in a preview batch would be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
  pub kind:    ErrorKind,
  pub message: String,
}

/// The dry-run result for one intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewItem {
  pub field_id:     String,
  pub kind:         ChangeKind,
  /// The column the intent would touch, once names are resolved.
  pub column:       Option<Identifier>,
  pub sql:          String,
  pub rollback_sql: Option<String>,
  pub warnings:     Vec<String>,
  pub takes_backup: bool,
  pub error:        Option<Rejection>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreviewSummary {
  pub total:       usize,
  pub valid:       usize,
  pub rejected:    usize,
  /// Drops and narrowing retypes: the intents that take a backup.
  pub destructive: usize,
  pub warnings:    usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
  pub preview: Vec<PreviewItem>,
  pub summary: PreviewSummary,
}

impl PreviewItem {
  fn planned(plan: &MigrationPlan, warnings: Vec<String>) -> Self {
    let intent = &plan.intent;
    let column = match intent.kind {
      ChangeKind::Drop => intent.old_column_name.clone(),
      _ => intent.new_column_name.clone().or_else(|| intent.old_column_name.clone()),
    };
    Self {
      field_id: intent.field_id.clone(),
      kind: intent.kind,
      column,
      sql: plan.forward_sql.clone(),
      rollback_sql: plan.rollback_sql.clone(),
      warnings,
      takes_backup: plan.backup_id.is_some(),
      error: None,
    }
  }

  fn rejected(intent: &ChangeIntent, err: &Error) -> Self {
    Self {
      field_id:     intent.field_id.clone(),
      kind:         intent.kind,
      column:       None,
      sql:          String::new(),
      rollback_sql: None,
      warnings:     Vec::new(),
      takes_backup: false,
      error:        Some(Rejection { kind: err.kind(), message: err.to_string() }),
    }
  }
}

// ─── Executor ────────────────────────────────────────────────────────────────

pub struct Executor<S, T> {
  store:     Arc<S>,
  names:     Arc<IdentifierGenerator<T>>,
  clock:     Arc<dyn Clock>,
  locks:     Arc<TableLocks>,
  retention: Duration,
}

impl<S, T> Executor<S, T>
where
  S: SchemaStore,
  T: Translator,
{
  pub fn new(
    store:     Arc<S>,
    names:     Arc<IdentifierGenerator<T>>,
    clock:     Arc<dyn Clock>,
    locks:     Arc<TableLocks>,
    retention: Duration,
  ) -> Self {
    Self { store, names, clock, locks, retention }
  }

  pub fn context(
    &self,
    actor:       &str,
    executed_at: DateTime<Utc>,
    job_id:      Option<Uuid>,
    rollback_of: Option<Uuid>,
  ) -> ExecContext {
    ExecContext {
      executed_by: actor.to_owned(),
      executed_at,
      job_id,
      rollback_of,
      retention: self.retention,
    }
  }

  async fn live_view(&self, table: &Identifier) -> Result<SchemaView> {
    let columns = self.store.list_columns(table).await.map_err(Error::store)?;
    Ok(SchemaView::new(columns.into_iter().map(|c| (c.name, c.column_type))))
  }

  /// Fill in a generated column name for ADD and RENAME intents that only
  /// carry a label.
  async fn resolve(&self, intent: &ChangeIntent, view: &SchemaView) -> Result<ChangeIntent> {
    intent.validate()?;
    let needs_name = matches!(intent.kind, ChangeKind::Add | ChangeKind::Rename)
      && intent.new_column_name.is_none();
    let Some(label) = intent.label.as_deref().filter(|_| needs_name) else {
      return Ok(intent.clone());
    };

    let existing: HashSet<String> = SYSTEM_COLUMNS
      .iter()
      .map(|c| c.to_string())
      .chain(view.names().map(str::to_owned))
      .collect();
    let name = self
      .names
      .generate(label, NameContext::Field, &existing, &intent.field_id)
      .await?;

    let mut resolved = intent.clone();
    resolved.new_column_name = Some(name);
    Ok(resolved)
  }

  // ── Preview ───────────────────────────────────────────────────────────────

  /// Dry-run `intents` in order against the live schema. Each intent sees the
  /// schema as the ones before it would leave it. Nothing is written.
  pub async fn preview(&self, table: &Identifier, intents: &[ChangeIntent]) -> Result<Preview> {
    let live = self.live_view(table).await?;
    let mut view = live.clone();
    let mut items = Vec::with_capacity(intents.len());

    for intent in intents {
      match self.preview_one(table, intent, &live, &view).await {
        Ok((item, plan)) => {
          view.apply(&plan);
          items.push(item);
        }
        Err(err) if matches!(err.kind(), ErrorKind::Validation | ErrorKind::NotFound) => {
          items.push(PreviewItem::rejected(intent, &err));
        }
        Err(err) => return Err(err),
      }
    }

    let summary = PreviewSummary {
      total:       items.len(),
      valid:       items.iter().filter(|i| i.error.is_none()).count(),
      rejected:    items.iter().filter(|i| i.error.is_some()).count(),
      destructive: items.iter().filter(|i| i.takes_backup).count(),
      warnings:    items.iter().map(|i| i.warnings.len()).sum(),
    };
    Ok(Preview { preview: items, summary })
  }

  async fn preview_one(
    &self,
    table:  &Identifier,
    intent: &ChangeIntent,
    live:   &SchemaView,
    view:   &SchemaView,
  ) -> Result<(PreviewItem, MigrationPlan)> {
    let resolved = self.resolve(intent, view).await?;
    let plan = plan(table, &resolved, view)?;
    let mut warnings = plan.warnings.clone();

    // Probe only columns whose live data matches what the step would see.
    let probed = match resolved.kind {
      ChangeKind::Drop => resolved.old_column_name.as_ref(),
      ChangeKind::Retype => resolved.retype_column(),
      _ => None,
    }
    .filter(|c| {
      let live_type = live.column_type(c.as_str());
      live_type.is_some() && live_type == view.column_type(c.as_str())
    });

    if let Some(column) = probed {
      match (resolved.kind, plan.conversion, plan.column_type) {
        (ChangeKind::Drop, ..) => {
          let probe = self
            .store
            .probe_conversion(table, column, ColumnType::Text)
            .await
            .map_err(Error::store)?;
          if probe.non_null > 0 {
            warnings.push(format!(
              "{} of {} rows hold a value in {column}",
              probe.non_null, probe.rows
            ));
          }
        }
        (ChangeKind::Retype, Some(Conversion::Narrowing), Some(target)) => {
          let probe = self
            .store
            .probe_conversion(table, column, target)
            .await
            .map_err(Error::store)?;
          if let Some((row_id, reason)) = &probe.first_failure {
            warnings.push(format!(
              "{} of {} rows cannot be converted to {target}; first failure at row {row_id}: {reason}",
              probe.failures, probe.rows
            ));
          }
        }
        _ => {}
      }
    }

    Ok((PreviewItem::planned(&plan, warnings), plan))
  }

  // ── Execute ───────────────────────────────────────────────────────────────

  /// Apply one intent. Permanent failures are written as failed records and
  /// returned as `Ok`; transient failures are returned as `Err` for the
  /// caller to retry.
  pub async fn execute(
    &self,
    table:  &Identifier,
    intent: &ChangeIntent,
    ctx:    ExecContext,
  ) -> Result<MigrationRecord> {
    let _guard = self.locks.lock(table).await;

    // An earlier attempt of the same job may have committed after its caller
    // stopped waiting. Store calls run in order, so this sees that outcome.
    if let Some(job_id) = ctx.job_id
      && let Some(record) = self.store.record_for_job(job_id).await.map_err(Error::store)?
    {
      tracing::info!(
        table = %table,
        job_id = %job_id,
        record_id = %record.id,
        success = record.success,
        "job already has an outcome"
      );
      return Ok(record);
    }

    let (err, plan) = match self.try_execute(table, intent, &ctx).await {
      Ok(record) => return Ok(record),
      Err(failure) => failure,
    };
    if err.kind().is_retryable() {
      return Err(err);
    }

    let record = MigrationRecord::failed(table, intent, plan.as_ref(), &ctx, err.kind(), err.to_string());
    self.store.append_record(record.clone()).await.map_err(Error::store)?;
    tracing::warn!(
      table = %table,
      field_id = %intent.field_id,
      kind = %intent.kind,
      error = %err,
      record_id = %record.id,
      "migration failed"
    );
    Ok(record)
  }

  async fn try_execute(
    &self,
    table:  &Identifier,
    intent: &ChangeIntent,
    ctx:    &ExecContext,
  ) -> Result<MigrationRecord, (Error, Option<MigrationPlan>)> {
    let view = self.live_view(table).await.map_err(|e| (e, None))?;
    let resolved = self.resolve(intent, &view).await.map_err(|e| (e, None))?;
    let plan = plan(table, &resolved, &view).map_err(|e| (e.into(), None))?;

    let record = self
      .store
      .apply(plan.clone(), ctx.clone())
      .await
      .map_err(|e| (Error::store(e), Some(plan)))?;
    tracing::info!(
      table = %table,
      field_id = %record.field_id,
      kind = %record.kind,
      record_id = %record.id,
      "migration applied"
    );
    Ok(record)
  }

  // ── Rollback & restore ────────────────────────────────────────────────────

  /// Check that `backup` can still be read from.
  fn usable(&self, backup: &DataBackup) -> Result<()> {
    if let Some(at) = backup.consumed_at {
      return Err(
        formtable_core::Error::Irreversible(format!("backup {} was already restored at {at}", backup.id))
          .into(),
      );
    }
    if backup.is_expired(self.clock.now()) {
      return Err(
        formtable_core::Error::Irreversible(format!(
          "backup {} expired at {}",
          backup.id, backup.retention_until
        ))
        .into(),
      );
    }
    Ok(())
  }

  /// Reverse a successful forward migration, writing a new record that
  /// points back at it.
  pub async fn rollback(&self, record_id: Uuid, actor: &str) -> Result<MigrationRecord> {
    let record = self
      .store
      .get_record(record_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| formtable_core::Error::not_found("migration record", record_id))?;

    if !record.success {
      return Err(
        formtable_core::Error::Validation(format!("migration {record_id} failed and has nothing to undo"))
          .into(),
      );
    }
    if record.is_reversal() {
      return Err(
        formtable_core::Error::Validation(format!("migration {record_id} is itself a rollback")).into(),
      );
    }

    let _guard = self.locks.lock(&record.table_name).await;

    if let Some(undo) = self.store.find_reversal(record_id).await.map_err(Error::store)? {
      return Err(
        formtable_core::Error::Irreversible(format!(
          "migration {record_id} was already rolled back by {}",
          undo.id
        ))
        .into(),
      );
    }

    let backup = match record.backup_id {
      Some(id) => {
        let backup = self
          .store
          .get_backup(id)
          .await
          .map_err(Error::store)?
          .ok_or_else(|| formtable_core::Error::Irreversible(format!("backup {id} no longer exists")))?;
        self.usable(&backup)?;
        Some(BackupRef { id: backup.id, column_type: backup.column_type })
      }
      None => None,
    };

    let view = self.live_view(&record.table_name).await?;
    let reversal = plan_reversal(&record.table_name, &record, backup, &view)?;
    let ctx = self.context(actor, self.clock.now(), None, Some(record_id));
    let undo = self.store.apply(reversal, ctx).await.map_err(Error::store)?;

    tracing::info!(
      table = %record.table_name,
      record_id = %record_id,
      rollback_id = %undo.id,
      kind = %record.kind,
      "migration rolled back"
    );
    Ok(undo)
  }

  /// Write a backup's values back into its table, recreating the column
  /// first when it no longer exists.
  pub async fn restore(&self, backup_id: Uuid, actor: &str) -> Result<RestoreOutcome> {
    let backup = self
      .store
      .get_backup(backup_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| formtable_core::Error::not_found("backup", backup_id))?;
    self.usable(&backup)?;

    let table = &backup.table_name;
    let _guard = self.locks.lock(table).await;

    let view = self.live_view(table).await?;
    let recreate = if view.contains(backup.column_name.as_str()) {
      None
    } else {
      Some(plan_recreate(
        table,
        backup.column_name.as_str(),
        &backup.column_name,
        None,
        backup.column_type,
        &view,
      )?)
    };

    let ctx = self.context(actor, self.clock.now(), None, None);
    let outcome = self
      .store
      .restore_backup(backup_id, recreate, ctx)
      .await
      .map_err(Error::store)?;

    tracing::info!(
      table = %table,
      backup_id = %backup_id,
      rows = outcome.rows_restored,
      recreated = outcome.column_recreated,
      "backup restored"
    );
    Ok(outcome)
  }
}

// ─── Queue integration ───────────────────────────────────────────────────────

impl<S, T> JobHandler for Executor<S, T>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  async fn run(&self, job: &QueueJob, dequeued_at: DateTime<Utc>) -> Result<Uuid, JobFailure> {
    let ctx = self.context(&job.actor, dequeued_at, Some(job.id), None);
    match self.execute(&job.table_key, &job.intent, ctx).await {
      Ok(record) if record.success => Ok(record.id),
      Ok(record) => Err(JobFailure {
        message:   record.error_message.unwrap_or_default(),
        retryable: false,
        recorded:  true,
      }),
      Err(err) => Err(JobFailure {
        message:   err.to_string(),
        retryable: err.kind().is_retryable(),
        recorded:  false,
      }),
    }
  }

  async fn give_up(&self, job: &QueueJob, dequeued_at: DateTime<Utc>, failure: &JobFailure) -> Option<Uuid> {
    match self.store.record_for_job(job.id).await {
      Ok(Some(record)) if record.success => return Some(record.id),
      Ok(Some(_)) => return None,
      Ok(None) => {}
      Err(err) => tracing::warn!(job_id = %job.id, error = %err, "could not look up job outcome"),
    }

    let ctx = self.context(&job.actor, dequeued_at, Some(job.id), None);
    let kind = if failure.retryable { ErrorKind::Transient } else { ErrorKind::Internal };
    let record = MigrationRecord::failed(&job.table_key, &job.intent, None, &ctx, kind, failure.message.clone());
    if let Err(err) = self.store.append_record(record).await {
      tracing::error!(job_id = %job.id, error = %err, "could not record failed job");
    }
    None
  }
}
