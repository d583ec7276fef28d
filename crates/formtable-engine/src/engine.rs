//! [`Engine`]: the operations the control surface exposes, wired over one
//! executor, one queue and one store.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use formtable_core::{
  Identifier,
  clock::Clock,
  diff::{SuspectedRename, diff, suspected_renames},
  field::{FieldDefinition, OwnerKind, TableTarget},
  intent::ChangeIntent,
  record::{BackupQuery, BackupSummary, HistoryQuery, MigrationRecord, Page},
  store::{RestoreOutcome, RetentionCutoff, SchemaStore},
};
use formtable_ident::{IdentifierConfig, IdentifierGenerator, NameContext, TranslationCache, Translator};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  executor::{Executor, Preview},
  locks::TableLocks,
  queue::{MigrationQueue, QueueConfig, QueueStatus, QueuedJob},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Days a backup is kept before the retention sweep may delete it.
  pub retention_days: i64,
  pub queue:          QueueConfig,
  pub naming:         IdentifierConfig,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      retention_days: 90,
      queue:          QueueConfig::default(),
      naming:         IdentifierConfig::default(),
    }
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
  pub queued_jobs:       Vec<QueuedJob>,
  /// DROP + ADD pairs that look like renames whose field id was lost.
  pub suspected_renames: Vec<SuspectedRename>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
  /// Backups deleted, or that would be deleted on a dry run.
  pub count:   usize,
  pub dry_run: bool,
  pub cutoff:  DateTime<Utc>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S, T> {
  store:    Arc<S>,
  names:    Arc<IdentifierGenerator<T>>,
  executor: Arc<Executor<S, T>>,
  queue:    MigrationQueue<Executor<S, T>>,
  clock:    Arc<dyn Clock>,
}

impl<S, T> Engine<S, T>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  pub fn new(
    store:      Arc<S>,
    translator: T,
    cache:      Arc<dyn TranslationCache>,
    clock:      Arc<dyn Clock>,
    config:     EngineConfig,
  ) -> Self {
    let names = Arc::new(IdentifierGenerator::new(translator, cache, config.naming));
    let executor = Arc::new(Executor::new(
      store.clone(),
      names.clone(),
      clock.clone(),
      Arc::new(TableLocks::default()),
      Duration::days(config.retention_days),
    ));
    let queue = MigrationQueue::new(executor.clone(), clock.clone(), config.queue);
    Self { store, names, executor, queue, clock }
  }

  async fn require_table(&self, table: &Identifier) -> Result<()> {
    if self.store.table_exists(table).await.map_err(Error::store)? {
      Ok(())
    } else {
      Err(formtable_core::Error::not_found("table", table).into())
    }
  }

  /// Dry-run `intents` against the live schema.
  pub async fn preview(&self, table: &Identifier, intents: &[ChangeIntent]) -> Result<Preview> {
    self.executor.preview(table, intents).await
  }

  /// Validate and enqueue `intents`. Returns as soon as they are queued; the
  /// outcome of each shows up in the history.
  pub async fn execute(
    &self,
    table:   &Identifier,
    intents: Vec<ChangeIntent>,
    actor:   &str,
  ) -> Result<Vec<QueuedJob>> {
    self.require_table(table).await?;
    for intent in &intents {
      intent.validate()?;
    }
    Ok(
      intents
        .into_iter()
        .map(|intent| self.queue.enqueue(table.clone(), intent, actor))
        .collect(),
    )
  }

  /// Diff two snapshots of a form definition and enqueue the resulting
  /// intents. Later migration failures never fail this call.
  pub async fn sync_definition(
    &self,
    table: &Identifier,
    old:   &[FieldDefinition],
    new:   &[FieldDefinition],
    actor: &str,
  ) -> Result<SyncOutcome> {
    let intents = diff(old, new)?;
    let suspected = suspected_renames(old, new);
    for pair in &suspected {
      tracing::warn!(
        table = %table,
        dropped = %pair.dropped_field_id,
        added = %pair.added_field_id,
        similarity = pair.similarity,
        "field looks renamed but has a new id; it will be dropped and re-added"
      );
    }

    let queued_jobs = self.execute(table, intents, actor).await?;
    tracing::info!(table = %table, jobs = queued_jobs.len(), "definition synced");
    Ok(SyncOutcome { queued_jobs, suspected_renames: suspected })
  }

  /// Name and create the physical table for a new form or sub-form.
  pub async fn provision_table(
    &self,
    owner_kind: OwnerKind,
    owner_id:   &str,
    label:      &str,
    existing:   &HashSet<String>,
  ) -> Result<TableTarget> {
    let mut taken = existing.clone();
    let tables = self.store.list_tables().await.map_err(Error::store)?;
    taken.extend(tables.into_iter().map(|t| t.table_name.to_string()));

    let table_name = self.names.generate(label, NameContext::Form, &taken, owner_id).await?;
    let target = TableTarget { table_name, owner_kind, owner_id: owner_id.to_owned() };
    self.store.create_table(target.clone()).await.map_err(Error::store)?;

    tracing::info!(table = %target.table_name, owner_id, "table provisioned");
    Ok(target)
  }

  pub async fn history(&self, table: &Identifier, query: &HistoryQuery) -> Result<Page<MigrationRecord>> {
    self.store.list_records(table, query).await.map_err(Error::store)
  }

  pub async fn rollback(&self, record_id: Uuid, actor: &str) -> Result<MigrationRecord> {
    self.executor.rollback(record_id, actor).await
  }

  pub async fn backups(
    &self,
    table:           &Identifier,
    include_expired: bool,
    limit:           Option<usize>,
    offset:          Option<usize>,
  ) -> Result<Page<BackupSummary>> {
    let query = BackupQuery { now: self.clock.now(), include_expired, limit, offset };
    self.store.list_backups(table, &query).await.map_err(Error::store)
  }

  pub async fn restore(&self, backup_id: Uuid, actor: &str) -> Result<RestoreOutcome> {
    self.executor.restore(backup_id, actor).await
  }

  pub fn queue_status(&self, table: Option<&Identifier>) -> QueueStatus { self.queue.status(table) }

  /// Delete backups past their retention, or, with `days`, every backup
  /// older than that many days.
  pub async fn cleanup(&self, days: Option<u32>, dry_run: bool) -> Result<CleanupReport> {
    let now = self.clock.now();
    let cutoff = match days {
      Some(days) => RetentionCutoff::CreatedBefore(now - Duration::days(i64::from(days))),
      None => RetentionCutoff::ExpiredBefore(now),
    };
    let count = self.store.delete_backups(cutoff, dry_run).await.map_err(Error::store)?;

    tracing::info!(count, dry_run, cutoff = %cutoff.instant(), "backup retention sweep");
    Ok(CleanupReport { count, dry_run, cutoff: cutoff.instant() })
  }

  /// Wait for every queued job to finish.
  pub async fn wait_idle(&self) { self.queue.wait_idle().await }
}
