//! [`SqliteStore`]: the SQLite implementation of [`SchemaStore`].

use std::path::Path;

use chrono::Utc;
use formtable_core::{
  Error as CoreError, Identifier,
  field::TableTarget,
  plan::{MigrationPlan, Step, create_table_sql},
  record::{
    BackupQuery, BackupRow, BackupSummary, DataBackup, HistoryQuery, MigrationRecord, Page,
    StatusFilter, page_bounds,
  },
  store::{
    ColumnInfo, ConversionProbe, ExecContext, RestoreOutcome, RetentionCutoff, SchemaStore,
  },
  types::{CellValue, ColumnType, convert_cell},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    BACKUP_SUMMARY_COLUMNS, RECORD_COLUMNS, RawBackupSummary, RawRecord, RawTable, TABLE_COLUMNS,
    cell_from_sql, cell_to_sql, encode_dt, encode_owner_kind, encode_record, encode_uuid,
  },
  error::raise,
  schema::{SCHEMA, SCHEMA_VERSION},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The dynamic tables and the engine's bookkeeping, in one SQLite database.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if version < SCHEMA_VERSION {
          conn.execute_batch(SCHEMA)?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert one data row into a dynamic table and return its row id.
  ///
  /// The engine never writes submission data itself; this exists for
  /// seeding and inspection tooling.
  pub async fn insert_row(
    &self,
    table:  &Identifier,
    values: Vec<(Identifier, CellValue)>,
  ) -> Result<i64> {
    let sql = if values.is_empty() {
      format!("INSERT INTO {} DEFAULT VALUES", table.quoted())
    } else {
      let columns: Vec<String> = values.iter().map(|(c, _)| c.quoted()).collect();
      let slots: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
      format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.quoted(),
        columns.join(", "),
        slots.join(", ")
      )
    };
    let params: Vec<rusqlite::types::Value> = values.iter().map(|(_, v)| cell_to_sql(v)).collect();

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(conn.last_insert_rowid())
      })
      .await?;
    Ok(id)
  }

  /// Every `(row id, value)` of `column`, ordered by row id.
  pub async fn column_values(
    &self,
    table:  &Identifier,
    column: &Identifier,
  ) -> Result<Vec<(i64, CellValue)>> {
    let (table, column) = (table.clone(), column.clone());
    let cells = self
      .conn
      .call(move |conn| Ok(read_cells(conn, &table, &column)?))
      .await?;
    Ok(cells)
  }
}

// ─── Connection-thread helpers ───────────────────────────────────────────────

/// Timestamps stamped onto backups and restores, encoded up front.
struct Stamp {
  now:             String,
  retention_until: String,
}

impl Stamp {
  fn new(ctx: &ExecContext) -> Self {
    Self {
      now:             encode_dt(ctx.executed_at),
      retention_until: encode_dt(ctx.executed_at + ctx.retention),
    }
  }
}

const TABLE_EXISTS: &str =
  "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)";

fn read_cells(
  conn:   &rusqlite::Connection,
  table:  &Identifier,
  column: &Identifier,
) -> rusqlite::Result<Vec<(i64, CellValue)>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT \"id\", {} FROM {} ORDER BY \"id\"",
    column.quoted(),
    table.quoted()
  ))?;
  let rows = stmt
    .query_map([], |row| Ok((row.get(0)?, cell_from_sql(row.get_ref(1)?))))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Copy `column` into a new backup row.
fn snapshot(
  conn:        &rusqlite::Connection,
  table:       &Identifier,
  id:          Uuid,
  column:      &Identifier,
  column_type: ColumnType,
  stamp:       &Stamp,
) -> tokio_rusqlite::Result<usize> {
  let rows: Vec<BackupRow> = read_cells(conn, table, column)?
    .into_iter()
    .map(|(row_id, value)| BackupRow { row_id, value })
    .collect();
  let rows_json = serde_json::to_string(&rows).map_err(|e| raise(e.into()))?;

  conn.execute(
    "INSERT INTO _formtable_backups (
       backup_id, table_name, column_name, column_type,
       rows_json, row_count, created_at, retention_until
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    rusqlite::params![
      encode_uuid(id),
      table.as_str(),
      column.as_str(),
      column_type.sql(),
      rows_json,
      rows.len() as i64,
      stamp.now,
      stamp.retention_until,
    ],
  )?;
  Ok(rows.len())
}

/// Cast every row of `source` into `dest`. The first failing row aborts.
fn convert(
  conn:   &rusqlite::Connection,
  table:  &Identifier,
  source: &Identifier,
  dest:   &Identifier,
  target: ColumnType,
) -> tokio_rusqlite::Result<()> {
  let cells = read_cells(conn, table, source)?;
  let mut update = conn.prepare(&format!(
    "UPDATE {} SET {} = ?1 WHERE \"id\" = ?2",
    table.quoted(),
    dest.quoted()
  ))?;
  for (row_id, value) in cells {
    let converted = convert_cell(&value, target).map_err(|reason| {
      raise(CoreError::Conversion { row_id, column: source.to_string(), reason })
    })?;
    update.execute(rusqlite::params![cell_to_sql(&converted), row_id])?;
  }
  Ok(())
}

/// Write a backup's values back by row id and mark it consumed. Rows deleted
/// since the snapshot match nothing and are skipped.
fn restore(
  conn:      &rusqlite::Connection,
  table:     &Identifier,
  column:    &Identifier,
  backup_id: Uuid,
  stamp:     &Stamp,
) -> tokio_rusqlite::Result<usize> {
  let id_str = encode_uuid(backup_id);
  let found: Option<(String, String, Option<String>)> = conn
    .query_row(
      "SELECT table_name, rows_json, consumed_at FROM _formtable_backups WHERE backup_id = ?1",
      rusqlite::params![id_str],
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )
    .optional()?;

  let Some((backup_table, rows_json, consumed_at)) = found else {
    return Err(raise(CoreError::not_found("backup", backup_id)));
  };
  if consumed_at.is_some() {
    return Err(raise(CoreError::Irreversible(format!(
      "backup {backup_id} has already been restored"
    ))));
  }
  if backup_table != table.as_str() {
    return Err(raise(CoreError::Validation(format!(
      "backup {backup_id} belongs to table {backup_table}, not {table}"
    ))));
  }

  let rows: Vec<BackupRow> = serde_json::from_str(&rows_json).map_err(|e| raise(e.into()))?;
  let mut update = conn.prepare(&format!(
    "UPDATE {} SET {} = ?1 WHERE \"id\" = ?2",
    table.quoted(),
    column.quoted()
  ))?;
  let mut restored = 0;
  for row in &rows {
    restored += update.execute(rusqlite::params![cell_to_sql(&row.value), row.row_id])?;
  }

  conn.execute(
    "UPDATE _formtable_backups SET consumed_at = ?1 WHERE backup_id = ?2",
    rusqlite::params![stamp.now, id_str],
  )?;
  Ok(restored)
}

/// Execute every step of `plan`. Returns the number of rows restored.
fn run_steps(
  conn:  &rusqlite::Connection,
  plan:  &MigrationPlan,
  stamp: &Stamp,
) -> tokio_rusqlite::Result<usize> {
  let mut restored = 0;
  for step in &plan.steps {
    match step {
      Step::Backup { id, column, column_type } => {
        snapshot(conn, &plan.table, *id, column, *column_type, stamp)?;
      }
      Step::Ddl { sql } => conn.execute_batch(sql)?,
      Step::Convert { source, dest, target } => {
        convert(conn, &plan.table, source, dest, *target)?;
      }
      Step::Restore { backup_id, column } => {
        restored += restore(conn, &plan.table, column, *backup_id, stamp)?;
      }
    }
  }
  Ok(restored)
}

fn status_param(status: StatusFilter) -> Option<bool> {
  match status {
    StatusFilter::All => None,
    StatusFilter::Success => Some(true),
    StatusFilter::Failure => Some(false),
  }
}

// ─── SchemaStore impl ────────────────────────────────────────────────────────

impl SchemaStore for SqliteStore {
  type Error = Error;

  // ── Tables ────────────────────────────────────────────────────────────────

  async fn table_exists(&self, table: &Identifier) -> Result<bool> {
    let name = table.to_string();
    let exists = self
      .conn
      .call(move |conn| Ok(conn.query_row(TABLE_EXISTS, rusqlite::params![name], |r| r.get(0))?))
      .await?;
    Ok(exists)
  }

  async fn create_table(&self, target: TableTarget) -> Result<()> {
    let ddl        = create_table_sql(&target);
    let name       = target.table_name.to_string();
    let owner_kind = encode_owner_kind(target.owner_kind);
    let owner_id   = target.owner_id.clone();
    let created_at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row(TABLE_EXISTS, rusqlite::params![name], |r| r.get(0))?;
        if exists {
          return Err(raise(CoreError::Validation(format!("table {name} already exists"))));
        }
        tx.execute_batch(&ddl)?;
        tx.execute(
          "INSERT INTO _formtable_tables (table_name, owner_kind, owner_id, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![name, owner_kind, owner_id, created_at],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(table = %target.table_name, "created dynamic table");
    Ok(())
  }

  async fn list_tables(&self) -> Result<Vec<TableTarget>> {
    let raws: Vec<RawTable> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TABLE_COLUMNS} FROM _formtable_tables ORDER BY created_at, table_name"
        ))?;
        let rows = stmt
          .query_map([], RawTable::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTable::into_target).collect()
  }

  async fn list_columns(&self, table: &Identifier) -> Result<Vec<ColumnInfo>> {
    let name = table.to_string();
    let cols: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let rows = stmt
          .query_map(rusqlite::params![name], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    if cols.is_empty() {
      return Err(CoreError::not_found("table", table).into());
    }
    Ok(
      cols
        .into_iter()
        .map(|(name, declared)| ColumnInfo { name, column_type: ColumnType::from_declared(&declared) })
        .collect(),
    )
  }

  async fn probe_conversion(
    &self,
    table:  &Identifier,
    column: &Identifier,
    target: ColumnType,
  ) -> Result<ConversionProbe> {
    let cells = self.column_values(table, column).await?;

    let mut probe = ConversionProbe { rows: cells.len(), ..Default::default() };
    for (row_id, value) in &cells {
      if !value.is_null() {
        probe.non_null += 1;
      }
      if let Err(reason) = convert_cell(value, target) {
        probe.failures += 1;
        probe.first_failure.get_or_insert((*row_id, reason));
      }
    }
    Ok(probe)
  }

  // ── Migrations ────────────────────────────────────────────────────────────

  async fn apply(&self, plan: MigrationPlan, ctx: ExecContext) -> Result<MigrationRecord> {
    let record  = MigrationRecord::succeeded(&plan, &ctx);
    let encoded = encode_record(&record)?;
    let stamp   = Stamp::new(&ctx);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        run_steps(&tx, &plan, &stamp)?;
        encoded.insert(&tx)?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(
      table = %record.table_name,
      kind = %record.kind,
      record_id = %record.id,
      "migration committed"
    );
    Ok(record)
  }

  async fn append_record(&self, record: MigrationRecord) -> Result<()> {
    let encoded = encode_record(&record)?;
    self
      .conn
      .call(move |conn| {
        encoded.insert(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_record(&self, id: Uuid) -> Result<Option<MigrationRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM _formtable_migrations WHERE record_id = ?1"),
            rusqlite::params![id_str],
            RawRecord::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn list_records(
    &self,
    table: &Identifier,
    query: &HistoryQuery,
  ) -> Result<Page<MigrationRecord>> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let name    = table.to_string();
    let success = status_param(query.status);

    let (total, raws): (i64, Vec<RawRecord>) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          "SELECT COUNT(*) FROM _formtable_migrations
           WHERE table_name = ?1 AND (?2 IS NULL OR success = ?2)",
          rusqlite::params![name, success],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
          "SELECT {RECORD_COLUMNS} FROM _formtable_migrations
           WHERE table_name = ?1 AND (?2 IS NULL OR success = ?2)
           ORDER BY executed_at DESC, rowid DESC
           LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![name, success, limit as i64, offset as i64],
            RawRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    Ok(Page {
      items: raws.into_iter().map(RawRecord::into_record).collect::<Result<_>>()?,
      total: usize::try_from(total).unwrap_or_default(),
      limit,
      offset,
    })
  }

  async fn find_reversal(&self, id: Uuid) -> Result<Option<MigrationRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {RECORD_COLUMNS} FROM _formtable_migrations
               WHERE rollback_of = ?1 AND success = 1
               ORDER BY executed_at LIMIT 1"
            ),
            rusqlite::params![id_str],
            RawRecord::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn record_for_job(&self, job_id: Uuid) -> Result<Option<MigrationRecord>> {
    let id_str = encode_uuid(job_id);

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {RECORD_COLUMNS} FROM _formtable_migrations
               WHERE job_id = ?1
               ORDER BY success DESC, executed_at, rowid LIMIT 1"
            ),
            rusqlite::params![id_str],
            RawRecord::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  // ── Backups ───────────────────────────────────────────────────────────────

  async fn get_backup(&self, id: Uuid) -> Result<Option<DataBackup>> {
    let id_str = encode_uuid(id);

    let raw: Option<(RawBackupSummary, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {BACKUP_SUMMARY_COLUMNS}, rows_json FROM _formtable_backups
               WHERE backup_id = ?1"
            ),
            rusqlite::params![id_str],
            |row| Ok((RawBackupSummary::from_row(row)?, row.get(8)?)),
          )
          .optional()?)
      })
      .await?;

    raw.map(|(summary, rows_json)| summary.into_backup(&rows_json)).transpose()
  }

  async fn list_backups(
    &self,
    table: &Identifier,
    query: &BackupQuery,
  ) -> Result<Page<BackupSummary>> {
    let (limit, offset)  = page_bounds(query.limit, query.offset);
    let name             = table.to_string();
    let include_expired  = query.include_expired;
    let now              = encode_dt(query.now);

    let (total, raws): (i64, Vec<RawBackupSummary>) = self
      .conn
      .call(move |conn| {
        let filter = "table_name = ?1 AND (?2 OR retention_until >= ?3)";
        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM _formtable_backups WHERE {filter}"),
          rusqlite::params![name, include_expired, now],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
          "SELECT {BACKUP_SUMMARY_COLUMNS} FROM _formtable_backups WHERE {filter}
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?4 OFFSET ?5"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![name, include_expired, now, limit as i64, offset as i64],
            RawBackupSummary::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    Ok(Page {
      items: raws.into_iter().map(RawBackupSummary::into_summary).collect::<Result<_>>()?,
      total: usize::try_from(total).unwrap_or_default(),
      limit,
      offset,
    })
  }

  async fn restore_backup(
    &self,
    backup_id: Uuid,
    recreate:  Option<MigrationPlan>,
    ctx:       ExecContext,
  ) -> Result<RestoreOutcome> {
    let record  = recreate.as_ref().map(|p| MigrationRecord::succeeded(p, &ctx));
    let encoded = record.as_ref().map(encode_record).transpose()?;
    let stamp   = Stamp::new(&ctx);
    let column_recreated = recreate.is_some();

    let rows_restored = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let target: Option<(String, String)> = tx
          .query_row(
            "SELECT table_name, column_name FROM _formtable_backups WHERE backup_id = ?1",
            rusqlite::params![encode_uuid(backup_id)],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        let Some((table, column)) = target else {
          return Err(raise(CoreError::not_found("backup", backup_id)));
        };
        let table = Identifier::parse(table).map_err(raise)?;
        let column = Identifier::parse(column).map_err(raise)?;

        if let Some(plan) = &recreate {
          run_steps(&tx, plan, &stamp)?;
        }
        if let Some(encoded) = &encoded {
          encoded.insert(&tx)?;
        }
        let restored = restore(&tx, &table, &column, backup_id, &stamp)?;
        tx.commit()?;
        Ok(restored)
      })
      .await?;

    Ok(RestoreOutcome { rows_restored, column_recreated, record })
  }

  async fn delete_backups(&self, cutoff: RetentionCutoff, dry_run: bool) -> Result<usize> {
    let column = match cutoff {
      RetentionCutoff::ExpiredBefore(_) => "retention_until",
      RetentionCutoff::CreatedBefore(_) => "created_at",
    };
    let instant = encode_dt(cutoff.instant());

    let n = self
      .conn
      .call(move |conn| {
        let n = if dry_run {
          let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM _formtable_backups WHERE {column} < ?1"),
            rusqlite::params![instant],
            |r| r.get(0),
          )?;
          usize::try_from(count).unwrap_or_default()
        } else {
          conn.execute(
            &format!("DELETE FROM _formtable_backups WHERE {column} < ?1"),
            rusqlite::params![instant],
          )?
        };
        Ok(n)
      })
      .await?;
    Ok(n)
  }
}
