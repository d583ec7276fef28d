//! Backup listing, restore and the retention sweep.
//!
//! | Method   | Path | Role |
//! |----------|------|------|
//! | `GET`    | `/backups/{table}?include_expired&limit&offset` | read_only |
//! | `POST`   | `/restore/{backup_id}` | admin |
//! | `DELETE` | `/cleanup?days&dry_run` | admin |

use axum::{Json, extract::State};
use formtable_core::{
  Identifier,
  record::{BackupSummary, Page},
  store::SchemaStore,
};
use formtable_ident::Translator;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
  AppState,
  auth::{Caller, Role},
  error::ApiError,
  extract::{ApiPath, ApiQuery},
};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub include_expired: bool,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

/// `GET /backups/{table}`: metadata only, never the rows.
pub async fn list<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiPath(table): ApiPath<Identifier>,
  ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Page<BackupSummary>>, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::ReadOnly)?;
  let page = state
    .engine
    .backups(&table, params.include_expired, params.limit, params.offset)
    .await?;
  Ok(Json(page))
}

// ─── Restore ─────────────────────────────────────────────────────────────────

/// `POST /restore/{backup_id}`
pub async fn restore<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiPath(backup_id): ApiPath<Uuid>,
) -> Result<Json<Value>, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::Admin)?;
  let outcome = state.engine.restore(backup_id, &caller.username).await?;
  Ok(Json(json!({
    "rows_restored": outcome.rows_restored,
    "column_recreated": outcome.column_recreated,
  })))
}

// ─── Cleanup ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CleanupParams {
  /// Delete backups created more than this many days ago, ignoring their
  /// retention date.
  pub days:    Option<u32>,
  #[serde(default)]
  pub dry_run: bool,
}

/// `DELETE /cleanup`
pub async fn cleanup<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiQuery(params): ApiQuery<CleanupParams>,
) -> Result<Json<Value>, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::Admin)?;
  let report = state.engine.cleanup(params.days, params.dry_run).await?;
  let count_key = if report.dry_run { "would_delete_count" } else { "deleted_count" };
  Ok(Json(json!({ count_key: report.count, "cutoff": report.cutoff })))
}
