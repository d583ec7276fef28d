//! Audit history and rollback.
//!
//! | Method | Path | Role |
//! |--------|------|------|
//! | `GET`  | `/history/{table}?limit&offset&status` | read_only |
//! | `POST` | `/rollback/{record_id}` | admin |

use axum::{Json, extract::State};
use formtable_core::{
  Identifier,
  record::{HistoryQuery, MigrationRecord, Page, StatusFilter},
  store::SchemaStore,
};
use formtable_ident::Translator;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  AppState,
  auth::{Caller, Role},
  error::ApiError,
  extract::{ApiPath, ApiQuery},
};

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
  #[serde(default)]
  pub status: StatusFilter,
}

/// `GET /history/{table}`, newest first.
pub async fn list<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiPath(table): ApiPath<Identifier>,
  ApiQuery(params): ApiQuery<HistoryParams>,
) -> Result<Json<Page<MigrationRecord>>, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::ReadOnly)?;
  let query = HistoryQuery { status: params.status, limit: params.limit, offset: params.offset };
  Ok(Json(state.engine.history(&table, &query).await?))
}

/// `POST /rollback/{record_id}`
pub async fn rollback<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiPath(record_id): ApiPath<Uuid>,
) -> Result<Json<MigrationRecord>, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::Admin)?;
  Ok(Json(state.engine.rollback(record_id, &caller.username).await?))
}
