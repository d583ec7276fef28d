//! `GET /queue/status[?table_target]`: job counts by state.

use axum::{Json, extract::State};
use formtable_core::{Identifier, store::SchemaStore};
use formtable_engine::QueueStatus;
use formtable_ident::Translator;
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::{Caller, Role},
  error::ApiError,
  extract::ApiQuery,
};

#[derive(Debug, Deserialize)]
pub struct StatusParams {
  pub table_target: Option<Identifier>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub table_target: Option<Identifier>,
  #[serde(flatten)]
  pub counts:       QueueStatus,
}

pub async fn status<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiQuery(params): ApiQuery<StatusParams>,
) -> Result<Json<StatusResponse>, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::ReadOnly)?;
  let counts = state.engine.queue_status(params.table_target.as_ref());
  Ok(Json(StatusResponse { table_target: params.table_target, counts }))
}
