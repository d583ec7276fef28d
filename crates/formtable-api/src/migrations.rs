//! Handlers that plan or schedule schema changes.
//!
//! | Method | Path | Role |
//! |--------|------|------|
//! | `POST` | `/preview` | read_only |
//! | `POST` | `/execute` | execute |
//! | `POST` | `/sync` | execute |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use formtable_core::{Identifier, field::FieldDefinition, intent::ChangeIntent, store::SchemaStore};
use formtable_engine::Preview;
use formtable_ident::Translator;
use serde::Deserialize;
use serde_json::json;

use crate::{
  AppState,
  auth::{Caller, Role},
  error::ApiError,
  extract::ApiJson,
};

#[derive(Debug, Deserialize)]
pub struct ChangeBody {
  pub table_target:   Identifier,
  pub change_intents: Vec<ChangeIntent>,
}

// ─── Preview ─────────────────────────────────────────────────────────────────

/// `POST /preview`: dry run, no side effects.
pub async fn preview<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiJson(body): ApiJson<ChangeBody>,
) -> Result<Json<Preview>, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::ReadOnly)?;
  let preview = state.engine.preview(&body.table_target, &body.change_intents).await?;
  Ok(Json(preview))
}

// ─── Execute ─────────────────────────────────────────────────────────────────

/// `POST /execute`: enqueue and return job handles immediately.
pub async fn execute<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiJson(body): ApiJson<ChangeBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::Execute)?;
  let jobs = state
    .engine
    .execute(&body.table_target, body.change_intents, &caller.username)
    .await?;
  Ok((StatusCode::ACCEPTED, Json(json!({ "queued_jobs": jobs }))))
}

// ─── Sync ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SyncBody {
  pub table_target: Identifier,
  #[serde(default)]
  pub old_fields:   Vec<FieldDefinition>,
  pub new_fields:   Vec<FieldDefinition>,
}

/// `POST /sync`: diff two definitions and enqueue the result.
pub async fn sync<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiJson(body): ApiJson<SyncBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::Execute)?;
  let outcome = state
    .engine
    .sync_definition(&body.table_target, &body.old_fields, &body.new_fields, &caller.username)
    .await?;
  Ok((StatusCode::ACCEPTED, Json(outcome)))
}
