//! `POST /tables`: provision the physical table for a form or sub-form.

use std::collections::HashSet;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use formtable_core::{field::OwnerKind, store::SchemaStore};
use formtable_ident::Translator;
use serde::Deserialize;

use crate::{
  AppState,
  auth::{Caller, Role},
  error::ApiError,
  extract::ApiJson,
};

#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
  pub owner_kind:      OwnerKind,
  pub owner_id:        String,
  /// Human label the table name is derived from.
  pub label:           String,
  /// Names the caller already uses and the new table must avoid.
  #[serde(default)]
  pub existing_tables: HashSet<String>,
}

pub async fn create<S, T>(
  State(state): State<AppState<S, T>>,
  caller: Caller,
  ApiJson(body): ApiJson<ProvisionBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  caller.require(Role::Execute)?;
  if body.owner_id.trim().is_empty() {
    return Err(ApiError::BadRequest("owner_id must not be empty".into()));
  }
  let target = state
    .engine
    .provision_table(body.owner_kind, &body.owner_id, &body.label, &body.existing_tables)
    .await?;
  Ok((StatusCode::CREATED, Json(target)))
}
