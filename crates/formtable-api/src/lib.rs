//! HTTP control surface for the schema engine.
//!
//! Exposes an axum [`Router`] over one [`Engine`]. Every route requires HTTP
//! Basic credentials; each handler checks the caller's [`Role`].

pub mod auth;
pub mod backups;
pub mod error;
pub mod extract;
pub mod history;
pub mod migrations;
pub mod queue;
pub mod tables;

pub use error::ApiError;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use formtable_core::store::SchemaStore;
use formtable_engine::Engine;
use formtable_ident::Translator;
use tower_http::trace::TraceLayer;

use auth::AuthConfig;
pub use auth::Role;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, T> {
  pub engine: Arc<Engine<S, T>>,
  pub auth:   Arc<AuthConfig>,
}

impl<S, T> Clone for AppState<S, T> {
  fn clone(&self) -> Self { Self { engine: self.engine.clone(), auth: self.auth.clone() } }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the control API.
pub fn router<S, T>(state: AppState<S, T>) -> Router
where
  S: SchemaStore + 'static,
  T: Translator + 'static,
{
  Router::new()
    .route("/preview",               post(migrations::preview::<S, T>))
    .route("/execute",               post(migrations::execute::<S, T>))
    .route("/sync",                  post(migrations::sync::<S, T>))
    .route("/tables",                post(tables::create::<S, T>))
    .route("/history/{table}",       get(history::list::<S, T>))
    .route("/rollback/{record_id}",  post(history::rollback::<S, T>))
    .route("/backups/{table}",       get(backups::list::<S, T>))
    .route("/restore/{backup_id}",   post(backups::restore::<S, T>))
    .route("/queue/status",          get(queue::status::<S, T>))
    .route("/cleanup",               delete(backups::cleanup::<S, T>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
