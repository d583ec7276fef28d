//! Migration execution and scheduling for Formtable.
//!
//! [`Engine`] is the entry point: it resolves column names through
//! [`formtable_ident`], plans changes with [`formtable_core::plan`], runs them
//! through a per-table FIFO [`queue`], and exposes history, rollback, restore
//! and retention over any [`formtable_core::store::SchemaStore`].

#![allow(async_fn_in_trait)]

pub mod engine;
pub mod error;
pub mod executor;
pub mod locks;
pub mod queue;

pub use engine::{CleanupReport, Engine, EngineConfig, SyncOutcome};
pub use error::{Error, Result};
pub use executor::{Executor, Preview, PreviewItem, PreviewSummary, Rejection};
pub use queue::{JobStatus, MigrationQueue, QueueConfig, QueueStatus, QueuedJob};

#[cfg(test)]
mod tests;
