//! Core types and trait definitions for the Formtable dynamic schema engine.
//!
//! This crate is deliberately free of HTTP, async-runtime, and database
//! dependencies. It owns the data model, the type mapper, the definition
//! differ, and the migration planner that renders DDL. Storage backends
//! implement [`store::SchemaStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod diff;
pub mod error;
pub mod field;
pub mod identifier;
pub mod intent;
pub mod plan;
pub mod record;
pub mod store;
pub mod types;

pub use error::{Error, ErrorClass, ErrorKind, Result};
pub use identifier::Identifier;
