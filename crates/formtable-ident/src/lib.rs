//! Storage-safe identifiers from free-form labels.
//!
//! [`IdentifierGenerator`] tries, in order: ASCII pass-through, the
//! translation cache, an external [`Translator`], the local Thai dictionary,
//! and finally a hash of the caller's stable seed. Every tier but the last may
//! decline; the last never does.

#![allow(async_fn_in_trait)]

pub mod cache;
pub mod dictionary;
pub mod generator;
pub mod slug;
pub mod translate;
pub mod translit;

pub use cache::{MemoryCache, TranslationCache};
pub use generator::{IdentifierConfig, IdentifierGenerator, NameContext, Tier};
pub use translate::{NoTranslator, TranslateError, Translation, Translator, estimate_quality};
