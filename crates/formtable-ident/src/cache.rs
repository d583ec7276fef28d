//! Cache of accepted translations, keyed by label and naming context.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use formtable_core::clock::Clock;
use parking_lot::Mutex;

use crate::NameContext;

/// Stores accepted `(label, context) → slug` pairs. The context is part of
/// the key: the same label may map differently as a form and as a field.
pub trait TranslationCache: Send + Sync {
  fn get(&self, label: &str, context: NameContext) -> Option<String>;
  fn put(&self, label: &str, context: NameContext, slug: String);
}

/// In-process cache with a fixed time-to-live.
pub struct MemoryCache {
  entries: Mutex<HashMap<(String, NameContext), (String, DateTime<Utc>)>>,
  ttl:     Duration,
  clock:   Arc<dyn Clock>,
}

impl MemoryCache {
  pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
    Self { entries: Mutex::new(HashMap::new()), ttl, clock }
  }

  /// Number of entries, expired ones included until the next purge.
  pub fn len(&self) -> usize { self.entries.lock().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Drop every expired entry.
  pub fn purge_expired(&self) -> usize {
    let now = self.clock.now();
    let mut entries = self.entries.lock();
    let before = entries.len();
    entries.retain(|_, (_, expires)| *expires > now);
    before - entries.len()
  }
}

impl TranslationCache for MemoryCache {
  fn get(&self, label: &str, context: NameContext) -> Option<String> {
    let now = self.clock.now();
    let mut entries = self.entries.lock();
    let key = (label.to_owned(), context);
    match entries.get(&key) {
      Some((slug, expires)) if *expires > now => Some(slug.clone()),
      Some(_) => {
        entries.remove(&key);
        None
      }
      None => None,
    }
  }

  fn put(&self, label: &str, context: NameContext, slug: String) {
    let expires = self.clock.now() + self.ttl;
    self.entries.lock().insert((label.to_owned(), context), (slug, expires));
  }
}
