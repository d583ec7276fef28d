//! Per-table async locks.
//!
//! The queue, rollback and restore all take the same lock before touching a
//! table's schema, so a manual rollback never interleaves with a queued job.

use std::{collections::HashMap, sync::Arc};

use formtable_core::Identifier;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
pub struct TableLocks {
  locks: Mutex<HashMap<Identifier, Arc<tokio::sync::Mutex<()>>>>,
}

impl TableLocks {
  /// Wait for exclusive access to `table`.
  pub async fn lock(&self, table: &Identifier) -> OwnedMutexGuard<()> {
    let lock = self.locks.lock().entry(table.clone()).or_default().clone();
    lock.lock_owned().await
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  fn id(s: &str) -> Identifier { Identifier::parse(s).unwrap() }

  #[tokio::test]
  async fn same_table_is_exclusive() {
    let locks = TableLocks::default();
    let held = locks.lock(&id("form_a")).await;

    let blocked = tokio::time::timeout(Duration::from_millis(20), locks.lock(&id("form_a"))).await;
    assert!(blocked.is_err());

    drop(held);
    let again = tokio::time::timeout(Duration::from_millis(20), locks.lock(&id("form_a"))).await;
    assert!(again.is_ok());
  }

  #[tokio::test]
  async fn different_tables_do_not_contend() {
    let locks = TableLocks::default();
    let _a = locks.lock(&id("form_a")).await;
    let b = tokio::time::timeout(Duration::from_millis(20), locks.lock(&id("form_b"))).await;
    assert!(b.is_ok());
  }
}
