//! End-to-end tests: engine, queue and executor over an in-memory store.

use std::{collections::HashSet, sync::Arc};

use chrono::{Duration, Utc};
use formtable_core::{
  ErrorClass, ErrorKind, Identifier,
  clock::{Clock, ManualClock},
  field::{FieldDefinition, LogicalType, OwnerKind},
  intent::{ChangeIntent, ChangeKind},
  record::{HistoryQuery, StatusFilter},
  store::SchemaStore,
  types::CellValue,
};
use formtable_ident::{MemoryCache, NoTranslator};
use formtable_store_sqlite::SqliteStore;

use crate::{Engine, EngineConfig, JobStatus, QueueConfig};

fn id(s: &str) -> Identifier { Identifier::parse(s).unwrap() }

struct Fixture {
  engine: Engine<SqliteStore, NoTranslator>,
  store:  Arc<SqliteStore>,
  clock:  Arc<ManualClock>,
}

async fn fixture() -> Fixture {
  let store = Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"));
  let clock = Arc::new(ManualClock::new(Utc::now()));
  let cache = Arc::new(MemoryCache::new(Duration::hours(24), clock.clone()));
  let config = EngineConfig {
    queue: QueueConfig { backoff_base_ms: 1, ..Default::default() },
    ..Default::default()
  };
  let engine = Engine::new(store.clone(), NoTranslator, cache, clock.clone(), config);
  Fixture { engine, store, clock }
}

fn field(field_id: &str, label: &str, ty: LogicalType, column: Option<&str>) -> FieldDefinition {
  FieldDefinition {
    field_id:     field_id.into(),
    label:        label.into(),
    logical_type: ty,
    column_name:  column.map(id),
    order:        0,
  }
}

impl Fixture {
  async fn table(&self, label: &str, owner: &str) -> Identifier {
    self
      .engine
      .provision_table(OwnerKind::Form, owner, label, &HashSet::new())
      .await
      .unwrap()
      .table_name
  }

  async fn columns(&self, table: &Identifier) -> Vec<String> {
    self.store.list_columns(table).await.unwrap().into_iter().map(|c| c.name).collect()
  }
}

// ─── Provisioning ────────────────────────────────────────────────────────────

#[tokio::test]
async fn provisioned_names_are_unique() {
  let f = fixture().await;
  let a = f.table("Customer Survey", "form-1").await;
  let b = f.table("Customer Survey", "form-2").await;
  assert_eq!(a.as_str(), "customer_survey");
  assert_ne!(a, b);

  let taken: HashSet<String> = ["order_form".to_string()].into();
  let sub = f
    .engine
    .provision_table(OwnerKind::SubForm, "sub-1", "Order", &taken)
    .await
    .unwrap();
  assert_ne!(sub.table_name.as_str(), "order_form");
  assert!(f.columns(&sub.table_name).await.contains(&"parent_id".to_string()));
}

// ─── Queue + executor ────────────────────────────────────────────────────────

#[tokio::test]
async fn tables_migrate_independently_in_order() {
  let f = fixture().await;
  let a = f.table("Form A", "form-a").await;
  let b = f.table("Form B", "form-b").await;

  for table in [&a, &b] {
    let intents = (0..3)
      .map(|n| ChangeIntent::add(format!("f{n}"), format!("Question {n}"), None, LogicalType::ShortText))
      .collect();
    let jobs = f.engine.execute(table, intents, "alice").await.unwrap();
    let positions: Vec<usize> = jobs.iter().map(|j| j.queue_position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Queued));
  }
  f.engine.wait_idle().await;

  for table in [&a, &b] {
    let cols = f.columns(table).await;
    assert!(cols.ends_with(&["question_0".into(), "question_1".into(), "question_2".into()]));

    let history = f.engine.history(table, &HistoryQuery::default()).await.unwrap();
    let order: Vec<&str> = history.items.iter().rev().map(|r| r.field_id.as_str()).collect();
    assert_eq!(order, vec!["f0", "f1", "f2"]);
    assert!(history.items.iter().all(|r| r.success && r.job_id.is_some()));
  }
  assert_eq!(f.engine.queue_status(None).completed, 6);
  assert_eq!(f.engine.queue_status(Some(&a)).completed, 3);
}

#[tokio::test]
async fn invalid_intents_are_rejected_before_queueing() {
  let f = fixture().await;
  let t = f.table("Form A", "form-a").await;

  let mut bad = ChangeIntent::add("f1", "x", None, LogicalType::ShortText);
  bad.new_type = None;
  let err = f.engine.execute(&t, vec![bad], "alice").await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);

  let missing = f.engine.execute(&id("nope"), vec![], "alice").await.unwrap_err();
  assert_eq!(missing.kind(), ErrorKind::NotFound);
  assert_eq!(f.engine.queue_status(None), Default::default());
}

#[tokio::test]
async fn unsupported_retype_is_rejected_before_queueing() {
  let f = fixture().await;
  let t = f.table("People", "form-p").await;
  f.engine
    .execute(&t, vec![ChangeIntent::add("f1", "Born", Some(id("born")), LogicalType::Date)], "alice")
    .await
    .unwrap();
  f.engine.wait_idle().await;
  let before = f.engine.queue_status(None);

  let retype = ChangeIntent::retype("f1", id("born"), LogicalType::Date, LogicalType::Number);
  let err = f.engine.execute(&t, vec![retype], "alice").await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  assert_eq!(f.engine.queue_status(None), before);
  assert_eq!(f.engine.history(&t, &HistoryQuery::default()).await.unwrap().total, 1);
}

#[tokio::test]
async fn timed_out_attempt_is_applied_once() {
  let path = std::env::temp_dir().join(format!("formtable-{}.db", uuid::Uuid::new_v4()));
  let store = Arc::new(SqliteStore::open(&path).await.expect("file store"));
  let clock = Arc::new(ManualClock::new(Utc::now()));
  let cache = Arc::new(MemoryCache::new(Duration::hours(24), clock.clone()));
  let config = EngineConfig {
    queue: QueueConfig { backoff_base_ms: 1, job_timeout_ms: 200, max_attempts: 3, ..Default::default() },
    ..Default::default()
  };
  let engine = Engine::new(store.clone(), NoTranslator, cache, clock.clone(), config);
  let f = Fixture { engine, store, clock };
  let t = f.table("People", "form-p").await;

  // Another writer holds the database past the first attempt's deadline.
  let blocker = rusqlite::Connection::open(&path).unwrap();
  blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();

  let add = ChangeIntent::add("f1", "Email", None, LogicalType::Email);
  f.engine.execute(&t, vec![add], "alice").await.unwrap();
  tokio::time::sleep(std::time::Duration::from_millis(300)).await;
  blocker.execute_batch("COMMIT").unwrap();
  f.engine.wait_idle().await;

  let emails: Vec<String> = f.columns(&t).await.into_iter().filter(|c| c.starts_with("email")).collect();
  assert_eq!(emails, vec!["email".to_string()]);

  let history = f.engine.history(&t, &HistoryQuery::default()).await.unwrap();
  assert_eq!(history.total, 1);
  assert!(history.items[0].success);
  assert_eq!(f.engine.queue_status(Some(&t)).completed, 1);

  drop(blocker);
  for suffix in ["", "-wal", "-shm"] {
    let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
  }
}

// ─── Definition sync ─────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_applies_diffs_and_survives_failures() {
  let f = fixture().await;
  let t = f.table("People", "form-p").await;

  let v1 = vec![
    field("f1", "Name", LogicalType::ShortText, None),
    field("f2", "Age", LogicalType::ShortText, None),
  ];
  let first = f.engine.sync_definition(&t, &[], &v1, "alice").await.unwrap();
  assert_eq!(first.queued_jobs.len(), 2);
  f.engine.wait_idle().await;
  assert!(f.columns(&t).await.ends_with(&["name".into(), "age".into()]));

  f.store.insert_row(&t, vec![(id("age"), CellValue::Text("abc".into()))]).await.unwrap();

  let stored = vec![
    field("f1", "Name", LogicalType::ShortText, Some("name")),
    field("f2", "Age", LogicalType::ShortText, Some("age")),
  ];
  let v2 = vec![
    field("f1", "Full name", LogicalType::ShortText, Some("full_name")),
    field("f2", "Age", LogicalType::Number, Some("age")),
  ];
  let second = f.engine.sync_definition(&t, &stored, &v2, "alice").await.unwrap();
  let kinds: Vec<ChangeKind> = second.queued_jobs.iter().map(|j| j.kind).collect();
  assert_eq!(kinds, vec![ChangeKind::Rename, ChangeKind::Retype]);
  f.engine.wait_idle().await;

  let cols = f.columns(&t).await;
  assert!(cols.contains(&"full_name".to_string()));
  assert!(cols.contains(&"age".to_string()));

  let failures = f
    .engine
    .history(&t, &HistoryQuery { status: StatusFilter::Failure, ..Default::default() })
    .await
    .unwrap();
  assert_eq!(failures.total, 1);
  assert_eq!(failures.items[0].kind, ChangeKind::Retype);
  assert!(failures.items[0].error_message.as_deref().unwrap_or_default().contains("row 1"));
  assert_eq!(f.engine.queue_status(Some(&t)).failed, 1);
}

#[tokio::test]
async fn sync_swaps_column_names() {
  let f = fixture().await;
  let t = f.table("People", "form-p").await;
  let v1 = vec![
    field("f1", "First", LogicalType::ShortText, Some("first")),
    field("f2", "Last", LogicalType::ShortText, Some("last")),
  ];
  f.engine.sync_definition(&t, &[], &v1, "alice").await.unwrap();
  f.engine.wait_idle().await;
  let row = vec![
    (id("first"), CellValue::Text("Somchai".into())),
    (id("last"), CellValue::Text("Jaidee".into())),
  ];
  f.store.insert_row(&t, row).await.unwrap();

  let v2 = vec![
    field("f1", "First", LogicalType::ShortText, Some("last")),
    field("f2", "Last", LogicalType::ShortText, Some("first")),
  ];
  let outcome = f.engine.sync_definition(&t, &v1, &v2, "alice").await.unwrap();
  assert_eq!(outcome.queued_jobs.len(), 3);
  f.engine.wait_idle().await;

  assert_eq!(f.engine.queue_status(Some(&t)).failed, 0);
  let cols = f.columns(&t).await;
  assert!(cols.ends_with(&["last".into(), "first".into()]));
  assert!(!cols.iter().any(|c| c.starts_with("_mv_")));

  let first = f.store.column_values(&t, &id("first")).await.unwrap();
  let last = f.store.column_values(&t, &id("last")).await.unwrap();
  assert_eq!(first[0].1, CellValue::Text("Jaidee".into()));
  assert_eq!(last[0].1, CellValue::Text("Somchai".into()));
}

#[tokio::test]
async fn lost_renames_are_reported_not_rewritten() {
  let f = fixture().await;
  let t = f.table("People", "form-p").await;
  let old = vec![field("f1", "Full Name", LogicalType::ShortText, Some("full_name"))];
  let new = vec![field("f9", "Full name", LogicalType::ShortText, None)];

  f.engine.sync_definition(&t, &[], &old, "alice").await.unwrap();
  f.engine.wait_idle().await;

  let outcome = f.engine.sync_definition(&t, &old, &new, "alice").await.unwrap();
  assert_eq!(outcome.suspected_renames.len(), 1);
  let kinds: Vec<ChangeKind> = outcome.queued_jobs.iter().map(|j| j.kind).collect();
  assert_eq!(kinds, vec![ChangeKind::Drop, ChangeKind::Add]);
}

// ─── Backups & retention ─────────────────────────────────────────────────────

#[tokio::test]
async fn cleanup_sweeps_expired_backups() {
  let f = fixture().await;
  let t = f.table("People", "form-p").await;
  let v1 = vec![field("f1", "Age", LogicalType::Number, Some("age"))];
  f.engine.sync_definition(&t, &[], &v1, "alice").await.unwrap();
  f.engine.sync_definition(&t, &v1, &[], "alice").await.unwrap();
  f.engine.wait_idle().await;

  assert_eq!(f.engine.backups(&t, false, None, None).await.unwrap().total, 1);
  assert_eq!(f.engine.cleanup(None, false).await.unwrap().count, 0);

  f.clock.advance(Duration::days(91));
  assert_eq!(f.engine.backups(&t, false, None, None).await.unwrap().total, 0);
  assert_eq!(f.engine.backups(&t, true, None, None).await.unwrap().total, 1);

  let dry = f.engine.cleanup(None, true).await.unwrap();
  assert!(dry.dry_run);
  assert_eq!(dry.count, 1);
  assert_eq!(dry.cutoff, f.clock.now());

  assert_eq!(f.engine.cleanup(None, false).await.unwrap().count, 1);
  assert_eq!(f.engine.backups(&t, true, None, None).await.unwrap().total, 0);
}

#[tokio::test]
async fn cleanup_by_age() {
  let f = fixture().await;
  let t = f.table("People", "form-p").await;
  let v1 = vec![field("f1", "Age", LogicalType::Number, Some("age"))];
  f.engine.sync_definition(&t, &[], &v1, "alice").await.unwrap();
  f.engine.sync_definition(&t, &v1, &[], "alice").await.unwrap();
  f.engine.wait_idle().await;

  f.clock.advance(Duration::days(10));
  assert_eq!(f.engine.cleanup(Some(30), false).await.unwrap().count, 0);
  assert_eq!(f.engine.cleanup(Some(7), false).await.unwrap().count, 1);
}

#[tokio::test]
async fn rollback_and_restore_through_the_engine() {
  let f = fixture().await;
  let t = f.table("People", "form-p").await;
  let v1 = vec![field("f1", "Age", LogicalType::Number, Some("age"))];
  f.engine.sync_definition(&t, &[], &v1, "alice").await.unwrap();
  f.engine.wait_idle().await;
  for age in [30, 25, 40] {
    f.store.insert_row(&t, vec![(id("age"), CellValue::Integer(age))]).await.unwrap();
  }

  f.engine.sync_definition(&t, &v1, &[], "alice").await.unwrap();
  f.engine.wait_idle().await;
  let drop = f.engine.history(&t, &HistoryQuery::default()).await.unwrap().items.remove(0);
  assert_eq!(drop.kind, ChangeKind::Drop);

  let backup_id = drop.backup_id.unwrap();
  let outcome = f.engine.restore(backup_id, "admin").await.unwrap();
  assert!(outcome.column_recreated);
  assert_eq!(outcome.rows_restored, 3);

  // The backup is spent, so the drop can no longer be rolled back.
  let err = f.engine.rollback(drop.id, "admin").await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Irreversible);
}
