//! Migration queue: one FIFO lane per table, drained by a bounded pool.
//!
//! Jobs that share a table key run strictly in enqueue order, one at a time.
//! Lanes for different tables run concurrently, up to
//! [`QueueConfig::workers`] at once. Retryable failures back off
//! exponentially; everything else fails the job immediately.

use std::{
  collections::{HashMap, VecDeque},
  future::Future,
  sync::Arc,
  time::Duration,
};

use chrono::{DateTime, Utc};
use formtable_core::{
  Identifier,
  clock::Clock,
  intent::{ChangeIntent, ChangeKind},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// Upper bound on concurrently active jobs across all tables.
  pub workers:         usize,
  pub max_attempts:    u32,
  pub backoff_base_ms: u64,
  pub job_timeout_ms:  u64,
  /// How many finished jobs to keep for status reporting.
  pub retained_jobs:   usize,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      workers:         4,
      max_attempts:    3,
      backoff_base_ms: 500,
      job_timeout_ms:  60_000,
      retained_jobs:   1000,
    }
  }
}

impl QueueConfig {
  pub fn job_timeout(&self) -> Duration { Duration::from_millis(self.job_timeout_ms) }

  /// Delay before the retry that follows attempt number `attempt` (1-based).
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
  }
}

// ─── Jobs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Queued,
  Active,
  Completed,
  Failed,
}

impl JobStatus {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Failed) }
}

/// A [`ChangeIntent`] with scheduling metadata. Lives in memory only.
#[derive(Debug, Clone, Serialize)]
pub struct QueueJob {
  pub id:          Uuid,
  pub table_key:   Identifier,
  pub intent:      ChangeIntent,
  pub actor:       String,
  pub status:      JobStatus,
  pub attempts:    u32,
  pub enqueued_at: DateTime<Utc>,
  pub last_error:  Option<String>,
  /// The audit record the job produced, once it has one.
  pub record_id:   Option<Uuid>,
}

/// Handle returned to whoever enqueued a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedJob {
  pub job_id:         Uuid,
  pub kind:           ChangeKind,
  pub status:         JobStatus,
  /// Jobs ahead of this one in its lane, counting an active one.
  pub queue_position: usize,
}

/// Job counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
  pub queued:    usize,
  pub active:    usize,
  pub completed: usize,
  pub failed:    usize,
}

/// Why one attempt of a job did not succeed.
#[derive(Debug, Clone)]
pub struct JobFailure {
  pub message:   String,
  pub retryable: bool,
  /// Whether the handler already wrote an audit record for the failure.
  pub recorded:  bool,
}

impl JobFailure {
  pub fn transient(message: impl Into<String>) -> Self {
    Self { message: message.into(), retryable: true, recorded: false }
  }
}

/// Executes queued jobs.
pub trait JobHandler: Send + Sync + 'static {
  /// Run one attempt of `job`, returning the id of the audit record written.
  fn run<'a>(
    &'a self,
    job: &'a QueueJob,
    dequeued_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Uuid, JobFailure>> + Send + 'a;

  /// Called once when a job fails for good and the failure has not been
  /// recorded yet. Returns the id of a success record if an attempt that
  /// outlived its timeout turned out to have committed after all.
  fn give_up<'a>(
    &'a self,
    job: &'a QueueJob,
    dequeued_at: DateTime<Utc>,
    failure: &'a JobFailure,
  ) -> impl Future<Output = Option<Uuid>> + Send + 'a;
}

// ─── Queue ───────────────────────────────────────────────────────────────────

pub struct MigrationQueue<H> {
  inner: Arc<Inner<H>>,
}

impl<H> Clone for MigrationQueue<H> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

struct Inner<H> {
  handler: Arc<H>,
  clock:   Arc<dyn Clock>,
  config:  QueueConfig,
  permits: Semaphore,
  state:   Mutex<State>,
  idle:    Notify,
}

#[derive(Default)]
struct State {
  jobs:     HashMap<Uuid, QueueJob>,
  /// A lane exists exactly while a drain task owns it.
  lanes:    HashMap<Identifier, Lane>,
  finished: VecDeque<Uuid>,
}

#[derive(Default)]
struct Lane {
  pending: VecDeque<Uuid>,
  active:  Option<Uuid>,
}

impl<H: JobHandler> MigrationQueue<H> {
  pub fn new(handler: Arc<H>, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
    let permits = Semaphore::new(config.workers.max(1));
    Self {
      inner: Arc::new(Inner {
        handler,
        clock,
        config,
        permits,
        state: Mutex::new(State::default()),
        idle: Notify::new(),
      }),
    }
  }

  /// Append `intent` to the lane for `table`. Must be called from within a
  /// Tokio runtime; the lane's drain task is spawned on demand.
  pub fn enqueue(&self, table: Identifier, intent: ChangeIntent, actor: impl Into<String>) -> QueuedJob {
    let job = QueueJob {
      id:          Uuid::new_v4(),
      table_key:   table.clone(),
      intent,
      actor:       actor.into(),
      status:      JobStatus::Queued,
      attempts:    0,
      enqueued_at: self.inner.clock.now(),
      last_error:  None,
      record_id:   None,
    };

    let (queued, spawn) = {
      let mut guard = self.inner.state.lock();
      let state = &mut *guard;
      let spawn = !state.lanes.contains_key(&table);
      let lane = state.lanes.entry(table.clone()).or_default();
      let queued = QueuedJob {
        job_id:         job.id,
        kind:           job.intent.kind,
        status:         JobStatus::Queued,
        queue_position: lane.pending.len() + usize::from(lane.active.is_some()),
      };
      lane.pending.push_back(job.id);
      state.jobs.insert(job.id, job);
      (queued, spawn)
    };

    tracing::debug!(
      job_id = %queued.job_id,
      table = %table,
      kind = %queued.kind,
      position = queued.queue_position,
      "job enqueued"
    );
    if spawn {
      tokio::spawn(drain(self.inner.clone(), table));
    }
    queued
  }

  /// Counts by state, for one table or for all of them.
  pub fn status(&self, table: Option<&Identifier>) -> QueueStatus {
    let state = self.inner.state.lock();
    let mut status = QueueStatus::default();
    for job in state.jobs.values().filter(|j| table.is_none_or(|t| &j.table_key == t)) {
      match job.status {
        JobStatus::Queued => status.queued += 1,
        JobStatus::Active => status.active += 1,
        JobStatus::Completed => status.completed += 1,
        JobStatus::Failed => status.failed += 1,
      }
    }
    status
  }

  pub fn job(&self, id: Uuid) -> Option<QueueJob> { self.inner.state.lock().jobs.get(&id).cloned() }

  /// Resolve once no lane has pending or active work.
  pub async fn wait_idle(&self) {
    loop {
      let notified = self.inner.idle.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();
      if self.inner.state.lock().lanes.is_empty() {
        return;
      }
      notified.await;
    }
  }
}

impl<H> Inner<H> {
  fn mark_active(&self, id: Uuid, attempts: u32) {
    if let Some(job) = self.state.lock().jobs.get_mut(&id) {
      job.status = JobStatus::Active;
      job.attempts = attempts;
    }
  }

  fn note_error(&self, id: Uuid, message: &str) {
    if let Some(job) = self.state.lock().jobs.get_mut(&id) {
      job.last_error = Some(message.to_owned());
    }
  }

  fn finish(&self, table: &Identifier, id: Uuid, status: JobStatus, outcome: Result<Uuid, String>) {
    let mut guard = self.state.lock();
    let state = &mut *guard;

    if let Some(job) = state.jobs.get_mut(&id) {
      job.status = status;
      match outcome {
        Ok(record_id) => job.record_id = Some(record_id),
        Err(message) => job.last_error = Some(message),
      }
    }
    if let Some(lane) = state.lanes.get_mut(table) {
      lane.active = None;
    }

    state.finished.push_back(id);
    while state.finished.len() > self.config.retained_jobs {
      if let Some(evicted) = state.finished.pop_front() {
        state.jobs.remove(&evicted);
      }
    }
  }
}

/// Run the lane for `table` until it is empty, then retire it.
async fn drain<H: JobHandler>(inner: Arc<Inner<H>>, table: Identifier) {
  loop {
    let next = {
      let mut guard = inner.state.lock();
      let state = &mut *guard;
      let Some(lane) = state.lanes.get_mut(&table) else {
        return;
      };
      let Some(id) = lane.pending.pop_front() else {
        state.lanes.remove(&table);
        if state.lanes.is_empty() {
          inner.idle.notify_waiters();
        }
        return;
      };
      lane.active = Some(id);
      state.jobs.get(&id).cloned()
    };

    if let Some(job) = next {
      run_job(&inner, &table, job).await;
    }
  }
}

async fn run_job<H: JobHandler>(inner: &Inner<H>, table: &Identifier, mut job: QueueJob) {
  let dequeued_at = inner.clock.now();
  let timeout = inner.config.job_timeout();

  loop {
    let outcome = {
      let Ok(_permit) = inner.permits.acquire().await else {
        inner.finish(table, job.id, JobStatus::Failed, Err("queue is closed".into()));
        return;
      };
      job.attempts += 1;
      inner.mark_active(job.id, job.attempts);

      match tokio::time::timeout(timeout, inner.handler.run(&job, dequeued_at)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(JobFailure::transient(format!("job timed out after {}ms", timeout.as_millis()))),
      }
    };

    match outcome {
      Ok(record_id) => {
        tracing::info!(job_id = %job.id, table = %table, attempts = job.attempts, "job completed");
        inner.finish(table, job.id, JobStatus::Completed, Ok(record_id));
        return;
      }
      Err(failure) if failure.retryable && job.attempts < inner.config.max_attempts => {
        let delay = inner.config.backoff(job.attempts);
        tracing::warn!(
          job_id = %job.id,
          table = %table,
          attempt = job.attempts,
          error = %failure.message,
          retry_in_ms = delay.as_millis() as u64,
          "job attempt failed, retrying"
        );
        inner.note_error(job.id, &failure.message);
        tokio::time::sleep(delay).await;
      }
      Err(failure) => {
        tracing::warn!(
          job_id = %job.id,
          table = %table,
          attempts = job.attempts,
          error = %failure.message,
          "job failed"
        );
        let late = if failure.recorded {
          None
        } else {
          inner.handler.give_up(&job, dequeued_at, &failure).await
        };
        match late {
          Some(record_id) => {
            tracing::info!(job_id = %job.id, table = %table, "job committed after its last attempt timed out");
            inner.finish(table, job.id, JobStatus::Completed, Ok(record_id));
          }
          None => inner.finish(table, job.id, JobStatus::Failed, Err(failure.message)),
        }
        return;
      }
    }
  }
}
