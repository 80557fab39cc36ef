//! store.rs: task-state store for background analyses.
//!
//! Handlers talk to `dyn TaskStore<T>` only, so the in-memory map below can be
//! swapped for a database-backed store without touching the scoring code.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord<T> {
    pub id: TaskId,
    pub kind: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State change applied by [`TaskStore::update`].
#[derive(Debug, Clone)]
pub enum TaskUpdate<T> {
    Running,
    Completed(T),
    Failed(String),
}

pub trait TaskStore<T>: Send + Sync {
    fn create(&self, kind: &str, now: DateTime<Utc>) -> TaskId;
    /// Returns `false` when the task doesn't exist (e.g. already expired).
    fn update(&self, id: &str, update: TaskUpdate<T>, now: DateTime<Utc>) -> bool;
    fn get(&self, id: &str) -> Option<TaskRecord<T>>;
    /// Drop records not updated within the TTL. Returns how many were removed.
    fn expire(&self, now: DateTime<Utc>) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct InMemoryTaskStore<T> {
    inner: Mutex<HashMap<TaskId, TaskRecord<T>>>,
    ttl: Duration,
    cap: usize,
    seq: AtomicU64,
}

impl<T> InMemoryTaskStore<T> {
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
            cap: cap.clamp(1, 100_000),
            seq: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, TaskRecord<T>>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send + Sync> TaskStore<T> for InMemoryTaskStore<T> {
    fn create(&self, kind: &str, now: DateTime<Utc>) -> TaskId {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("task_{n:08}");
        let rec = TaskRecord {
            id: id.clone(),
            kind: kind.to_string(),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        };

        let mut map = self.lock();
        map.insert(id.clone(), rec);
        if map.len() > self.cap {
            // Finished records go first (oldest first); live ones only when
            // nothing finished is left.
            let mut victims: Vec<(bool, DateTime<Utc>, TaskId)> = map
                .values()
                .map(|r| (!r.status.is_terminal(), r.updated_at, r.id.clone()))
                .collect();
            victims.sort();
            let excess = map.len() - self.cap;
            for (live, _, old) in victims.into_iter().take(excess) {
                if live {
                    warn!(task = %old, "task store full, evicting an unfinished task");
                }
                map.remove(&old);
            }
        }
        id
    }

    fn update(&self, id: &str, update: TaskUpdate<T>, now: DateTime<Utc>) -> bool {
        let mut map = self.lock();
        let Some(rec) = map.get_mut(id) else {
            return false;
        };
        match update {
            TaskUpdate::Running => rec.status = TaskStatus::Running,
            TaskUpdate::Completed(result) => {
                rec.status = TaskStatus::Completed;
                rec.result = Some(result);
            }
            TaskUpdate::Failed(err) => {
                rec.status = TaskStatus::Failed;
                rec.error = Some(err);
            }
        }
        rec.updated_at = now;
        true
    }

    fn get(&self, id: &str) -> Option<TaskRecord<T>> {
        self.lock().get(id).cloned()
    }

    fn expire(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, r| r.updated_at >= cutoff);
        let removed = before - map.len();
        if removed > 0 {
            debug!(removed, "expired task records");
        }
        removed
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
