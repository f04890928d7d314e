//! Concurrent status store with retention-based garbage collection.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ProgressUpdate, StatusSnapshot, TaskHandle};
use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::core::{ExecutionId, ExecutionRecord, TaskId};
use crate::utils::now_utc;

/// Per-execution state. The record is only ever swapped, never mutated in
/// place, so readers holding an `Arc` see a consistent snapshot.
struct ExecutionCell {
    record: RwLock<Arc<ExecutionRecord>>,
    progress: watch::Sender<ProgressUpdate>,
    cancel: Arc<CancellationToken>,
    completed_at: Mutex<Option<Instant>>,
}

impl ExecutionCell {
    fn snapshot(&self) -> Arc<ExecutionRecord> {
        Arc::clone(&self.record.read())
    }

    fn completed_at(&self) -> Option<Instant> {
        *self.completed_at.lock()
    }
}

/// In-memory map from task ids to live execution state.
///
/// Entries are sharded (`DashMap`) and each execution has its own lock, so
/// readers of one task never block writers of another.
pub struct StatusStore {
    executions: DashMap<ExecutionId, Arc<ExecutionCell>>,
    tasks: DashMap<TaskId, ExecutionId>,
    retention_window: Duration,
    max_retained: usize,
}

impl StatusStore {
    /// Creates a store with the given retention bounds.
    #[must_use]
    pub fn new(retention_window: Duration, max_retained: usize) -> Self {
        Self {
            executions: DashMap::new(),
            tasks: DashMap::new(),
            retention_window,
            max_retained,
        }
    }

    /// Creates a store from the engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.retention_window(), config.max_retained_executions)
    }

    /// Registers a new execution and returns its cancellation token.
    pub fn register(&self, record: ExecutionRecord) -> Arc<CancellationToken> {
        let cancel = Arc::new(CancellationToken::new());
        let (progress, _) = watch::channel(ProgressUpdate {
            status: record.status(),
            ..ProgressUpdate::pending()
        });
        let completed_at = record.is_terminal().then(Instant::now);
        let cell = ExecutionCell {
            record: RwLock::new(Arc::new(record)),
            progress,
            cancel: Arc::clone(&cancel),
            completed_at: Mutex::new(completed_at),
        };
        let execution_id = cell.record.read().execution_id();
        self.executions.insert(execution_id, Arc::new(cell));
        cancel
    }

    /// Creates a task handle for an existing execution.
    ///
    /// Returns `None` if the execution is unknown or was collected.
    pub fn create(&self, execution_id: ExecutionId) -> Option<TaskId> {
        // Hold the entry guard so `gc` cannot remove the execution before
        // the handle exists.
        let _cell = self.executions.get(&execution_id)?;
        let task_id = TaskId::new();
        self.tasks.insert(task_id, execution_id);
        Some(task_id)
    }

    /// Reports progress for the execution behind a task.
    ///
    /// Returns false for an unknown task or a terminal execution.
    pub fn update(&self, task_id: TaskId, progress_percent: u8) -> bool {
        let Some(cell) = self.cell_for_task(task_id) else {
            return false;
        };
        if cell.snapshot().is_terminal() {
            return false;
        }
        cell.progress.send_modify(|p| {
            p.progress_percent = progress_percent.min(100);
            p.updated_at = now_utc();
        });
        true
    }

    /// Publishes a new snapshot of an execution record.
    ///
    /// A terminal snapshot is never replaced: publishing over one returns
    /// false and leaves the store unchanged.
    pub fn publish(&self, record: ExecutionRecord) -> bool {
        let execution_id = record.execution_id();
        let Some(cell) = self.executions.get(&execution_id).map(|c| Arc::clone(c.value())) else {
            warn!(%execution_id, "Publish for unknown execution");
            return false;
        };

        let status = record.status();
        {
            let mut current = cell.record.write();
            if current.is_terminal() {
                warn!(%execution_id, current = %current.status(), "Refusing to replace terminal snapshot");
                return false;
            }
            *current = Arc::new(record);
        }

        if status.is_terminal() {
            *cell.completed_at.lock() = Some(Instant::now());
        }
        cell.progress.send_modify(|p| {
            p.status = status;
            if status.is_terminal() {
                p.progress_percent = 100;
            }
            p.updated_at = now_utc();
        });
        true
    }

    /// Returns the polling snapshot for a task.
    #[must_use]
    pub fn get(&self, task_id: TaskId) -> Option<StatusSnapshot> {
        let cell = self.cell_for_task(task_id)?;
        let record = cell.snapshot();
        let progress = *cell.progress.borrow();
        Some(StatusSnapshot::from_record(task_id, &record, progress))
    }

    /// Returns the full record snapshot behind a task.
    #[must_use]
    pub fn record(&self, task_id: TaskId) -> Option<Arc<ExecutionRecord>> {
        self.cell_for_task(task_id).map(|cell| cell.snapshot())
    }

    /// Returns the handle projection for a task.
    #[must_use]
    pub fn handle(&self, task_id: TaskId) -> Option<TaskHandle> {
        let execution_id = *self.tasks.get(&task_id)?;
        let cell = self.executions.get(&execution_id).map(|c| Arc::clone(c.value()))?;
        let progress = *cell.progress.borrow();
        Some(TaskHandle {
            task_id,
            execution_id,
            progress_percent: progress.progress_percent,
            last_update_at: progress.updated_at,
        })
    }

    /// Subscribes to progress updates for a task.
    #[must_use]
    pub fn subscribe(&self, task_id: TaskId) -> Option<watch::Receiver<ProgressUpdate>> {
        self.cell_for_task(task_id).map(|cell| cell.progress.subscribe())
    }

    /// Signals cancellation of the execution behind a task.
    ///
    /// Returns false if the task is unknown, the execution is already
    /// terminal or committing its terminal status, or cancellation was
    /// already requested.
    pub fn cancel(&self, task_id: TaskId, reason: &str) -> bool {
        let Some(cell) = self.cell_for_task(task_id) else {
            return false;
        };
        if cell.snapshot().is_terminal() {
            return false;
        }
        cell.cancel.cancel(reason)
    }

    /// Returns the execution id behind a task.
    #[must_use]
    pub fn execution_of(&self, task_id: TaskId) -> Option<ExecutionId> {
        self.tasks.get(&task_id).map(|e| *e.value())
    }

    /// Number of tracked executions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    /// Returns true if no executions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Number of live task handles.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Removes terminal executions older than the retention window, then
    /// the oldest terminal executions beyond the retained maximum, together
    /// with their handles. Running executions are never collected.
    ///
    /// Returns the number of executions removed.
    pub fn gc(&self) -> usize {
        self.collect(true)
    }

    /// Removes only the oldest terminal executions beyond the retained
    /// maximum. The engine runs this whenever an execution finishes.
    ///
    /// Returns the number of executions removed.
    pub fn enforce_capacity(&self) -> usize {
        self.collect(false)
    }

    fn collect(&self, expire: bool) -> usize {
        let mut terminal: Vec<(ExecutionId, Instant)> = self
            .executions
            .iter()
            .filter_map(|entry| entry.value().completed_at().map(|at| (*entry.key(), at)))
            .collect();
        if terminal.len() <= self.max_retained && !expire {
            return 0;
        }
        terminal.sort_by_key(|&(_, at)| at);

        let expired = if expire {
            terminal
                .iter()
                .take_while(|(_, at)| at.elapsed() >= self.retention_window)
                .count()
        } else {
            0
        };
        let remaining = terminal.len() - expired;
        let overflow = remaining.saturating_sub(self.max_retained);

        let doomed: Vec<ExecutionId> = terminal
            .into_iter()
            .take(expired + overflow)
            .map(|(id, _)| id)
            .collect();
        for execution_id in &doomed {
            self.executions.remove(execution_id);
        }
        if !doomed.is_empty() {
            self.tasks.retain(|_, execution_id| !doomed.contains(execution_id));
            debug!(removed = doomed.len(), expired, overflow, "Collected terminal executions");
        }
        doomed.len()
    }

    /// Spawns a task that runs [`StatusStore::gc`] every `interval`.
    ///
    /// The task holds a weak reference and exits once the store is dropped.
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Status store dropped, janitor exiting");
                    break;
                };
                store.gc();
            }
        })
    }

    fn cell_for_task(&self, task_id: TaskId) -> Option<Arc<ExecutionCell>> {
        let execution_id = *self.tasks.get(&task_id)?;
        self.executions.get(&execution_id).map(|c| Arc::clone(c.value()))
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl std::fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStore")
            .field("executions", &self.executions.len())
            .field("tasks", &self.tasks.len())
            .field("retention_window", &self.retention_window)
            .field("max_retained", &self.max_retained)
            .finish()
    }
}
