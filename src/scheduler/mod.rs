//! Bounded-concurrency scheduler for transfer tasks
//!
//! `submit` never blocks: a task starts at once when a slot is free and waits
//! in FIFO order otherwise. Every accepted task ends with exactly one terminal
//! callback, whether it ran, failed, or was cancelled while still queued.

mod runner;

pub use runner::{TaskRunner, TransferRunner, until_cancelled};

use futures_util::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::error::TransferError;
use crate::task::{TaskHandle, TaskId, TaskState, TransferTask};

#[derive(Default)]
struct SchedulerState {
    running: HashMap<TaskId, CancellationToken>,
    queued: VecDeque<(TaskId, TransferTask)>,
    finished: HashMap<TaskId, TaskState>,
    finished_order: VecDeque<TaskId>,
    shut_down: bool,
}

impl SchedulerState {
    fn record(&mut self, id: TaskId, state: TaskState, history_limit: usize) {
        self.finished.insert(id, state);
        self.finished_order.push_back(id);
        while self.finished_order.len() > history_limit {
            if let Some(evicted) = self.finished_order.pop_front() {
                self.finished.remove(&evicted);
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.running.is_empty() && self.queued.is_empty()
    }
}

struct Inner {
    runner: Arc<dyn TaskRunner>,
    runtime: Handle,
    max_concurrency: usize,
    history_limit: usize,
    next_id: AtomicU64,
    state: Mutex<SchedulerState>,
    idle: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct TransferScheduler {
    inner: Arc<Inner>,
}

impl TransferScheduler {
    /// Tasks are spawned onto `runtime`, so `submit` may be called from any thread
    pub fn new(config: &SchedulerConfig, runner: Arc<dyn TaskRunner>, runtime: Handle) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        info!(
            max_concurrency,
            history_limit = config.history_limit,
            "Creating TransferScheduler"
        );

        Self {
            inner: Arc::new(Inner {
                runner,
                runtime,
                max_concurrency,
                history_limit: config.history_limit,
                next_id: AtomicU64::new(1),
                state: Mutex::new(SchedulerState::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn submit(&self, task: TransferTask) -> TaskHandle {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = TaskHandle::new(id);

        let mut state = self.inner.lock();
        if state.shut_down {
            state.record(id, TaskState::Cancelled, self.inner.history_limit);
            drop(state);
            debug!(task_id = %id, "Scheduler shut down, rejecting task");
            task.reject(id, TransferError::Cancelled);
            return handle;
        }

        debug!(task_id = %id, kind = ?task.kind(), path = task.path(), "Task submitted");
        if state.running.len() < self.inner.max_concurrency {
            state.running.insert(id, task.cancellation.clone());
            drop(state);
            start(&self.inner, id, task);
        } else {
            state.queued.push_back((id, task));
            debug!(task_id = %id, queued = state.queued.len(), "All slots busy, task queued");
        }

        handle
    }

    /// Request cancellation; returns false when the task already finished or is unknown.
    ///
    /// A queued task is removed and reported immediately without touching the
    /// network. A running one is told to stop and reports once it has unwound.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        let id = handle.id();
        let mut state = self.inner.lock();

        if let Some(token) = state.running.get(&id) {
            token.cancel();
            debug!(task_id = %id, "Cancelling running task");
            return true;
        }

        let Some(index) = state.queued.iter().position(|(queued, _)| *queued == id) else {
            return false;
        };
        let Some((_, task)) = state.queued.remove(index) else {
            return false;
        };
        state.record(id, TaskState::Cancelled, self.inner.history_limit);
        let idle = state.is_idle();
        drop(state);

        debug!(task_id = %id, "Cancelled queued task");
        task.reject(id, TransferError::Cancelled);
        if idle {
            self.inner.idle.notify_waiters();
        }
        true
    }

    /// `None` for unknown ids and for finished tasks evicted from history.
    /// The final state is recorded before the terminal callback is
    /// dispatched, so an observer querying its own task sees it.
    pub fn state(&self, handle: &TaskHandle) -> Option<TaskState> {
        let id = handle.id();
        let state = self.inner.lock();

        if state.running.contains_key(&id) {
            Some(TaskState::Running)
        } else if state.queued.iter().any(|(queued, _)| *queued == id) {
            Some(TaskState::Queued)
        } else {
            state.finished.get(&id).copied()
        }
    }

    pub fn running(&self) -> usize {
        self.inner.lock().running.len()
    }

    pub fn queued(&self) -> usize {
        self.inner.lock().queued.len()
    }

    /// Cancel everything and refuse further work. Later submissions are
    /// reported as cancelled.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        state.shut_down = true;
        let rejected: Vec<_> = state.queued.drain(..).collect();
        for (id, _) in &rejected {
            state.record(*id, TaskState::Cancelled, self.inner.history_limit);
        }
        for token in state.running.values() {
            token.cancel();
        }
        let idle = state.is_idle();
        drop(state);

        info!(cancelled_queued = rejected.len(), "Scheduler shutting down");
        for (id, task) in rejected {
            task.reject(id, TransferError::Cancelled);
        }
        if idle {
            self.inner.idle.notify_waiters();
        }
    }

    /// Resolves once nothing is running or queued
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }
}

fn start(inner: &Arc<Inner>, id: TaskId, mut task: TransferTask) {
    let hook_scheduler = inner.clone();
    task.terminal_hook = Some(Arc::new(move |state: TaskState| {
        complete(&hook_scheduler, id, state)
    }));

    let scheduler = inner.clone();
    inner.runtime.spawn(async move {
        let runner = scheduler.runner.clone();
        let state = match AssertUnwindSafe(runner.run(id, task)).catch_unwind().await {
            Ok(state) => state,
            Err(_) => {
                // The unwound reporter has already delivered a cancellation
                error!(task_id = %id, "Task runner panicked");
                TaskState::Cancelled
            }
        };
        // No-op when the reporter's hook already completed the task
        complete(&scheduler, id, state);
    });
}

/// Release the task's slot and record its final state, once
fn complete(inner: &Arc<Inner>, id: TaskId, state: TaskState) {
    let mut guard = inner.lock();
    if guard.running.remove(&id).is_none() {
        return;
    }
    guard.record(id, state, inner.history_limit);

    let mut promoted = Vec::new();
    while guard.running.len() < inner.max_concurrency {
        let Some((next, task)) = guard.queued.pop_front() else {
            break;
        };
        guard.running.insert(next, task.cancellation.clone());
        promoted.push((next, task));
    }
    let idle = guard.is_idle();
    drop(guard);

    for (next, task) in promoted {
        debug!(task_id = %next, "Slot freed, starting queued task");
        start(inner, next, task);
    }
    if idle {
        inner.idle.notify_waiters();
    }
}
