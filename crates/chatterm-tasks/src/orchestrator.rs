use crate::task::{BackgroundTask, CallbackResult};
use chatterm_core::ChatError;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub type TaskId = u64;

const PHASE_RUNNING: u8 = 0;
const PHASE_PRODUCED: u8 = 1;
const PHASE_CANCELLED: u8 = 2;

type ErasedOutcome = Result<Box<dyn Any + Send>, ChatError>;
type SettleFn<C> = Box<dyn FnOnce(&mut C, &mut TaskOrchestrator<C>, ErasedOutcome) -> CallbackResult>;

struct SettledTask {
    task_id: TaskId,
    outcome: ErasedOutcome,
}

struct ActiveTask<C> {
    label: &'static str,
    phase: Arc<AtomicU8>,
    handle: JoinHandle<()>,
    settle: SettleFn<C>,
}

/// Runs background operations on the tokio runtime and invokes their
/// callbacks on the thread that calls [`TaskOrchestrator::drain_completed`].
///
/// Every scheduled task leaves the active set exactly once: when its outcome
/// is drained, or when it is cancelled before producing one.
pub struct TaskOrchestrator<C> {
    runtime: TokioHandle,
    next_task_id: TaskId,
    active: HashMap<TaskId, ActiveTask<C>>,
    settled_tx: UnboundedSender<SettledTask>,
    settled_rx: UnboundedReceiver<SettledTask>,
    aborted: Vec<JoinHandle<()>>,
}

impl<C: 'static> TaskOrchestrator<C> {
    pub fn new(runtime: TokioHandle) -> Self {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            next_task_id: 0,
            active: HashMap::new(),
            settled_tx,
            settled_rx,
            aborted: Vec::new(),
        }
    }

    pub fn from_current() -> Result<Self, ChatError> {
        let runtime = TokioHandle::try_current().map_err(|err| {
            ChatError::Internal(format!("task orchestrator requires a tokio runtime: {err}"))
        })?;
        Ok(Self::new(runtime))
    }

    pub fn schedule<T: Send + 'static>(&mut self, task: BackgroundTask<C, T>) -> TaskId {
        self.next_task_id = self
            .next_task_id
            .checked_add(1)
            .expect("task orchestrator id space exhausted");
        let task_id = self.next_task_id;
        let BackgroundTask {
            label,
            operation,
            on_complete,
            on_error,
        } = task;

        let phase = Arc::new(AtomicU8::new(PHASE_RUNNING));
        let worker_phase = Arc::clone(&phase);
        let settled_tx = self.settled_tx.clone();
        let handle = self.runtime.spawn(async move {
            let outcome = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(result) => result.map(|value| Box::new(value) as Box<dyn Any + Send>),
                Err(_) => Err(ChatError::Internal(format!(
                    "background task `{label}` panicked"
                ))),
            };
            if worker_phase
                .compare_exchange(
                    PHASE_RUNNING,
                    PHASE_PRODUCED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                let _ = settled_tx.send(SettledTask { task_id, outcome });
            }
        });

        let settle: SettleFn<C> = Box::new(move |context, tasks, outcome| match outcome {
            Ok(value) => match value.downcast::<T>() {
                Ok(value) => match on_complete {
                    Some(callback) => callback(context, tasks, *value),
                    None => Ok(()),
                },
                Err(_) => Err(ChatError::Internal(format!(
                    "background task `{label}` produced an unexpected output type"
                ))),
            },
            Err(failure) => {
                warn!(task_id, label, error = %failure, "background task failed");
                match on_error {
                    Some(callback) => callback(context, tasks, failure),
                    None => Ok(()),
                }
            }
        });

        debug!(task_id, label, "background task scheduled");
        self.active.insert(
            task_id,
            ActiveTask {
                label,
                phase,
                handle,
                settle,
            },
        );
        task_id
    }

    /// Runs callbacks for every outcome produced since the last drain.
    /// Returns how many tasks settled.
    pub fn drain_completed(&mut self, context: &mut C) -> usize {
        let mut settled = 0;
        loop {
            let next = match self.settled_rx.try_recv() {
                Ok(next) => next,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            let Some(active) = self.active.remove(&next.task_id) else {
                debug!(task_id = next.task_id, "discarding outcome of cancelled task");
                continue;
            };
            settled += 1;

            let ActiveTask { label, settle, .. } = active;
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| settle(context, self, next.outcome)));
            match result {
                Ok(Ok(())) => debug!(task_id = next.task_id, label, "background task settled"),
                Ok(Err(failure)) => {
                    error!(task_id = next.task_id, label, error = %failure, "task callback failed");
                }
                Err(_) => error!(task_id = next.task_id, label, "task callback panicked"),
            }
        }
        self.aborted.retain(|handle| !handle.is_finished());
        settled
    }

    /// Returns whether a live task with this id existed. A task that already
    /// produced its outcome stays tracked and its callback still runs.
    pub fn cancel(&mut self, task_id: TaskId) -> bool {
        let Some(active) = self.active.get(&task_id) else {
            return false;
        };
        let cancelled = active
            .phase
            .compare_exchange(
                PHASE_RUNNING,
                PHASE_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !cancelled {
            debug!(task_id, "cancel after outcome was produced; callback still pending");
            return true;
        }
        if let Some(active) = self.active.remove(&task_id) {
            debug!(task_id, label = active.label, "background task cancelled");
            active.handle.abort();
            self.aborted.push(active.handle);
        }
        true
    }

    /// Cancels every tracked task, including ones whose outcome is queued but
    /// not yet drained. Returns how many were tracked.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.active.len();
        for (_, active) in self.active.drain() {
            active.phase.store(PHASE_CANCELLED, Ordering::Release);
            active.handle.abort();
            self.aborted.push(active.handle);
        }
        while self.settled_rx.try_recv().is_ok() {}
        if count > 0 {
            debug!(count, "cancelled all background tasks");
        }
        count
    }

    /// Waits until every aborted task has actually stopped running.
    pub async fn join_cancelled(&mut self) {
        for handle in std::mem::take(&mut self.aborted) {
            match handle.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => warn!(error = %err, "cancelled background task failed while stopping"),
            }
        }
    }

    pub async fn shutdown(&mut self) {
        self.cancel_all();
        self.join_cancelled().await;
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, task_id: TaskId) -> bool {
        self.active.contains_key(&task_id)
    }
}
