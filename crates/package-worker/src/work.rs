//! WorkInProgress: a cancelable job that reports progress
//!
//! A task handler builds one [`WorkInProgress`] per `work_on_expectation`
//! call and hands the job body to [`WorkInProgress::start`]. The body gets a
//! [`WorkReporter`] and is the only thing that reports on the job.
//!
//! ```text
//! start(body) ──next tick──▶ body(reporter)
//!                              ├─ report_progress ─┐ coalesced, at most one
//!                              │                   └▶ Progress event per interval
//!                              ├─ report_complete ───▶ Done   (terminal)
//!                              ├─ report_error ──────▶ Error  (terminal)
//!                              └─ Err / panic ───────▶ Error  (terminal)
//! cancel() ── on_cancel cleanup (timeout-bounded, runs once) ──▶ outcome Cancelled
//! ```
//!
//! Consumers watch the job through [`WorkInProgress::subscribe`] (all
//! events) or [`WorkInProgress::wait`] (terminal outcome only).

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Reason, WorkerError, WorkerResult};
use crate::timeout::try_with_timeout;

/// Channel capacity for job events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Static description of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkProperties {
    pub work_label: String,
}

impl WorkProperties {
    pub fn new(work_label: impl Into<String>) -> Self {
        Self {
            work_label: work_label.into(),
        }
    }
}

/// Events emitted by a job.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkEvent {
    Progress {
        actual_version_hash: Option<String>,
        progress: f64,
    },
    Done {
        actual_version_hash: Option<String>,
        reason: Reason,
        result: Option<serde_json::Value>,
    },
    Error {
        reason: Reason,
    },
}

impl WorkEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkEvent::Progress { .. })
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    Done {
        actual_version_hash: Option<String>,
        reason: Reason,
        result: Option<serde_json::Value>,
    },
    Error {
        reason: Reason,
    },
    /// Ended by `cancel()` before reaching done or error.
    Cancelled,
}

type CancelCallback = Box<dyn FnOnce() -> BoxFuture<'static, WorkerResult<()>> + Send>;
type CancelCleanup = Shared<BoxFuture<'static, ()>>;

#[derive(Default)]
struct ProgressState {
    actual_version_hash: Option<String>,
    progress: f64,
    flush_pending: bool,
    terminal: bool,
}

struct Inner {
    id: String,
    properties: WorkProperties,
    events: broadcast::Sender<WorkEvent>,
    outcome: watch::Sender<Option<WorkOutcome>>,
    state: Mutex<ProgressState>,
    started: AtomicBool,
    token: CancellationToken,
    on_cancel: Mutex<Option<CancelCallback>>,
    cancel_cleanup: Mutex<Option<CancelCleanup>>,
    cancel_error: Mutex<Option<WorkerError>>,
    progress_interval: Duration,
    cancel_timeout: Duration,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: WorkEvent) {
        // No subscribers is fine; `wait()` still sees terminal outcomes.
        let _ = self.events.send(event);
    }

    fn flush_progress(&self) {
        let event = {
            let mut state = self.state();
            state.flush_pending = false;
            if state.terminal {
                return;
            }
            WorkEvent::Progress {
                actual_version_hash: state.actual_version_hash.clone(),
                progress: state.progress,
            }
        };
        self.emit(event);
    }

    /// Record the terminal outcome. The first terminal report wins.
    fn finish(&self, outcome: WorkOutcome, event: Option<WorkEvent>) -> bool {
        {
            let mut state = self.state();
            if state.terminal {
                return false;
            }
            state.terminal = true;
        }
        self.outcome.send_replace(Some(outcome));
        if let Some(event) = event {
            self.emit(event);
        }
        true
    }
}

/// A running job. Cheap to clone; all clones observe the same job.
#[derive(Clone)]
pub struct WorkInProgress {
    inner: Arc<Inner>,
}

impl WorkInProgress {
    /// `on_cancel` releases whatever the job holds (aborts transfers, kills
    /// child processes, removes partial targets). It runs at most once.
    pub fn new<F, Fut>(properties: WorkProperties, config: &WorkerConfig, on_cancel: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = WorkerResult<()>> + Send + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outcome, _) = watch::channel(None);
        let callback: CancelCallback = Box::new(move || on_cancel().boxed());
        Self {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4().to_string(),
                properties,
                events,
                outcome,
                state: Mutex::new(ProgressState::default()),
                started: AtomicBool::new(false),
                token: CancellationToken::new(),
                on_cancel: Mutex::new(Some(callback)),
                cancel_cleanup: Mutex::new(None),
                cancel_error: Mutex::new(None),
                progress_interval: config.progress_interval(),
                cancel_timeout: config.cancel_timeout(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn properties(&self) -> &WorkProperties {
        &self.inner.properties
    }

    /// Latest reported progress, including values not yet emitted.
    pub fn progress(&self) -> f64 {
        self.inner.state().progress
    }

    pub fn actual_version_hash(&self) -> Option<String> {
        self.inner.state().actual_version_hash.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkEvent> {
        self.inner.events.subscribe()
    }

    /// Schedule `work` on the next tick. An `Err` return or a panic from
    /// `work` becomes the job's error event. Only one body may ever run.
    pub fn start<F, Fut>(&self, work: F) -> WorkerResult<()>
    where
        F: FnOnce(WorkReporter) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyStarted {
                work_label: self.inner.properties.work_label.clone(),
            });
        }
        let reporter = WorkReporter {
            inner: self.inner.clone(),
        };
        let label = self.inner.properties.work_label.clone();
        info!(work = %label, id = %self.inner.id, "Work starting");

        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let body_reporter = reporter.clone();
            let result = AssertUnwindSafe(async move { work(body_reporter).await })
                .catch_unwind()
                .await;
            let reason = match result {
                Ok(Ok(())) => return,
                Ok(Err(err)) => Reason::new("Work failed", format!("{err:#}")),
                Err(panic) => Reason::new("Work failed unexpectedly", panic_message(panic)),
            };
            if reporter.is_cancelled() {
                debug!(work = %label, tech = %reason.tech, "Work body ended after cancel");
                return;
            }
            reporter.report_error(reason);
        });
        Ok(())
    }

    /// Run the cleanup callback and mark the job cancelled. Safe to call any
    /// number of times; every caller waits for the one cleanup, and only the
    /// caller that started it sees a cleanup error. The cleanup runs on its
    /// own task, so dropping a caller does not abort it.
    pub async fn cancel(&self) -> WorkerResult<()> {
        let (cleanup, started_here) = {
            let mut slot = self
                .inner
                .cancel_cleanup
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(cleanup) => (cleanup.clone(), false),
                None => {
                    let cleanup = spawn_cancel_cleanup(&self.inner);
                    *slot = Some(cleanup.clone());
                    (cleanup, true)
                }
            }
        };
        cleanup.await;
        if !started_here {
            return Ok(());
        }
        match self
            .inner
            .cancel_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Wait for the terminal outcome.
    pub async fn wait(&self) -> WorkOutcome {
        let mut rx = self.inner.outcome.subscribe();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return WorkOutcome::Error {
                    reason: Reason::plain("Work was dropped before finishing"),
                };
            }
        }
    }
}

impl std::fmt::Debug for WorkInProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkInProgress")
            .field("id", &self.inner.id)
            .field("properties", &self.inner.properties)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Trip the token and run the cleanup callback on a spawned task.
fn spawn_cancel_cleanup(inner: &Arc<Inner>) -> CancelCleanup {
    inner.token.cancel();
    let callback = inner
        .on_cancel
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    let task_inner = inner.clone();
    let task = tokio::spawn(async move {
        if let Some(callback) = callback {
            info!(work = %task_inner.properties.work_label, "Cancelling work");
            let result = AssertUnwindSafe(try_with_timeout(
                task_inner.cancel_timeout,
                "cancel work",
                callback(),
            ))
            .catch_unwind()
            .await;
            let err = match result {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(panic) => Some(WorkerError::Other(anyhow::anyhow!(
                    "cancel cleanup panicked: {}",
                    panic_message(panic)
                ))),
            };
            if let Some(err) = err {
                warn!(work = %task_inner.properties.work_label, error = %err, "Cancel cleanup failed");
                *task_inner
                    .cancel_error
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(err);
            }
        }
        task_inner.finish(WorkOutcome::Cancelled, None);
    });
    task.map(|_| ()).boxed().shared()
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in work body".to_string()
    }
}

/// The job body's side of a [`WorkInProgress`].
#[derive(Clone)]
pub struct WorkReporter {
    inner: Arc<Inner>,
}

impl WorkReporter {
    /// Record progress (clamped to `0.0..=1.0`). Emission is coalesced: the
    /// first call in a quiet period arms a timer, and when it fires one
    /// event carries the latest values.
    pub fn report_progress(&self, actual_version_hash: Option<String>, progress: f64) {
        let schedule = {
            let mut state = self.inner.state();
            state.actual_version_hash = actual_version_hash;
            state.progress = progress.clamp(0.0, 1.0);
            !std::mem::replace(&mut state.flush_pending, true)
        };
        if schedule {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                tokio::time::sleep(inner.progress_interval).await;
                inner.flush_progress();
            });
        }
    }

    pub fn report_complete(
        &self,
        actual_version_hash: Option<String>,
        reason: Reason,
        result: Option<serde_json::Value>,
    ) {
        info!(work = %self.inner.properties.work_label, "Work done");
        {
            let mut state = self.inner.state();
            state.actual_version_hash = actual_version_hash.clone();
            state.progress = 1.0;
        }
        let event = WorkEvent::Done {
            actual_version_hash: actual_version_hash.clone(),
            reason: reason.clone(),
            result: result.clone(),
        };
        let outcome = WorkOutcome::Done {
            actual_version_hash,
            reason,
            result,
        };
        if !self.inner.finish(outcome, Some(event)) {
            warn!(work = %self.inner.properties.work_label, "Completion reported after work ended");
        }
    }

    pub fn report_error(&self, reason: Reason) {
        warn!(work = %self.inner.properties.work_label, tech = %reason.tech, "Work failed");
        let event = WorkEvent::Error {
            reason: reason.clone(),
        };
        if !self.inner.finish(WorkOutcome::Error { reason }, Some(event)) {
            warn!(work = %self.inner.properties.work_label, "Error reported after work ended");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once the job is cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Token that trips on cancel, for passing into backend calls.
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn work_label(&self) -> &str {
        &self.inner.properties.work_label
    }
}
