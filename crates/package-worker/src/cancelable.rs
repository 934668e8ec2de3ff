//! Single-shot cancelable async computation
//!
//! The executor receives a [`CancelScope`] at construction and registers its
//! cleanup against it. [`CancelableTask::cancel`] runs that cleanup
//! synchronously and trips the scope's token; settling the task after a
//! cancel is the executor's job (usually by returning
//! [`WorkerError::Cancelled`] once `scope.cancelled()` fires).
//!
//! ```rust,ignore
//! let task = CancelableTask::new(|scope| {
//!     let child = spawn_encoder();
//!     let kill = child.kill_handle();
//!     let registered = scope.on_cancel(move || kill.kill());
//!     async move {
//!         registered?;
//!         tokio::select! {
//!             _ = scope.cancelled() => Err(WorkerError::Cancelled("encoder".into())),
//!             out = child.wait() => Ok(out?),
//!         }
//!     }
//! });
//! ```

use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

use crate::error::{WorkerError, WorkerResult};

type CancelHandler = Box<dyn FnOnce() + Send>;

enum HandlerSlot {
    Empty,
    Registered(CancelHandler),
    Fired,
}

/// Handed to the executor: where it registers its one cleanup callback.
#[derive(Clone)]
pub struct CancelScope {
    token: CancellationToken,
    handler: Arc<Mutex<HandlerSlot>>,
}

impl CancelScope {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handler: Arc::new(Mutex::new(HandlerSlot::Empty)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, HandlerSlot> {
        self.handler.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the cleanup to run on cancel. Only one may be registered.
    pub fn on_cancel(&self, handler: impl FnOnce() + Send + 'static) -> WorkerResult<()> {
        let mut slot = self.slot();
        match *slot {
            HandlerSlot::Empty => {
                *slot = HandlerSlot::Registered(Box::new(handler));
                Ok(())
            }
            HandlerSlot::Registered(_) | HandlerSlot::Fired => {
                Err(WorkerError::CancelHandlerAlreadySet)
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the task has been cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Token that trips on cancel, for passing into backend calls.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn cancel(&self) -> WorkerResult<()> {
        let handler = {
            let mut slot = self.slot();
            match std::mem::replace(&mut *slot, HandlerSlot::Fired) {
                HandlerSlot::Registered(handler) => Some(handler),
                HandlerSlot::Fired => None,
                HandlerSlot::Empty => {
                    *slot = HandlerSlot::Empty;
                    return Err(WorkerError::CancelHandlerMissing);
                }
            }
        };
        if let Some(handler) = handler {
            handler();
        }
        self.token.cancel();
        Ok(())
    }
}

/// Cloneable cancel trigger for a task that is being awaited elsewhere.
#[derive(Clone)]
pub struct Canceller {
    scope: CancelScope,
}

impl Canceller {
    /// See [`CancelableTask::cancel`].
    pub fn cancel(&self) -> WorkerResult<()> {
        self.scope.cancel()
    }
}

/// A future with a cancel hook. Await it for the result.
pub struct CancelableTask<T> {
    scope: CancelScope,
    future: BoxFuture<'static, WorkerResult<T>>,
}

impl<T: Send + 'static> CancelableTask<T> {
    /// Run `executor` immediately with a fresh scope; the future it returns
    /// is the task body.
    pub fn new<F, Fut>(executor: F) -> Self
    where
        F: FnOnce(CancelScope) -> Fut,
        Fut: Future<Output = WorkerResult<T>> + Send + 'static,
    {
        let scope = CancelScope::new();
        let future = executor(scope.clone());
        Self {
            scope,
            future: Box::pin(future),
        }
    }

    /// An already-settled task. Cancelling it is a no-op.
    pub fn ready(result: WorkerResult<T>) -> Self {
        Self::new(|scope| {
            let registered = scope.on_cancel(|| {});
            async move {
                registered?;
                result
            }
        })
    }
}

impl<T> CancelableTask<T> {
    /// Run the registered cleanup and trip the scope. Errors if the executor
    /// never registered a cleanup; repeated calls are no-ops.
    pub fn cancel(&self) -> WorkerResult<()> {
        self.scope.cancel()
    }

    pub fn canceller(&self) -> Canceller {
        Canceller {
            scope: self.scope.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }
}

impl<T> Future for CancelableTask<T> {
    type Output = WorkerResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}
