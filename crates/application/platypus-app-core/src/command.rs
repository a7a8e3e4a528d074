//! Invocable user actions with an explicitly re-evaluated enable predicate.
//!
//! Executability is never tracked automatically: whoever mutates state a
//! predicate reads calls [`Command::raise_can_execute_changed`], which
//! recomputes the cached value and notifies subscribers.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::debug;

pub type CanExecuteHandler = Box<dyn Fn(bool) + Send + Sync>;

type Predicate<P> = Box<dyn Fn(&P) -> bool + Send + Sync>;
type Action<P> = Box<dyn Fn(P) -> anyhow::Result<()> + Send + Sync>;
type AsyncOperation<P> = Box<dyn Fn(P) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Whether an `execute` call actually ran the wrapped action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Ran,
    /// The predicate said no, or an async invocation was already in flight.
    Rejected,
}

pub trait Command<P = ()> {
    fn can_execute(&self, parameter: &P) -> bool;

    /// Last value published by [`raise_can_execute_changed`](Self::raise_can_execute_changed).
    fn is_enabled(&self) -> bool;

    fn raise_can_execute_changed(&self, parameter: &P);

    fn subscribe_can_execute_changed(&self, handler: CanExecuteHandler);
}

type SharedHandler = Arc<dyn Fn(bool) + Send + Sync>;

struct CanExecuteState {
    cached: AtomicBool,
    handlers: Mutex<Vec<SharedHandler>>,
}

impl CanExecuteState {
    fn new() -> Self {
        Self {
            cached: AtomicBool::new(true),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Handlers run outside the lock, so they may subscribe further handlers.
    fn publish(&self, enabled: bool) {
        self.cached.store(enabled, Ordering::Release);
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler(enabled);
        }
    }

    fn subscribe(&self, handler: CanExecuteHandler) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::from(handler));
    }

    fn cached(&self) -> bool {
        self.cached.load(Ordering::Acquire)
    }
}

/// Runs its action synchronously on the calling thread.
pub struct RelayCommand<P = ()> {
    action: Action<P>,
    predicate: Option<Predicate<P>>,
    state: CanExecuteState,
}

impl<P> RelayCommand<P> {
    pub fn new(action: impl Fn(P) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Self {
            action: Box::new(action),
            predicate: None,
            state: CanExecuteState::new(),
        }
    }

    pub fn with_predicate(
        action: impl Fn(P) -> anyhow::Result<()> + Send + Sync + 'static,
        predicate: impl Fn(&P) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Some(Box::new(predicate)),
            ..Self::new(action)
        }
    }

    /// Errors from the action propagate unchanged.
    pub fn execute(&self, parameter: P) -> anyhow::Result<Execution> {
        if !self.can_execute(&parameter) {
            return Ok(Execution::Rejected);
        }
        (self.action)(parameter)?;
        Ok(Execution::Ran)
    }
}

impl<P> Command<P> for RelayCommand<P> {
    fn can_execute(&self, parameter: &P) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(parameter))
    }

    fn is_enabled(&self) -> bool {
        self.state.cached()
    }

    fn raise_can_execute_changed(&self, parameter: &P) {
        self.state.publish(self.can_execute(parameter));
    }

    fn subscribe_can_execute_changed(&self, handler: CanExecuteHandler) {
        self.state.subscribe(handler);
    }
}

struct AsyncInner<P> {
    operation: AsyncOperation<P>,
    predicate: Option<Predicate<P>>,
    running: AtomicBool,
    state: CanExecuteState,
}

impl<P> AsyncInner<P> {
    fn predicate_allows(&self, parameter: &P) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(parameter))
    }
}

/// Runs an async operation, at most one invocation at a time per instance.
///
/// While an invocation is in flight `can_execute` is `false` whatever the
/// predicate says. The running flag is cleared by a drop guard, so success,
/// error, panic and a dropped future all leave the command re-invocable.
pub struct AsyncRelayCommand<P = ()> {
    inner: Arc<AsyncInner<P>>,
}

impl<P> Clone for AsyncRelayCommand<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct RunningGuard<P> {
    inner: Arc<AsyncInner<P>>,
    parameter: P,
}

impl<P> Drop for RunningGuard<P> {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        let enabled = self.inner.predicate_allows(&self.parameter);
        self.inner.state.publish(enabled);
    }
}

impl<P> AsyncRelayCommand<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::build(operation, None)
    }

    pub fn with_predicate<F, Fut>(
        operation: F,
        predicate: impl Fn(&P) -> bool + Send + Sync + 'static,
    ) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::build(operation, Some(Box::new(predicate)))
    }

    fn build<F, Fut>(operation: F, predicate: Option<Predicate<P>>) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            inner: Arc::new(AsyncInner {
                operation: Box::new(move |p| Box::pin(operation(p))),
                predicate,
                running: AtomicBool::new(false),
                state: CanExecuteState::new(),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn try_begin(&self, parameter: &P) -> Option<RunningGuard<P>> {
        if !self.inner.predicate_allows(parameter) {
            return None;
        }
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Async command already running; ignoring invocation");
            return None;
        }
        self.inner.state.publish(false);
        Some(RunningGuard {
            inner: self.inner.clone(),
            parameter: parameter.clone(),
        })
    }

    /// Runs the operation to completion. Errors propagate to the caller.
    pub async fn execute(&self, parameter: P) -> anyhow::Result<Execution> {
        let Some(guard) = self.try_begin(&parameter) else {
            return Ok(Execution::Rejected);
        };
        let fut = (self.inner.operation)(parameter);
        let result = fut.await;
        drop(guard);
        result.map(|()| Execution::Ran)
    }

    /// Starts the operation on the shared runtime, for callers that cannot
    /// await. The running flag is taken before this returns, so a second
    /// `spawn` issued right after is already rejected.
    pub fn spawn(&self, parameter: P) -> anyhow::Result<JoinHandle<anyhow::Result<Execution>>> {
        let rt = crate::async_runtime::runtime()?;
        let Some(guard) = self.try_begin(&parameter) else {
            return Ok(rt.spawn(async { Ok(Execution::Rejected) }));
        };
        let fut = (self.inner.operation)(parameter);
        Ok(rt.spawn(async move {
            let result = fut.await;
            drop(guard);
            result.map(|()| Execution::Ran)
        }))
    }
}

impl<P> Command<P> for AsyncRelayCommand<P> {
    fn can_execute(&self, parameter: &P) -> bool {
        !self.inner.running.load(Ordering::Acquire) && self.inner.predicate_allows(parameter)
    }

    fn is_enabled(&self) -> bool {
        self.inner.state.cached()
    }

    fn raise_can_execute_changed(&self, parameter: &P) {
        self.inner.state.publish(self.can_execute(parameter));
    }

    fn subscribe_can_execute_changed(&self, handler: CanExecuteHandler) {
        self.inner.state.subscribe(handler);
    }
}
