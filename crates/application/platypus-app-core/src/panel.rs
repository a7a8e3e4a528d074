//! The piece every tool view model is composed from: status line, busy flag,
//! progress projection, operation runner and the dispatcher that connects
//! background work back to the UI thread.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use platypus_core::{
    format_elapsed, OperationOutcome, OperationStatus, ProgressSnapshot, PropertyKey,
    PropertyNotifier, SubscriptionId,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatcher::{DispatcherHandle, UiDispatcher};
use crate::ports::StatusReporter;
use crate::projection::{ElapsedTicker, ProgressProjection, ProgressReporter, ProgressSink};
use crate::runner::{OperationId, OperationRunner, OperationScope};

#[derive(Debug)]
pub enum OperationEvent<R> {
    Started {
        label: String,
    },
    Progress(ProgressSnapshot),
    Elapsed(Duration),
    Finished {
        status: OperationStatus,
        elapsed: Duration,
        result: Option<R>,
    },
}

#[derive(Debug)]
pub struct OperationMessage<R> {
    pub operation: OperationId,
    pub event: OperationEvent<R>,
}

impl<R: Send + 'static> ProgressSink for DispatcherHandle<OperationMessage<R>> {
    fn post_progress(&self, operation: OperationId, snapshot: ProgressSnapshot) -> bool {
        self.post(OperationMessage {
            operation,
            event: OperationEvent::Progress(snapshot),
        })
    }

    fn post_elapsed(&self, operation: OperationId, elapsed: Duration) -> bool {
        self.post(OperationMessage {
            operation,
            event: OperationEvent::Elapsed(elapsed),
        })
    }
}

/// What running work gets to see of its operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    scope: OperationScope,
    reporter: ProgressReporter,
}

impl OperationContext {
    pub fn operation(&self) -> OperationId {
        self.scope.id()
    }

    pub fn token(&self) -> &CancellationToken {
        self.scope.token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }
}

/// Posts `Finished` even if the launching future is dropped half way.
struct FinishGuard<R: Send + 'static> {
    sink: DispatcherHandle<OperationMessage<R>>,
    operation: OperationId,
    started: Instant,
    armed: bool,
}

impl<R: Send + 'static> Drop for FinishGuard<R> {
    fn drop(&mut self) {
        if self.armed {
            self.sink.post(OperationMessage {
                operation: self.operation,
                event: OperationEvent::Finished {
                    status: OperationStatus::Cancelled,
                    elapsed: self.started.elapsed(),
                    result: None,
                },
            });
        }
    }
}

/// Background half of a [`ToolPanel`]. Cheap to clone, safe to move into
/// commands and tasks.
pub struct OperationLauncher<R> {
    panel: Arc<str>,
    runner: Arc<OperationRunner>,
    sink: DispatcherHandle<OperationMessage<R>>,
    tick_period: Duration,
}

impl<R> Clone for OperationLauncher<R> {
    fn clone(&self) -> Self {
        Self {
            panel: self.panel.clone(),
            runner: self.runner.clone(),
            sink: self.sink.clone(),
            tick_period: self.tick_period,
        }
    }
}

impl<R: Send + 'static> OperationLauncher<R> {
    /// Runs `work` as the panel's current operation, cancelling whatever ran
    /// before. Resolves once `work` has finished and `Finished` is queued.
    /// Must be awaited inside a tokio runtime.
    pub async fn run<F, Fut>(&self, label: &str, work: F) -> OperationStatus
    where
        F: FnOnce(OperationContext) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        // Posted under the runner lock so the UI sees `Started` in scope order.
        let scope = self.runner.acquire_scope_with(|scope| {
            self.sink.post(OperationMessage {
                operation: scope.id(),
                event: OperationEvent::Started {
                    label: label.to_string(),
                },
            });
        });
        let operation = scope.id();
        let started = Instant::now();
        info!(panel = %self.panel, %operation, "{label}");

        let mut guard = FinishGuard {
            sink: self.sink.clone(),
            operation,
            started,
            armed: true,
        };

        let sink: Arc<dyn ProgressSink> = Arc::new(self.sink.clone());
        let mut ticker = ElapsedTicker::start(operation, started, sink.clone(), self.tick_period);
        let reporter = ProgressReporter::new(operation, started, sink);

        let outcome = self
            .runner
            .run_in(scope, move |scope| work(OperationContext { scope, reporter }))
            .await;
        let elapsed = ticker.stop();

        let status = outcome.status();
        let result = match outcome {
            OperationOutcome::Completed(value) => Some(value),
            OperationOutcome::Cancelled | OperationOutcome::Faulted(_) => None,
        };
        info!(panel = %self.panel, %operation, ?status, elapsed = %format_elapsed(elapsed), "Operation finished");

        guard.armed = false;
        self.sink.post(OperationMessage {
            operation,
            event: OperationEvent::Finished {
                status: status.clone(),
                elapsed,
                result,
            },
        });
        status
    }

    pub fn cancel(&self) -> bool {
        self.runner.cancel_current()
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_active()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelProperty {
    Status,
    IsBusy,
    LastOutcome,
}

impl PropertyKey for PanelProperty {}

type StateHook = Box<dyn Fn() + Send>;

/// UI-thread half: observable state fed by [`ToolPanel::pump`].
pub struct ToolPanel<R = ()> {
    name: Arc<str>,
    notifier: PropertyNotifier<PanelProperty>,
    status: String,
    is_busy: bool,
    last_outcome: Option<OperationStatus>,
    active: Option<OperationId>,
    progress: ProgressProjection,
    runner: Arc<OperationRunner>,
    dispatcher: UiDispatcher<OperationMessage<R>>,
    status_reporter: Arc<dyn StatusReporter>,
    state_hooks: Vec<StateHook>,
    tick_period: Duration,
}

impl<R: Send + 'static> ToolPanel<R> {
    pub fn new(name: &str, status_reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            name: Arc::from(name),
            notifier: PropertyNotifier::new(),
            status: String::new(),
            is_busy: false,
            last_outcome: None,
            active: None,
            progress: ProgressProjection::new(),
            runner: Arc::new(OperationRunner::new()),
            dispatcher: UiDispatcher::new(),
            status_reporter,
            state_hooks: Vec::new(),
            tick_period: platypus_config::ELAPSED_TICK_INTERVAL,
        }
    }

    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    pub fn launcher(&self) -> OperationLauncher<R> {
        OperationLauncher {
            panel: self.name.clone(),
            runner: self.runner.clone(),
            sink: self.dispatcher.handle(),
            tick_period: self.tick_period,
        }
    }

    pub fn runner(&self) -> &Arc<OperationRunner> {
        &self.runner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_busy(&self) -> bool {
        self.is_busy
    }

    pub fn last_outcome(&self) -> Option<&OperationStatus> {
        self.last_outcome.as_ref()
    }

    pub fn active_operation(&self) -> Option<OperationId> {
        self.active
    }

    pub fn progress(&self) -> &ProgressProjection {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut ProgressProjection {
        &mut self.progress
    }

    pub fn subscribe(
        &mut self,
        observer: impl FnMut(PanelProperty) + Send + 'static,
    ) -> SubscriptionId {
        self.notifier.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Registers a callback run whenever the busy state flips; typically
    /// re-evaluates the panel's commands.
    pub fn on_state_changed(&mut self, hook: impl Fn() + Send + 'static) {
        self.state_hooks.push(Box::new(hook));
    }

    pub fn set_status(&mut self, status: impl Into<String>) -> bool {
        let changed = self
            .notifier
            .set_field(&mut self.status, status.into(), PanelProperty::Status);
        if changed {
            self.status_reporter.report_status(&self.name, &self.status);
        }
        changed
    }

    pub fn cancel(&self) -> bool {
        self.runner.cancel_current()
    }

    /// Applies everything queued by background work. Returns the result of
    /// the active operation if it completed during this pump.
    pub fn pump(&mut self) -> Option<R> {
        let mut queued = Vec::new();
        self.dispatcher.pump(|m| queued.push(m));
        self.apply_all(queued)
    }

    /// Like [`pump`](Self::pump), blocking up to `timeout` for the first message.
    pub fn wait_and_pump(&mut self, timeout: Duration) -> Option<R> {
        let mut queued = Vec::new();
        self.dispatcher.wait_and_pump(timeout, |m| queued.push(m));
        self.apply_all(queued)
    }

    fn apply_all(&mut self, queued: Vec<OperationMessage<R>>) -> Option<R> {
        let mut completed = None;
        for message in queued {
            if let Some(result) = self.apply(message) {
                completed = Some(result);
            }
        }
        completed
    }

    fn apply(&mut self, message: OperationMessage<R>) -> Option<R> {
        let OperationMessage { operation, event } = message;

        if let OperationEvent::Started { label } = event {
            self.begin(operation, label);
            return None;
        }
        if self.active != Some(operation) {
            debug!(panel = %self.name, %operation, "Dropping message from superseded operation");
            return None;
        }

        match event {
            OperationEvent::Started { .. } => None,
            OperationEvent::Progress(snapshot) => {
                self.progress.apply(snapshot);
                None
            }
            OperationEvent::Elapsed(elapsed) => {
                self.progress.apply_elapsed(elapsed);
                None
            }
            OperationEvent::Finished {
                status,
                elapsed,
                result,
            } => {
                self.progress.apply_elapsed(elapsed);
                self.finish(status, elapsed);
                result
            }
        }
    }

    fn begin(&mut self, operation: OperationId, label: String) {
        self.active = Some(operation);
        self.progress.reset(true);
        self.set_status(label);
        let changed = self
            .notifier
            .set_field(&mut self.is_busy, true, PanelProperty::IsBusy);
        if changed {
            self.run_state_hooks();
        }
    }

    fn finish(&mut self, status: OperationStatus, elapsed: Duration) {
        self.active = None;
        let line = match &status {
            OperationStatus::Completed => {
                format!("{} completed in {}", self.name, format_elapsed(elapsed))
            }
            OperationStatus::Cancelled => format!("{} cancelled", self.name),
            OperationStatus::Faulted { message } => format!("{} failed: {message}", self.name),
        };
        self.set_status(line);
        self.notifier
            .set_field(&mut self.last_outcome, Some(status), PanelProperty::LastOutcome);
        self.notifier
            .set_field(&mut self.is_busy, false, PanelProperty::IsBusy);
        self.run_state_hooks();
    }

    fn run_state_hooks(&self) {
        for hook in &self.state_hooks {
            hook();
        }
    }
}

impl<R> Drop for ToolPanel<R> {
    fn drop(&mut self) {
        self.runner.release_scope();
    }
}
