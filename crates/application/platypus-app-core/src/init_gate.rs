use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use platypus_core::InitState;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Expensive first-time setup of a view, deferred until the view is shown.
#[async_trait]
pub trait AsyncInitialize: Send + Sync {
    fn init_gate(&self) -> &InitGate;

    async fn initialize_core(&self) -> anyhow::Result<()>;

    /// Failures are swallowed after this runs; the next call retries.
    fn on_initialization_error(&self, error: &anyhow::Error) {
        warn!("Initialization failed: {error:#}");
    }
}

/// Runs [`AsyncInitialize::initialize_core`] at most once per generation.
///
/// Completed is checked without locking. Everyone else serializes on an async
/// mutex and re-checks. A caller that waited while another attempt ran gets
/// that attempt's result instead of starting its own.
#[derive(Debug, Default)]
pub struct InitGate {
    state: AtomicU8,
    generation: AtomicU64,
    attempts: AtomicU64,
    guard: tokio::sync::Mutex<()>,
}

/// Puts the gate back to `NotStarted` if setup is abandoned mid-flight.
struct InProgress<'a> {
    gate: &'a InitGate,
    armed: bool,
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gate.store(InitState::NotStarted);
            self.gate.attempts.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl InitGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InitState {
        InitState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == InitState::Completed
    }

    fn store(&self, state: InitState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub async fn initialize<T: AsyncInitialize + ?Sized>(&self, target: &T) -> InitState {
        if self.is_initialized() {
            return InitState::Completed;
        }

        let attempts_seen = self.attempts.load(Ordering::Acquire);
        let _lock = self.guard.lock().await;

        if self.is_initialized() {
            return InitState::Completed;
        }
        if self.attempts.load(Ordering::Acquire) != attempts_seen {
            debug!("Initialization attempt finished while waiting; sharing its result");
            return self.state();
        }

        let generation = self.generation.load(Ordering::Acquire);
        self.store(InitState::InProgress);
        let mut in_progress = InProgress {
            gate: self,
            armed: true,
        };

        let result = target.initialize_core().await;
        in_progress.armed = false;

        match result {
            Ok(()) if self.generation.load(Ordering::Acquire) == generation => {
                self.store(InitState::Completed);
            }
            Ok(()) => {
                debug!("Initialization finished after a reset; leaving gate not started");
                self.store(InitState::NotStarted);
            }
            Err(e) => {
                target.on_initialization_error(&e);
                self.store(InitState::NotStarted);
            }
        }
        self.attempts.fetch_add(1, Ordering::AcqRel);
        self.state()
    }

    /// Forces the next `initialize` to run setup again.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.store(InitState::NotStarted);
    }
}

pub async fn ensure_initialized<T: AsyncInitialize + ?Sized>(target: &T) -> InitState {
    target.init_gate().initialize(target).await
}

/// Starts initialization on the shared runtime without blocking the caller.
/// Failures still go through [`AsyncInitialize::on_initialization_error`].
pub fn spawn_initialize<T: AsyncInitialize + 'static>(
    target: Arc<T>,
) -> anyhow::Result<JoinHandle<InitState>> {
    let rt = crate::async_runtime::runtime()?;
    Ok(rt.spawn(async move { ensure_initialized(target.as_ref()).await }))
}
