use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use platypus_app_core::{ensure_initialized, AsyncInitialize, InitGate};
use platypus_core::InitState;

struct Probe {
    gate: InitGate,
    runs: AtomicUsize,
    errors: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
}

impl Probe {
    fn new(failures: usize, delay: Duration) -> Self {
        Self {
            gate: InitGate::new(),
            runs: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
            delay,
        }
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsyncInitialize for Probe {
    fn init_gate(&self) -> &InitGate {
        &self.gate
    }

    async fn initialize_core(&self) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        anyhow::ensure!(!should_fail, "location lookup failed");
        Ok(())
    }

    fn on_initialization_error(&self, _error: &anyhow::Error) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_callers_run_setup_once() {
    let probe = Arc::new(Probe::new(0, Duration::from_millis(50)));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let probe = probe.clone();
        tasks.push(tokio::spawn(async move {
            ensure_initialized(probe.as_ref()).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), InitState::Completed);
    }

    assert_eq!(probe.runs(), 1);
    assert!(probe.gate.is_initialized());

    assert_eq!(ensure_initialized(probe.as_ref()).await, InitState::Completed);
    assert_eq!(probe.runs(), 1);
}

#[tokio::test]
async fn failure_is_reported_and_retried() {
    let probe = Probe::new(1, Duration::ZERO);

    assert_eq!(ensure_initialized(&probe).await, InitState::NotStarted);
    assert_eq!(probe.errors.load(Ordering::SeqCst), 1);
    assert_eq!(probe.gate.state(), InitState::NotStarted);

    assert_eq!(ensure_initialized(&probe).await, InitState::Completed);
    assert_eq!(probe.runs(), 2);
    assert_eq!(probe.errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn waiters_share_a_failed_attempt() {
    let probe = Probe::new(1, Duration::from_millis(20));

    let (a, b) = tokio::join!(ensure_initialized(&probe), ensure_initialized(&probe));

    assert_eq!(a, InitState::NotStarted);
    assert_eq!(b, InitState::NotStarted);
    assert_eq!(probe.runs(), 1);
    assert_eq!(probe.errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reset_runs_setup_again() {
    let probe = Probe::new(0, Duration::ZERO);

    ensure_initialized(&probe).await;
    probe.gate.reset();
    assert_eq!(probe.gate.state(), InitState::NotStarted);

    assert_eq!(ensure_initialized(&probe).await, InitState::Completed);
    assert_eq!(probe.runs(), 2);
}

#[tokio::test]
async fn abandoned_attempt_leaves_gate_retryable() {
    let probe = Probe::new(0, Duration::from_secs(30));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), ensure_initialized(&probe)).await;
    assert!(abandoned.is_err());
    assert_eq!(probe.gate.state(), InitState::NotStarted);
}
