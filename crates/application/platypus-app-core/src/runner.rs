use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use platypus_core::OperationOutcome;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub type OperationId = Uuid;

/// Cancellation scope of one in-flight operation.
#[derive(Debug, Clone)]
pub struct OperationScope {
    id: OperationId,
    token: CancellationToken,
}

impl OperationScope {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Owns at most one live [`OperationScope`]. Acquiring a new scope cancels
/// the previous one under the same lock, so two near-simultaneous
/// acquisitions can never both observe an idle runner.
#[derive(Debug, Default)]
pub struct OperationRunner {
    current: Mutex<Option<OperationScope>>,
}

impl OperationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<OperationScope>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire_scope(&self) -> OperationScope {
        self.acquire_scope_with(|_| {})
    }

    /// Like [`acquire_scope`](Self::acquire_scope), running `announce` under
    /// the lock before the previous scope is cancelled. Announcements of
    /// competing acquisitions are ordered the same way as the scopes.
    pub fn acquire_scope_with(&self, announce: impl FnOnce(&OperationScope)) -> OperationScope {
        let scope = OperationScope::new();
        let mut current = self.lock();
        announce(&scope);
        if let Some(previous) = current.replace(scope.clone()) {
            previous.token.cancel();
            debug!(previous = %previous.id, next = %scope.id, "Replacing operation scope");
        }
        scope
    }

    /// Token of the active scope, or a fresh token nobody will ever cancel.
    pub fn current_token(&self) -> CancellationToken {
        self.lock()
            .as_ref()
            .map(|s| s.token.clone())
            .unwrap_or_default()
    }

    pub fn current_id(&self) -> Option<OperationId> {
        self.lock().as_ref().map(|s| s.id)
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Signals the active scope. Returns `false` when idle.
    pub fn cancel_current(&self) -> bool {
        match self.lock().as_ref() {
            Some(scope) => {
                scope.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signals and drops the active scope. Safe to call repeatedly.
    pub fn release_scope(&self) {
        if let Some(scope) = self.lock().take() {
            scope.token.cancel();
        }
    }

    /// Releases `scope` only if it is still the active one, so a superseded
    /// operation finishing late leaves its replacement untouched.
    pub fn release(&self, scope: &OperationScope) -> bool {
        let mut current = self.lock();
        let is_current = current.as_ref().is_some_and(|s| s.id == scope.id);
        if is_current {
            current.take();
        }
        scope.token.cancel();
        is_current
    }

    /// Acquires a fresh scope and runs `work` inside it.
    pub async fn run<T, F, Fut>(&self, work: F) -> OperationOutcome<T>
    where
        F: FnOnce(OperationScope) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let scope = self.acquire_scope();
        self.run_in(scope, work).await
    }

    /// Races `work` against the scope's token, then releases the scope.
    ///
    /// An error returned after the token fired counts as cancellation: work
    /// that notices the signal usually bails out with its own error type.
    pub async fn run_in<T, F, Fut>(&self, scope: OperationScope, work: F) -> OperationOutcome<T>
    where
        F: FnOnce(OperationScope) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let token = scope.token.clone();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => OperationOutcome::Cancelled,
            res = work(scope.clone()) => match res {
                Ok(value) => OperationOutcome::Completed(value),
                Err(_) if token.is_cancelled() => OperationOutcome::Cancelled,
                Err(e) => OperationOutcome::Faulted(e),
            },
        };
        self.release(&scope);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_runner_hands_out_placeholder_token() {
        let runner = OperationRunner::new();
        let token = runner.current_token();
        assert!(!token.is_cancelled());
        assert!(!runner.cancel_current());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn release_is_idempotent() {
        let runner = OperationRunner::new();
        let scope = runner.acquire_scope();
        runner.release_scope();
        runner.release_scope();
        assert!(scope.is_cancelled());
        assert!(!runner.is_active());
        assert!(!runner.release(&scope));
    }

    #[test]
    fn announcement_runs_before_scope_is_visible() {
        let runner = OperationRunner::new();
        let first = runner.acquire_scope();
        let mut announced = None;
        let second = runner.acquire_scope_with(|scope| {
            assert!(!first.is_cancelled());
            announced = Some(scope.id());
        });
        assert_eq!(announced, Some(second.id()));
        assert!(first.is_cancelled());
        assert_eq!(runner.current_id(), Some(second.id()));
    }
}
