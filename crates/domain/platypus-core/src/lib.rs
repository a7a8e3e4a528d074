use serde::{Deserialize, Serialize};

pub mod observable;
pub mod progress;

pub use observable::{Property, PropertyKey, PropertyNotifier, SubscriptionId};
pub use progress::{format_elapsed, percentage_of, ProgressSnapshot};

/// Lifecycle of a deferred, run-once initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InitState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl InitState {
    pub const fn as_u8(self) -> u8 {
        match self {
            InitState::NotStarted => 0,
            InitState::InProgress => 1,
            InitState::Completed => 2,
        }
    }

    /// Unknown encodings decode as `NotStarted`, which only ever causes a retry.
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => InitState::InProgress,
            2 => InitState::Completed,
            _ => InitState::NotStarted,
        }
    }
}

/// Terminal state of one operation, without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Completed,
    Cancelled,
    Faulted { message: String },
}

impl OperationStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, OperationStatus::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationStatus::Cancelled)
    }
}

/// Result of running work inside a cancellation scope.
#[derive(Debug)]
pub enum OperationOutcome<T> {
    Completed(T),
    Cancelled,
    Faulted(anyhow::Error),
}

impl<T> OperationOutcome<T> {
    pub fn status(&self) -> OperationStatus {
        match self {
            OperationOutcome::Completed(_) => OperationStatus::Completed,
            OperationOutcome::Cancelled => OperationStatus::Cancelled,
            OperationOutcome::Faulted(e) => OperationStatus::Faulted {
                message: format!("{e:#}"),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationOutcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            OperationOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }

    /// Cancellation maps to `Ok(None)`; only a fault is an error.
    pub fn into_result(self) -> anyhow::Result<Option<T>> {
        match self {
            OperationOutcome::Completed(v) => Ok(Some(v)),
            OperationOutcome::Cancelled => Ok(None),
            OperationOutcome::Faulted(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_state_round_trips_through_u8() {
        for state in [
            InitState::NotStarted,
            InitState::InProgress,
            InitState::Completed,
        ] {
            assert_eq!(InitState::from_u8(state.as_u8()), state);
        }
        assert_eq!(InitState::from_u8(42), InitState::NotStarted);
    }

    #[test]
    fn faulted_outcome_keeps_error_chain_in_status() {
        let err = anyhow::anyhow!("disk gone").context("hashing failed");
        let outcome: OperationOutcome<()> = OperationOutcome::Faulted(err);
        assert_eq!(
            outcome.status(),
            OperationStatus::Faulted {
                message: "hashing failed: disk gone".into()
            }
        );
    }

    #[test]
    fn cancelled_outcome_is_not_an_error() {
        let outcome: OperationOutcome<u32> = OperationOutcome::Cancelled;
        assert!(outcome.status().is_cancelled());
        assert!(matches!(outcome.into_result(), Ok(None)));
    }
}
