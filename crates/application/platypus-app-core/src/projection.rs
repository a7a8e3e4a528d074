//! Background progress reports turned into UI-thread state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use platypus_core::{
    format_elapsed, ProgressSnapshot, PropertyKey, PropertyNotifier, SubscriptionId,
};
use tokio::task::JoinHandle;

use crate::runner::OperationId;

/// Where a [`ProgressReporter`] and an [`ElapsedTicker`] deliver their output.
/// Returns `false` once nobody is listening any more.
pub trait ProgressSink: Send + Sync + 'static {
    fn post_progress(&self, operation: OperationId, snapshot: ProgressSnapshot) -> bool;
    fn post_elapsed(&self, operation: OperationId, elapsed: Duration) -> bool;
}

struct NullSink;

impl ProgressSink for NullSink {
    fn post_progress(&self, _operation: OperationId, _snapshot: ProgressSnapshot) -> bool {
        false
    }

    fn post_elapsed(&self, _operation: OperationId, _elapsed: Duration) -> bool {
        false
    }
}

/// Handed to background work. Knows nothing about threads or formatting.
#[derive(Clone)]
pub struct ProgressReporter {
    operation: OperationId,
    started: Instant,
    sink: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("operation", &self.operation)
            .field("started", &self.started)
            .finish()
    }
}

impl ProgressReporter {
    pub fn new(operation: OperationId, started: Instant, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            operation,
            started,
            sink,
        }
    }

    /// A reporter that drops everything, for running work with no UI attached.
    pub fn detached() -> Self {
        Self::new(OperationId::nil(), Instant::now(), Arc::new(NullSink))
    }

    pub fn operation(&self) -> OperationId {
        self.operation
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `total == 0` reports indeterminate progress.
    pub fn report(&self, items_processed: u64, total: u64, message: Option<&str>) {
        let snapshot = ProgressSnapshot::from_counts(
            items_processed,
            total,
            message.map(str::to_owned),
            self.elapsed(),
        );
        self.sink.post_progress(self.operation, snapshot);
    }

    /// For work that computes its own percentage. Clamped to `[0, 100]`.
    pub fn report_percent(&self, percentage: f64, message: Option<&str>) {
        let snapshot =
            ProgressSnapshot::from_percentage(percentage, message.map(str::to_owned), self.elapsed());
        self.sink.post_progress(self.operation, snapshot);
    }
}

/// Posts elapsed time at a fixed period while an operation runs.
pub struct ElapsedTicker {
    started: Instant,
    task: Option<JoinHandle<()>>,
    frozen: Option<Duration>,
}

impl ElapsedTicker {
    /// Must be called from within a tokio runtime.
    pub fn start(
        operation: OperationId,
        started: Instant,
        sink: Arc<dyn ProgressSink>,
        period: Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if !sink.post_elapsed(operation, started.elapsed()) {
                    break;
                }
            }
        });
        Self {
            started,
            task: Some(task),
            frozen: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.frozen.unwrap_or_else(|| self.started.elapsed())
    }

    /// Stops ticking and returns the final elapsed value. Later calls return
    /// the same value.
    pub fn stop(&mut self) -> Duration {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        *self.frozen.get_or_insert_with(|| self.started.elapsed())
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressProperty {
    Percentage,
    IsIndeterminate,
    ItemsProcessed,
    TotalItems,
    Message,
    Elapsed,
}

impl PropertyKey for ProgressProperty {}

/// Observable progress state of a tool panel. Lives on the UI thread.
#[derive(Debug)]
pub struct ProgressProjection {
    notifier: PropertyNotifier<ProgressProperty>,
    percentage: Option<f64>,
    is_indeterminate: bool,
    items_processed: u64,
    total_items: u64,
    message: Option<String>,
    elapsed_text: String,
}

impl Default for ProgressProjection {
    fn default() -> Self {
        Self {
            notifier: PropertyNotifier::new(),
            percentage: None,
            is_indeterminate: false,
            items_processed: 0,
            total_items: 0,
            message: None,
            elapsed_text: format_elapsed(Duration::ZERO),
        }
    }
}

impl ProgressProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        observer: impl FnMut(ProgressProperty) + Send + 'static,
    ) -> SubscriptionId {
        self.notifier.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn percentage(&self) -> Option<f64> {
        self.percentage
    }

    pub fn is_indeterminate(&self) -> bool {
        self.is_indeterminate
    }

    pub fn items_processed(&self) -> u64 {
        self.items_processed
    }

    pub fn total_items(&self) -> u64 {
        self.total_items
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn elapsed_text(&self) -> &str {
        &self.elapsed_text
    }

    pub fn apply(&mut self, snapshot: ProgressSnapshot) {
        let n = &mut self.notifier;
        n.set_field(
            &mut self.percentage,
            snapshot.percentage,
            ProgressProperty::Percentage,
        );
        n.set_field(
            &mut self.is_indeterminate,
            snapshot.is_indeterminate(),
            ProgressProperty::IsIndeterminate,
        );
        n.set_field(
            &mut self.items_processed,
            snapshot.items_processed,
            ProgressProperty::ItemsProcessed,
        );
        n.set_field(
            &mut self.total_items,
            snapshot.total_items,
            ProgressProperty::TotalItems,
        );
        if snapshot.message.is_some() {
            n.set_field(&mut self.message, snapshot.message, ProgressProperty::Message);
        }
        self.apply_elapsed(snapshot.elapsed);
    }

    pub fn apply_elapsed(&mut self, elapsed: Duration) {
        self.notifier.set_field(
            &mut self.elapsed_text,
            format_elapsed(elapsed),
            ProgressProperty::Elapsed,
        );
    }

    /// Clears values for a new operation. Observers stay subscribed.
    pub fn reset(&mut self, indeterminate: bool) {
        let n = &mut self.notifier;
        n.set_field(&mut self.percentage, None, ProgressProperty::Percentage);
        n.set_field(
            &mut self.is_indeterminate,
            indeterminate,
            ProgressProperty::IsIndeterminate,
        );
        n.set_field(&mut self.items_processed, 0, ProgressProperty::ItemsProcessed);
        n.set_field(&mut self.total_items, 0, ProgressProperty::TotalItems);
        n.set_field(&mut self.message, None, ProgressProperty::Message);
        self.apply_elapsed(Duration::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn unchanged_fields_do_not_renotify() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut projection = ProgressProjection::new();
        let sink = seen.clone();
        projection.subscribe(move |p| sink.lock().unwrap().push(p));

        let snap = ProgressSnapshot::from_counts(1, 4, Some("Hashing".into()), Duration::ZERO);
        projection.apply(snap.clone());
        let first = seen.lock().unwrap().len();
        projection.apply(snap);

        assert_eq!(seen.lock().unwrap().len(), first);
        assert_eq!(projection.percentage(), Some(25.0));
        assert_eq!(projection.message(), Some("Hashing"));
    }

    #[test]
    fn message_survives_reports_without_one() {
        let mut projection = ProgressProjection::new();
        projection.apply(ProgressSnapshot::from_counts(
            1,
            0,
            Some("Enumerating".into()),
            Duration::ZERO,
        ));
        projection.apply(ProgressSnapshot::from_counts(2, 0, None, Duration::ZERO));
        assert!(projection.is_indeterminate());
        assert_eq!(projection.percentage(), None);
        assert_eq!(projection.message(), Some("Enumerating"));
    }

    #[test]
    fn detached_reporter_swallows_reports() {
        let reporter = ProgressReporter::detached();
        reporter.report(1, 2, Some("nobody listens"));
        reporter.report_percent(50.0, None);
    }

    #[tokio::test]
    async fn ticker_freezes_on_stop() {
        let mut ticker = ElapsedTicker::start(
            OperationId::nil(),
            Instant::now(),
            Arc::new(NullSink),
            Duration::from_secs(1),
        );
        let frozen = ticker.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticker.stop(), frozen);
        assert_eq!(ticker.elapsed(), frozen);
    }
}
