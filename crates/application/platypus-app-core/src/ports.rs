use camino::Utf8PathBuf;
use platypus_scanner::{DuplicateReport, ScanError, ScanOptions, ScanProgress};
use tokio_util::sync::CancellationToken;

/// Application-wide status line, injected into each panel instead of being
/// reached through a global.
pub trait StatusReporter: Send + Sync + 'static {
    fn report_status(&self, source: &str, message: &str);
}

/// Sends status lines to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusReporter;

impl StatusReporter for TracingStatusReporter {
    fn report_status(&self, source: &str, message: &str) {
        tracing::info!(panel = source, "{message}");
    }
}

pub trait DuplicateScanPort: Send + Sync + 'static {
    fn find_duplicates(
        &self,
        options: &ScanOptions,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(ScanProgress) + Send + Sync),
    ) -> Result<DuplicateReport, ScanError>;
}

/// Candidate scan roots offered before the user picks one.
pub trait LocationProvider: Send + Sync + 'static {
    fn candidate_roots(&self) -> anyhow::Result<Vec<Utf8PathBuf>>;
}
