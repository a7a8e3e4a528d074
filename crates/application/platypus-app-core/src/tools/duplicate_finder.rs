use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use platypus_core::{InitState, OperationStatus, PropertyKey, PropertyNotifier, SubscriptionId};
use platypus_scanner::{DuplicateGroup, DuplicateReport, ScanOptions, ScanPhase, ScanProgress};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::command::{AsyncRelayCommand, Command, Execution, RelayCommand};
use crate::init_gate::{ensure_initialized, spawn_initialize, AsyncInitialize, InitGate};
use crate::panel::{OperationContext, ToolPanel};
use crate::ports::{DuplicateScanPort, LocationProvider, StatusReporter};

pub const PANEL_NAME: &str = "Duplicate Finder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateFinderProperty {
    Options,
    Groups,
    SelectedCount,
    SuggestedRoots,
    Summary,
}

impl PropertyKey for DuplicateFinderProperty {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateFileVm {
    pub path: Utf8PathBuf,
    pub is_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroupVm {
    pub digest: String,
    pub size: u64,
    pub files: Vec<DuplicateFileVm>,
}

impl From<&DuplicateGroup> for DuplicateGroupVm {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            digest: group.digest.clone(),
            size: group.size,
            files: group
                .files
                .iter()
                .map(|path| DuplicateFileVm {
                    path: path.clone(),
                    is_selected: false,
                })
                .collect(),
        }
    }
}

/// Looks up scan roots the first time the view is shown.
struct FinderSetup {
    gate: InitGate,
    locations: Arc<dyn LocationProvider>,
    discovered: Mutex<Vec<Utf8PathBuf>>,
}

#[async_trait]
impl AsyncInitialize for FinderSetup {
    fn init_gate(&self) -> &InitGate {
        &self.gate
    }

    async fn initialize_core(&self) -> anyhow::Result<()> {
        let locations = self.locations.clone();
        let candidates = tokio::task::spawn_blocking(move || locations.candidate_roots()).await??;

        let mut existing = Vec::with_capacity(candidates.len());
        for root in candidates {
            match tokio::fs::metadata(&root).await {
                Ok(meta) if meta.is_dir() => existing.push(root),
                _ => debug!("Skipping missing location {root}"),
            }
        }

        *self
            .discovered
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = existing;
        Ok(())
    }
}

/// Finds files with identical content under a chosen root and lets the user
/// pick which copies to get rid of.
pub struct DuplicateFinderVm {
    panel: ToolPanel<DuplicateReport>,
    notifier: PropertyNotifier<DuplicateFinderProperty>,
    options: Option<ScanOptions>,
    groups: Vec<DuplicateGroupVm>,
    report: Option<DuplicateReport>,
    summary: String,
    suggested_roots: Vec<Utf8PathBuf>,
    setup: Arc<FinderSetup>,
    scan: AsyncRelayCommand<Option<ScanOptions>>,
    cancel: Arc<RelayCommand>,
}

impl DuplicateFinderVm {
    pub fn new(
        scanner: Arc<dyn DuplicateScanPort>,
        locations: Arc<dyn LocationProvider>,
        status: Arc<dyn StatusReporter>,
    ) -> Self {
        Self::with_panel(ToolPanel::new(PANEL_NAME, status), scanner, locations)
    }

    /// Same as [`new`](Self::new) but with a caller-built panel, e.g. one with
    /// a faster elapsed tick.
    pub fn with_panel(
        mut panel: ToolPanel<DuplicateReport>,
        scanner: Arc<dyn DuplicateScanPort>,
        locations: Arc<dyn LocationProvider>,
    ) -> Self {
        let launcher = panel.launcher();
        let scan = AsyncRelayCommand::with_predicate(
            move |options: Option<ScanOptions>| {
                let launcher = launcher.clone();
                let scanner = scanner.clone();
                async move {
                    let Some(options) = options else {
                        return Ok(());
                    };
                    let label = format!("Scanning {}", options.root);
                    let status = launcher
                        .run(&label, move |ctx| scan_in_background(scanner, options, ctx))
                        .await;
                    if let OperationStatus::Faulted { message } = status {
                        anyhow::bail!(message);
                    }
                    Ok(())
                }
            },
            Option::is_some,
        );
        scan.raise_can_execute_changed(&None);

        let runner = panel.runner().clone();
        let probe = runner.clone();
        let cancel = Arc::new(RelayCommand::with_predicate(
            move |()| {
                runner.cancel_current();
                Ok(())
            },
            move |_| probe.is_active(),
        ));
        cancel.raise_can_execute_changed(&());

        let hook = cancel.clone();
        panel.on_state_changed(move || hook.raise_can_execute_changed(&()));

        Self {
            panel,
            notifier: PropertyNotifier::new(),
            options: None,
            groups: Vec::new(),
            report: None,
            summary: String::new(),
            suggested_roots: Vec::new(),
            setup: Arc::new(FinderSetup {
                gate: InitGate::new(),
                locations,
                discovered: Mutex::new(Vec::new()),
            }),
            scan,
            cancel,
        }
    }

    pub fn panel(&self) -> &ToolPanel<DuplicateReport> {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut ToolPanel<DuplicateReport> {
        &mut self.panel
    }

    pub fn subscribe(
        &mut self,
        observer: impl FnMut(DuplicateFinderProperty) + Send + 'static,
    ) -> SubscriptionId {
        self.notifier.subscribe(observer)
    }

    pub fn options(&self) -> Option<&ScanOptions> {
        self.options.as_ref()
    }

    pub fn set_options(&mut self, options: Option<ScanOptions>) -> bool {
        let changed =
            self.notifier
                .set_field(&mut self.options, options, DuplicateFinderProperty::Options);
        if changed {
            self.scan.raise_can_execute_changed(&self.options);
        }
        changed
    }

    /// Keeps the current recursion and extension settings.
    pub fn set_root(&mut self, root: impl Into<Utf8PathBuf>) -> bool {
        let root = root.into();
        let next = match self.options.clone() {
            Some(mut options) => {
                options.root = root;
                options
            }
            None => ScanOptions::new(root),
        };
        self.set_options(Some(next))
    }

    /// No-op until a root has been chosen.
    pub fn set_recursive(&mut self, recursive: bool) -> bool {
        let Some(mut next) = self.options.clone() else {
            return false;
        };
        next.recursive = recursive;
        self.set_options(Some(next))
    }

    pub fn add_extension(&mut self, ext: &str) -> bool {
        let Some(options) = self.options.clone() else {
            return false;
        };
        self.set_options(Some(options.with_extension(ext)))
    }

    pub fn can_scan(&self) -> bool {
        self.scan.can_execute(&self.options)
    }

    pub fn scan_command(&self) -> &AsyncRelayCommand<Option<ScanOptions>> {
        &self.scan
    }

    /// Shared so hosts can trigger cancellation from outside the UI thread.
    pub fn cancel_command(&self) -> &Arc<RelayCommand> {
        &self.cancel
    }

    /// Starts a scan on the shared runtime. Results arrive through
    /// [`pump`](Self::pump).
    pub fn start_scan(&self) -> anyhow::Result<JoinHandle<anyhow::Result<Execution>>> {
        self.scan.spawn(self.options.clone())
    }

    /// Runs a scan to completion on the caller's runtime.
    pub async fn scan(&self) -> anyhow::Result<Execution> {
        self.scan.execute(self.options.clone()).await
    }

    pub fn cancel_scan(&self) -> anyhow::Result<Execution> {
        self.cancel.execute(())
    }

    /// Kicks off location discovery without blocking the UI thread.
    pub fn on_shown(&self) -> anyhow::Result<JoinHandle<InitState>> {
        spawn_initialize(self.setup.clone())
    }

    pub async fn initialize(&self) -> InitState {
        ensure_initialized(self.setup.as_ref()).await
    }

    pub fn initialization_state(&self) -> InitState {
        self.setup.gate.state()
    }

    /// Discards discovered locations and looks them up again.
    pub fn refresh_locations(&self) -> anyhow::Result<JoinHandle<InitState>> {
        self.setup.gate.reset();
        self.on_shown()
    }

    pub fn suggested_roots(&self) -> &[Utf8PathBuf] {
        &self.suggested_roots
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn groups(&self) -> &[DuplicateGroupVm] {
        &self.groups
    }

    pub fn report(&self) -> Option<&DuplicateReport> {
        self.report.as_ref()
    }

    pub fn selected_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| &g.files)
            .filter(|f| f.is_selected)
            .count()
    }

    pub fn selected_paths(&self) -> Vec<Utf8PathBuf> {
        self.groups
            .iter()
            .flat_map(|g| &g.files)
            .filter(|f| f.is_selected)
            .map(|f| f.path.clone())
            .collect()
    }

    /// Returns `false` when the indices are out of range or nothing changed.
    pub fn set_selected(&mut self, group: usize, file: usize, selected: bool) -> bool {
        let Some(entry) = self
            .groups
            .get_mut(group)
            .and_then(|g| g.files.get_mut(file))
        else {
            return false;
        };
        if entry.is_selected == selected {
            return false;
        }
        entry.is_selected = selected;
        self.notifier
            .raise_property_changed(DuplicateFinderProperty::SelectedCount);
        true
    }

    /// Marks every copy except the first of each group.
    pub fn select_all_but_first(&mut self) {
        for group in &mut self.groups {
            for (i, file) in group.files.iter_mut().enumerate() {
                file.is_selected = i > 0;
            }
        }
        self.notifier
            .raise_property_changed(DuplicateFinderProperty::SelectedCount);
    }

    pub fn clear_selection(&mut self) {
        for file in self.groups.iter_mut().flat_map(|g| g.files.iter_mut()) {
            file.is_selected = false;
        }
        self.notifier
            .raise_property_changed(DuplicateFinderProperty::SelectedCount);
    }

    /// Applies queued background updates. Returns `true` if a scan finished
    /// with a report during this pump.
    pub fn pump(&mut self) -> bool {
        let finished = self.panel.pump();
        self.after_pump(finished)
    }

    pub fn wait_and_pump(&mut self, timeout: Duration) -> bool {
        let finished = self.panel.wait_and_pump(timeout);
        self.after_pump(finished)
    }

    fn after_pump(&mut self, finished: Option<DuplicateReport>) -> bool {
        self.sync_suggestions();
        match finished {
            Some(report) => {
                self.apply_report(report);
                true
            }
            None => false,
        }
    }

    fn sync_suggestions(&mut self) {
        if !self.setup.gate.is_initialized() {
            return;
        }
        let discovered = self
            .setup
            .discovered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.notifier.set_field(
            &mut self.suggested_roots,
            discovered,
            DuplicateFinderProperty::SuggestedRoots,
        );
    }

    fn apply_report(&mut self, report: DuplicateReport) {
        self.groups = report.groups.iter().map(DuplicateGroupVm::from).collect();
        self.notifier
            .raise_property_changed(DuplicateFinderProperty::Groups);
        self.notifier
            .raise_property_changed(DuplicateFinderProperty::SelectedCount);

        let summary = if report.groups.is_empty() {
            format!("No duplicates among {} files", report.files_scanned)
        } else {
            format!(
                "{} duplicate groups among {} files, {} bytes reclaimable",
                report.groups.len(),
                report.files_scanned,
                report.wasted_bytes()
            )
        };
        self.notifier
            .set_field(&mut self.summary, summary, DuplicateFinderProperty::Summary);
        self.report = Some(report);
    }
}

async fn scan_in_background(
    scanner: Arc<dyn DuplicateScanPort>,
    options: ScanOptions,
    ctx: OperationContext,
) -> anyhow::Result<DuplicateReport> {
    let token = ctx.token().clone();
    let reporter = ctx.reporter().clone();
    let report = tokio::task::spawn_blocking(move || {
        scanner.find_duplicates(&options, &token, &|p: ScanProgress| {
            let message = match p.phase {
                ScanPhase::Enumerating => "Enumerating files",
                ScanPhase::Hashing => "Hashing candidates",
            };
            reporter.report(p.done, p.total, Some(message));
        })
    })
    .await??;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::TracingStatusReporter;
    use platypus_scanner::ScanError;
    use tokio_util::sync::CancellationToken;

    struct NoScanner;
    impl DuplicateScanPort for NoScanner {
        fn find_duplicates(
            &self,
            _options: &ScanOptions,
            _cancel: &CancellationToken,
            _on_progress: &(dyn Fn(ScanProgress) + Send + Sync),
        ) -> Result<DuplicateReport, ScanError> {
            Ok(DuplicateReport::default())
        }
    }

    struct NoLocations;
    impl LocationProvider for NoLocations {
        fn candidate_roots(&self) -> anyhow::Result<Vec<Utf8PathBuf>> {
            Ok(Vec::new())
        }
    }

    fn vm() -> DuplicateFinderVm {
        DuplicateFinderVm::new(
            Arc::new(NoScanner),
            Arc::new(NoLocations),
            Arc::new(TracingStatusReporter),
        )
    }

    #[test]
    fn scan_needs_a_root() {
        let mut vm = vm();
        assert!(!vm.can_scan());
        assert!(!vm.scan_command().is_enabled());
        assert!(!vm.set_recursive(false));

        assert!(vm.set_root("/music"));
        assert!(vm.can_scan());
        assert!(vm.scan_command().is_enabled());
        assert!(!vm.cancel_command().is_enabled());
    }

    #[test]
    fn root_change_keeps_filters() {
        let mut vm = vm();
        vm.set_root("/a");
        vm.set_recursive(false);
        vm.add_extension("MP3");
        vm.set_root("/b");

        let options = vm.options().unwrap();
        assert_eq!(options.root, Utf8PathBuf::from("/b"));
        assert!(!options.recursive);
        assert!(options.extensions.contains("mp3"));
    }

    #[test]
    fn selection_on_empty_results_is_rejected() {
        let mut vm = vm();
        assert!(!vm.set_selected(0, 0, true));
        assert_eq!(vm.selected_count(), 0);
    }
}
