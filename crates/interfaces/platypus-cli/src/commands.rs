use std::sync::Arc;

use anyhow::{Context, Result};
use platypus_app_core::async_runtime::runtime;
use platypus_app_core::{
    DuplicateFinderVm, DuplicateScanPort, FsDuplicateScanner, LocationProvider,
    TracingStatusReporter, UserDirsLocations,
};
use platypus_core::{InitState, OperationStatus};
use platypus_scanner::DuplicateReport;
use tracing::{debug, warn};

use crate::render::{format_report, ProgressView};
use crate::{DupesArgs, EXIT_CANCELLED, EXIT_FAILURE};

#[derive(Debug)]
pub enum DupesOutcome {
    Completed(DuplicateReport),
    Cancelled,
    Failed(String),
}

impl DupesOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            DupesOutcome::Completed(_) => 0,
            DupesOutcome::Cancelled => EXIT_CANCELLED,
            DupesOutcome::Failed(_) => EXIT_FAILURE,
        }
    }
}

/// Runs a duplicate scan with the calling thread acting as the UI thread:
/// it pumps the view model and renders progress until the scan ends.
pub fn run_dupes(
    args: &DupesArgs,
    scanner: Arc<dyn DuplicateScanPort>,
    view: &mut ProgressView,
) -> Result<DupesOutcome> {
    let mut vm = DuplicateFinderVm::new(
        scanner,
        Arc::new(UserDirsLocations),
        Arc::new(TracingStatusReporter),
    );
    vm.set_options(Some(args.scan_options()));

    let rt = runtime()?;
    let cancel = vm.cancel_command().clone();
    let ctrl_c = rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling scan");
            if let Err(e) = cancel.execute(()) {
                warn!("Cancel failed: {e:#}");
            }
        }
    });

    let interval = platypus_config::clamp_pump_interval(args.pump_ms);
    let handle = vm.start_scan()?;
    while !handle.is_finished() {
        vm.wait_and_pump(interval);
        view.render(vm.panel().progress());
    }
    // Finished is queued before the task completes.
    vm.pump();
    ctrl_c.abort();
    view.finish(vm.panel().status());

    if let Err(e) = rt.block_on(handle).context("Scan task panicked")? {
        debug!("Scan command returned an error: {e:#}");
    }

    Ok(match vm.panel().last_outcome() {
        Some(OperationStatus::Completed) => {
            DupesOutcome::Completed(vm.report().cloned().unwrap_or_default())
        }
        Some(OperationStatus::Cancelled) => DupesOutcome::Cancelled,
        Some(OperationStatus::Faulted { message }) => DupesOutcome::Failed(message.clone()),
        None => DupesOutcome::Failed("Scan did not start".to_string()),
    })
}

pub fn cmd_dupes(args: DupesArgs) -> Result<u8> {
    if !args.json {
        println!(":: Scanning {} for duplicates", args.path);
    }
    let mut view = if args.json {
        ProgressView::hidden()
    } else {
        ProgressView::new()
    };

    let outcome = run_dupes(&args, Arc::new(FsDuplicateScanner), &mut view)?;
    match &outcome {
        DupesOutcome::Completed(report) if args.json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        DupesOutcome::Completed(report) => print!("{}", format_report(report)),
        DupesOutcome::Cancelled => eprintln!(":: Scan cancelled"),
        DupesOutcome::Failed(message) => eprintln!(":: Scan failed: {message}"),
    }
    Ok(outcome.exit_code())
}

/// Lists the folders offered as scan roots, after filtering out missing ones.
pub fn cmd_locations(locations: Arc<dyn LocationProvider>) -> Result<Vec<camino::Utf8PathBuf>> {
    let mut vm = DuplicateFinderVm::new(
        Arc::new(FsDuplicateScanner),
        locations,
        Arc::new(TracingStatusReporter),
    );
    let state = runtime()?
        .block_on(vm.on_shown()?)
        .context("Location lookup panicked")?;
    if state != InitState::Completed {
        anyhow::bail!("Could not determine scan locations");
    }
    vm.pump();
    Ok(vm.suggested_roots().to_vec())
}
