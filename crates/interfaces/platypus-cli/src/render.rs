use std::fmt::Write as _;
use std::time::Duration;

use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use platypus_app_core::ProgressProjection;
use platypus_scanner::DuplicateReport;

/// Terminal rendering of a panel's progress projection.
pub struct ProgressView {
    bar: ProgressBar,
    determinate: Option<bool>,
}

impl ProgressView {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self::with_bar(bar)
    }

    /// Draws nothing; used for `--json` and in tests.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            determinate: None,
        }
    }

    pub fn render(&mut self, progress: &ProgressProjection) {
        let determinate = !progress.is_indeterminate();
        if self.determinate != Some(determinate) {
            self.bar.set_style(if determinate { bar_style() } else { spinner_style() });
            self.determinate = Some(determinate);
        }
        if let Some(pct) = progress.percentage() {
            self.bar.set_position(pct.round() as u64);
        }
        let message = match progress.message() {
            Some(m) => format!("{m} [{}]", progress.elapsed_text()),
            None => format!("[{}]", progress.elapsed_text()),
        };
        self.bar.set_message(message);
    }

    pub fn finish(&self, line: &str) {
        self.bar.finish_with_message(line.to_string());
    }
}

impl Default for ProgressView {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{bar:40.cyan/blue} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

pub fn format_report(report: &DuplicateReport) -> String {
    let mut out = String::new();
    if report.groups.is_empty() {
        let _ = writeln!(out, ":: No duplicates among {} files", report.files_scanned);
        return out;
    }

    let _ = writeln!(
        out,
        ":: {} duplicate groups among {} files ({} reclaimable)",
        report.groups.len(),
        report.files_scanned,
        format_size(report.wasted_bytes(), DECIMAL)
    );
    for (i, group) in report.groups.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n[{}] {} copies of {} (md5 {})",
            i + 1,
            group.files.len(),
            format_size(group.size, DECIMAL),
            group.digest
        );
        for file in &group.files {
            let _ = writeln!(out, "    {file}");
        }
    }
    if report.files_failed > 0 {
        let _ = writeln!(out, "\n:: {} files could not be read", report.files_failed);
    }
    out
}
