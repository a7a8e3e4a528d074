use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Point-in-time progress of one operation.
///
/// `percentage` is `None` when the total is unknown; consumers render an
/// indeterminate indicator instead of a bar in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub items_processed: u64,
    /// 0 means indeterminate, or that the operation reported a percentage directly.
    pub total_items: u64,
    pub message: Option<String>,
    pub elapsed: Duration,
    pub percentage: Option<f64>,
}

impl ProgressSnapshot {
    pub fn from_counts(
        items_processed: u64,
        total_items: u64,
        message: Option<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            items_processed,
            total_items,
            message,
            elapsed,
            percentage: percentage_of(items_processed, total_items),
        }
    }

    pub fn from_percentage(percentage: f64, message: Option<String>, elapsed: Duration) -> Self {
        Self {
            items_processed: 0,
            total_items: 0,
            message,
            elapsed,
            percentage: Some(clamp_percentage(percentage)),
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.percentage.is_none()
    }
}

/// `items / total * 100` clamped to `[0, 100]`, or `None` when `total` is 0.
pub fn percentage_of(items: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(clamp_percentage(items as f64 / total as f64 * 100.0))
}

fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// `mm:ss`, or `hh:mm:ss` once the hour boundary is crossed.
pub fn format_elapsed(elapsed: Duration) -> String {
    let mut secs = elapsed.as_secs();
    let hours = secs / 3600;
    secs %= 3600;
    let minutes = secs / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_percentage_is_clamped() {
        let low = ProgressSnapshot::from_percentage(-5.0, None, Duration::ZERO);
        let high = ProgressSnapshot::from_percentage(140.0, None, Duration::ZERO);
        let nan = ProgressSnapshot::from_percentage(f64::NAN, None, Duration::ZERO);
        assert_eq!(low.percentage, Some(0.0));
        assert_eq!(high.percentage, Some(100.0));
        assert_eq!(nan.percentage, Some(0.0));
        assert!(!high.is_indeterminate());
    }

    #[test]
    fn elapsed_switches_to_hours_at_boundary() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(Duration::from_millis(61_900)), "01:01");
        assert_eq!(format_elapsed(Duration::from_secs(3599)), "59:59");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "01:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(36_061)), "10:01:01");
    }
}
