//! Performance report logged once the initial page load has settled.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::preloader::Preloader;
use crate::registry::PreloadPerformanceSummary;

/// Format a summary as the lines of the performance report
pub fn report_lines(summary: &PreloadPerformanceSummary) -> Vec<String> {
    vec![
        format!("Total resources: {}", summary.total),
        format!("Completed: {}", summary.completed),
        format!("Success rate: {:.1}%", summary.success_rate * 100.0),
        format!("Average load time: {:.2}ms", summary.average_load_time_ms),
        format!("Preloaded resources: {}", summary.preloaded_resources),
        format!("Preinitialized resources: {}", summary.preinitialized_resources),
        format!("Prefetched domains: {}", summary.prefetched_domains),
        format!("Preconnected domains: {}", summary.preconnected_domains),
    ]
}

/// Log the report at info level
pub fn log_report(summary: &PreloadPerformanceSummary) {
    log::info!("Resource preloading performance");
    for line in report_lines(summary) {
        log::info!("  {}", line);
    }
}

/// Log the report after the configured delay.
///
/// Returns `None` when performance monitoring is disabled. Dropping the handle
/// does not cancel the report; abort it to do so.
pub fn schedule_report(preloader: &Preloader) -> Option<JoinHandle<PreloadPerformanceSummary>> {
    let config = preloader.config();
    if !config.enable_performance_monitoring {
        return None;
    }

    let delay = Duration::from_millis(config.report_delay_ms);
    let preloader = preloader.clone();
    Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let summary = preloader.summary();
        log_report(&summary);
        summary
    }))
}
