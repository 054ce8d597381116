//! Progress observers.
//!
//! Runners receive an `Arc<dyn ProgressReporter>` and call it as work settles.
//! There is no global observer; each run gets the reporter it was built with.

use crate::load::AggregateResult;
#[cfg(feature = "console")]
use crate::logging::Verbosity;
use crate::scenario::ScenarioMetrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[cfg(feature = "console")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "console")]
use std::sync::Mutex;

/// Receives progress and completion events
pub trait ProgressReporter: Send + Sync {
    /// `completed` of `total` units of `scenario` have settled
    fn on_progress(&self, completed: usize, total: usize, scenario: &str);

    /// A scenario run finished
    fn on_scenario_complete(&self, _metrics: &ScenarioMetrics) {}

    /// A simulated-user run finished
    fn on_load_complete(&self, _result: &AggregateResult) {}
}

/// Ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn on_progress(&self, _completed: usize, _total: usize, _scenario: &str) {}
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn on_progress(&self, completed: usize, total: usize, scenario: &str) {
        tracing::debug!(scenario, completed, total, "progress");
    }

    fn on_scenario_complete(&self, metrics: &ScenarioMetrics) {
        tracing::info!(
            scenario = %metrics.scenario_name,
            total_requests = metrics.total_requests,
            success_rate = metrics.success_rate,
            efficiency = metrics.efficiency,
            "scenario complete"
        );
    }

    fn on_load_complete(&self, result: &AggregateResult) {
        tracing::info!(
            scenario = %result.scenario_name,
            users = result.concurrent_users,
            total_requests = result.total_requests,
            success_rate = result.success_rate,
            "load test complete"
        );
    }
}

/// Terminal progress bar
#[cfg(feature = "console")]
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    bar: Mutex<Option<(String, ProgressBar)>>,
    quiet: bool,
}

#[cfg(feature = "console")]
impl ConsoleProgress {
    /// Create a reporter drawing to stderr
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reporter that draws nothing
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            bar: Mutex::new(None),
            quiet: true,
        }
    }

    /// Draw unless `verbosity` is quiet
    #[must_use]
    pub fn for_verbosity(verbosity: Verbosity) -> Self {
        if verbosity.is_quiet() {
            Self::quiet()
        } else {
            Self::new()
        }
    }

    fn new_bar(&self, total: usize, scenario: &str) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(scenario.to_string());
        pb
    }

    fn finish(&self, message: String) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some((_, pb)) = guard.take() {
                pb.finish_with_message(message);
            }
        }
    }
}

#[cfg(feature = "console")]
impl ProgressReporter for ConsoleProgress {
    fn on_progress(&self, completed: usize, total: usize, scenario: &str) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        let stale = guard.as_ref().map_or(true, |(name, _)| name != scenario);
        if stale {
            if let Some((_, old)) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some((scenario.to_string(), self.new_bar(total, scenario)));
        }
        if let Some((_, pb)) = guard.as_ref() {
            pb.set_length(total as u64);
            pb.set_position(completed as u64);
        }
    }

    fn on_scenario_complete(&self, metrics: &ScenarioMetrics) {
        self.finish(format!(
            "{}: {:.1}% ok, efficiency {:.1}%",
            metrics.scenario_name,
            metrics.success_rate * 100.0,
            metrics.efficiency
        ));
    }

    fn on_load_complete(&self, result: &AggregateResult) {
        self.finish(format!(
            "{}: {} users, {:.1}% ok",
            result.scenario_name,
            result.concurrent_users,
            result.success_rate * 100.0
        ));
    }
}

/// Shared running counter for one run
pub(crate) struct ProgressTracker {
    completed: AtomicUsize,
    total: usize,
    scenario: String,
    reporter: Arc<dyn ProgressReporter>,
}

impl ProgressTracker {
    pub(crate) fn new(total: usize, scenario: &str, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
            scenario: scenario.to_string(),
            reporter,
        }
    }

    /// Count one settled unit and notify
    pub(crate) fn advance(&self) -> usize {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.reporter
            .on_progress(completed, self.total, &self.scenario);
        completed
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<(usize, usize, String)>>,
    }

    impl ProgressReporter for Recorder {
        fn on_progress(&self, completed: usize, total: usize, scenario: &str) {
            self.events
                .lock()
                .unwrap()
                .push((completed, total, scenario.to_string()));
        }
    }

    #[test]
    fn test_tracker_counts_up() {
        let recorder = Arc::new(Recorder::default());
        let tracker = ProgressTracker::new(3, "wait", recorder.clone());
        assert_eq!(tracker.advance(), 1);
        assert_eq!(tracker.advance(), 2);
        assert_eq!(tracker.completed(), 2);
        let events = recorder.events.lock().unwrap();
        assert_eq!(events[1], (2, 3, "wait".to_string()));
    }

    #[test]
    fn test_tracker_from_many_threads() {
        let tracker = Arc::new(ProgressTracker::new(64, "threads", Arc::new(NoopProgress)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..8 {
                        tracker.advance();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.completed(), 64);
    }

    #[cfg(feature = "console")]
    #[test]
    fn test_quiet_console_switches_scenarios() {
        let console = ConsoleProgress::quiet();
        console.on_progress(1, 4, "first");
        console.on_progress(1, 2, "second");
        let guard = console.bar.lock().unwrap();
        let (name, pb) = guard.as_ref().unwrap();
        assert_eq!(name, "second");
        assert_eq!(pb.length(), Some(2));
        assert_eq!(pb.position(), 1);
    }

    #[cfg(feature = "console")]
    #[test]
    fn test_console_follows_verbosity() {
        assert!(ConsoleProgress::for_verbosity(Verbosity::Quiet).quiet);
        assert!(!ConsoleProgress::for_verbosity(Verbosity::Normal).quiet);
        assert!(!ConsoleProgress::for_verbosity(Verbosity::Debug).quiet);
    }

    #[test]
    fn test_tracing_progress_does_not_panic() {
        TracingProgress.on_progress(1, 2, "quiet");
        NoopProgress.on_progress(1, 2, "quiet");
    }
}
