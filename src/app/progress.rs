//! Progress UI (spinner) for pipeline runs.
//!
//! Discovery is streamed, so the total is unknown up front; the spinner
//! shows running counts fed from each recorded outcome.

use std::time::Duration;

use harvester_core::Outcome;
use indicatif::{ProgressBar, ProgressStyle};

pub(crate) struct RunProgress {
    spinner: Option<ProgressBar>,
    succeeded: usize,
    failed: usize,
}

impl RunProgress {
    /// Creates the spinner when `enabled`; otherwise only counts.
    pub(crate) fn new(enabled: bool, mode: &str) -> Self {
        let spinner = enabled.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner.set_message(format!("{mode}: discovering..."));
            spinner
        });
        Self {
            spinner,
            succeeded: 0,
            failed: 0,
        }
    }

    pub(crate) fn observe(&mut self, outcome: &Outcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if let Some(spinner) = &self.spinner {
            spinner.set_message(format!(
                "[{} done, {} failed] {}",
                self.succeeded,
                self.failed,
                outcome.id()
            ));
        }
    }

    pub(crate) fn finish(&self) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, usize) {
        (self.succeeded, self.failed)
    }
}
