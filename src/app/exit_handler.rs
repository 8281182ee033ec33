//! Exit code logic for the harvester process.
//!
//! Single responsibility: map run counts to the process exit outcome.

use harvester_core::RunSummary;

use crate::ProcessExit;

/// Determines the process exit outcome from succeeded and failed item counts.
pub(crate) fn determine_exit_outcome(succeeded: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// Determines the exit outcome of a finished run; an interrupt is always partial.
pub(crate) fn exit_outcome_for(summary: &RunSummary) -> ProcessExit {
    if summary.interrupted {
        ProcessExit::Partial
    } else {
        determine_exit_outcome(summary.succeeded, summary.failed)
    }
}
