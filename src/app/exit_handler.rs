//! Exit code logic for the image downloader process.
//!
//! Single responsibility: map batch counts to the process exit outcome.

use crate::ProcessExit;

/// Determines the process exit outcome from successful and failed counts.
pub(crate) fn determine_exit_outcome(successful: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if successful > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
