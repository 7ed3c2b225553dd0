/// Scan progress reporting — lightweight messages sent from the scan
/// thread to the host via crossbeam channels.
use super::refresh::RefreshOutcome;
use crate::config::ScanOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Commands sent from the host to the scan thread.
#[derive(Debug, Clone)]
pub enum ScanCommand {
    /// Rescan the deepest node whose path is a prefix of this one.
    Refresh(PathBuf),
    /// Switch policy; synthetic items are created or removed to match.
    SetOptions(ScanOptions),
    /// Stop the scan thread.
    Cancel,
}

/// Progress updates sent from the scan thread.
///
/// The tree itself lives in the shared `LiveTree`; these messages carry
/// only counters and status.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanProgress {
    /// Running totals of the root, sent after every slice.
    Update {
        files_found: u64,
        dirs_found: u64,
        total_size: u64,
        pending_read_jobs: u64,
        /// Progress in the unit of `range`.
        position: u64,
        /// Expected final `position`, when it can be known up front.
        range: Option<u64>,
        /// Tree events lost so far because the event channel was full.
        dropped_events: u64,
    },
    /// A refresh command finished.
    Refreshed {
        path: PathBuf,
        outcome: RefreshOutcome,
    },
    /// A non-fatal error (e.g. a directory that could not be listed).
    Error { path: String, message: String },
    /// The root is done. Sent again after every refresh that completes.
    Complete { duration: Duration, error_count: u64 },
    /// The scanned root vanished from disk; the tree is now empty.
    RootUnlinked,
    /// The scan thread stopped on request.
    Cancelled,
}

impl ScanProgress {
    /// Fraction of the expected work done, if the range is known.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::Update {
                position,
                range: Some(range),
                ..
            } if *range > 0 => Some((*position as f64 / *range as f64).min(1.0)),
            _ => None,
        }
    }
}
