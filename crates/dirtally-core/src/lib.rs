/// DirTally Core — incremental scanning, aggregation and refresh.
///
/// This crate contains all business logic with zero UI dependencies. A
/// frontend reads the shared tree between scan slices and listens to
/// structural events; it never mutates the tree itself.
///
/// # Modules
///
/// - [`model`] — Slot-arena tree of nodes and supporting types.
/// - [`aggregate`] — Upward propagation of sizes, counts and timestamps.
/// - [`scanner`] — Time-sliced resumable scanning, refresh and the background host.
/// - [`events`] — Observer interface and channel-backed event stream.
/// - [`platform`] — Filesystem collaborators (real disk and in-memory).
/// - [`config`] — Scan policy and settings file.
/// - [`analysis`] — Post-scan insights (extensions, largest files).
/// - [`export`] — JSON and CSV reports.
pub mod aggregate;
pub mod analysis;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod model;
pub mod platform;
pub mod scanner;

pub use config::{ScanContext, ScanOptions, Settings};
pub use error::{EnumerationError, TreeError};
pub use model::{DirTree, Node, NodeIndex, NodeKind};
