/// Scan policy and host settings.
///
/// The policy flags are read by the engine once per decision; nothing in
/// the core reaches for process-wide state. Callers bundle the policy with
/// the filesystem collaborator into a [`ScanContext`] and pass it down.
use crate::platform::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default length of one scheduler slice in the background host.
pub const DEFAULT_TIME_SLICE_MS: u64 = 50;

/// Boolean policy set consulted while scanning and refreshing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Descend into volumes mounted below the scan root.
    pub follow_mount_points: bool,
    /// Descend into junctions / directory symlinks.
    pub follow_junctions: bool,
    /// Ignore entries carrying the hidden attribute.
    pub skip_hidden: bool,
    /// Give every drive a `<Free Space>` child.
    pub show_free_space: bool,
    /// Give every drive an `<Unknown>` child for unaccounted capacity.
    pub show_unknown: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_mount_points: false,
            follow_junctions: false,
            skip_hidden: false,
            show_free_space: true,
            show_unknown: true,
        }
    }
}

/// Everything the background host needs besides the roots to scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub options: ScanOptions,
    /// Wall-clock length of one `do_some_work` slice.
    pub time_slice_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            options: ScanOptions::default(),
            time_slice_ms: DEFAULT_TIME_SLICE_MS,
        }
    }
}

/// Failure to load a settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Settings {
    /// Load settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    #[inline]
    pub fn time_slice(&self) -> Duration {
        Duration::from_millis(self.time_slice_ms)
    }
}

/// Explicit context handed to every engine, scheduler and refresh call.
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    pub fs: &'a dyn FileSystem,
    pub options: &'a ScanOptions,
}

impl<'a> ScanContext<'a> {
    pub fn new(fs: &'a dyn FileSystem, options: &'a ScanOptions) -> Self {
        Self { fs, options }
    }
}
