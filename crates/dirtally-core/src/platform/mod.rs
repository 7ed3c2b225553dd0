/// Filesystem collaborators consumed by the engine.
///
/// The scheduler and the refresh controller only ever see the
/// [`FileSystem`] trait. [`LocalFs`] talks to the real disk;
/// [`MemoryFs`] is an in-memory stand-in for tests and embedders.
pub mod local;
pub mod memory;
pub mod volume;

pub use local::LocalFs;
pub use memory::MemoryFs;

use crate::error::EnumerationError;
use crate::model::FileAttributes;
use compact_str::CompactString;
use std::path::Path;
use std::time::SystemTime;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryRecord {
    pub name: CompactString,
    pub is_dir: bool,
    pub attributes: FileAttributes,
    /// Bytes the entry occupies. Ignored for directories.
    pub size: u64,
    pub last_write: Option<SystemTime>,
}

/// Capacity of the volume holding a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub total: u64,
    pub free: u64,
}

impl DiskSpace {
    #[inline]
    pub fn used(self) -> u64 {
        self.total.saturating_sub(self.free)
    }
}

/// Lazy listing of one directory.
pub type DirEntries<'a> = Box<dyn Iterator<Item = DirEntryRecord> + 'a>;

pub trait FileSystem: Send + Sync {
    /// Start a fresh listing of `dir`. Each call restarts from the beginning.
    fn read_dir(&self, dir: &Path) -> Result<DirEntries<'_>, EnumerationError>;

    /// Current record for a single path, `None` if it does not exist.
    fn stat(&self, path: &Path) -> Option<DirEntryRecord>;

    /// Total and free bytes of the volume holding `path`.
    fn disk_space(&self, path: &Path) -> Option<DiskSpace>;

    fn path_exists(&self, path: &Path) -> bool {
        self.stat(path).is_some()
    }

    /// Whether `path` is the root of a volume mounted inside another one.
    fn is_volume_mount_point(&self, path: &Path) -> bool;

    fn is_junction(&self, attributes: FileAttributes) -> bool {
        attributes.is_reparse_point()
    }

    /// Label of the volume rooted at `path`, if it has one.
    fn volume_label(&self, _path: &Path) -> Option<String> {
        None
    }
}
