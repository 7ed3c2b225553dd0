/// An in-memory filesystem.
///
/// Holds a flat map from absolute path to entry behind a `parking_lot`
/// lock, so a test can mutate the "disk" while a scanner holds an `Arc`
/// to it. Paths are compared exactly; callers use one spelling per entry.
use super::{DirEntries, DirEntryRecord, DiskSpace, FileSystem};
use crate::error::EnumerationError;
use crate::model::FileAttributes;
use compact_str::CompactString;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct MemEntry {
    is_dir: bool,
    size: u64,
    attributes: u32,
    last_write: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct MemState {
    entries: BTreeMap<PathBuf, MemEntry>,
    mount_points: HashSet<PathBuf>,
    volumes: HashMap<PathBuf, DiskSpace>,
    labels: HashMap<PathBuf, String>,
    denied: HashSet<PathBuf>,
}

#[derive(Debug, Default)]
pub struct MemoryFs {
    state: RwLock<MemState>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory, creating missing ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.state.write();
        Self::insert_dir_chain(&mut state, path.as_ref());
    }

    /// Add a file with `size` bytes, creating missing ancestors.
    pub fn add_file(&self, path: impl AsRef<Path>, size: u64) {
        self.add_file_with(path, size, 0, None);
    }

    /// Add a file with explicit raw attributes and last-write time.
    pub fn add_file_with(
        &self,
        path: impl AsRef<Path>,
        size: u64,
        attributes: u32,
        last_write: Option<SystemTime>,
    ) {
        let path = path.as_ref();
        let mut state = self.state.write();
        if let Some(parent) = path.parent() {
            Self::insert_dir_chain(&mut state, parent);
        }
        state.entries.insert(
            path.to_path_buf(),
            MemEntry {
                is_dir: false,
                size,
                attributes,
                last_write,
            },
        );
    }

    /// Replace the attributes of an existing entry.
    pub fn set_attributes(&self, path: impl AsRef<Path>, attributes: u32) {
        if let Some(entry) = self.state.write().entries.get_mut(path.as_ref()) {
            entry.attributes = attributes;
        }
    }

    /// Set the last-write time of an existing entry.
    pub fn set_last_write(&self, path: impl AsRef<Path>, last_write: SystemTime) {
        if let Some(entry) = self.state.write().entries.get_mut(path.as_ref()) {
            entry.last_write = Some(last_write);
        }
    }

    /// Remove an entry and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.state.write();
        state.entries.retain(|p, _| !p.starts_with(path));
    }

    /// Declare `path` the root of a volume with the given capacity.
    pub fn add_volume(&self, path: impl AsRef<Path>, total: u64, free: u64) {
        let path = path.as_ref();
        let mut state = self.state.write();
        Self::insert_dir_chain(&mut state, path);
        state.mount_points.insert(path.to_path_buf());
        state
            .volumes
            .insert(path.to_path_buf(), DiskSpace { total, free });
    }

    /// Change the free bytes of a volume added with [`add_volume`](Self::add_volume).
    pub fn set_free(&self, volume: impl AsRef<Path>, free: u64) {
        if let Some(space) = self.state.write().volumes.get_mut(volume.as_ref()) {
            space.free = free;
        }
    }

    /// Name the volume rooted at `path`.
    pub fn set_volume_label(&self, path: impl AsRef<Path>, label: impl Into<String>) {
        self.state
            .write()
            .labels
            .insert(path.as_ref().to_path_buf(), label.into());
    }

    /// Make listing `path` fail as if access were denied.
    pub fn deny(&self, path: impl AsRef<Path>) {
        self.state.write().denied.insert(path.as_ref().to_path_buf());
    }

    fn insert_dir_chain(state: &mut MemState, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() || state.entries.contains_key(ancestor) {
                continue;
            }
            state.entries.insert(
                ancestor.to_path_buf(),
                MemEntry {
                    is_dir: true,
                    size: 0,
                    attributes: FileAttributes::DIRECTORY,
                    last_write: None,
                },
            );
        }
    }

    fn record(path: &Path, entry: &MemEntry) -> DirEntryRecord {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        DirEntryRecord {
            name: CompactString::new(name),
            is_dir: entry.is_dir,
            attributes: FileAttributes(entry.attributes),
            size: entry.size,
            last_write: entry.last_write,
        }
    }
}

impl FileSystem for MemoryFs {
    fn read_dir(&self, dir: &Path) -> Result<DirEntries<'_>, EnumerationError> {
        let state = self.state.read();
        if state.denied.contains(dir) {
            return Err(EnumerationError::AccessDenied {
                path: dir.to_path_buf(),
            });
        }
        match state.entries.get(dir) {
            Some(entry) if entry.is_dir => {}
            Some(_) => {
                return Err(EnumerationError::NotADirectory {
                    path: dir.to_path_buf(),
                })
            }
            None => {
                return Err(EnumerationError::Io {
                    path: dir.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            }
        }
        // Snapshot the listing so no lock is held while the caller iterates.
        let records: Vec<DirEntryRecord> = state
            .entries
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .map(|(path, entry)| Self::record(path, entry))
            .collect();
        Ok(Box::new(records.into_iter()))
    }

    fn stat(&self, path: &Path) -> Option<DirEntryRecord> {
        let state = self.state.read();
        state
            .entries
            .get(path)
            .map(|entry| Self::record(path, entry))
    }

    fn disk_space(&self, path: &Path) -> Option<DiskSpace> {
        let state = self.state.read();
        path.ancestors()
            .find_map(|ancestor| state.volumes.get(ancestor).copied())
    }

    fn is_volume_mount_point(&self, path: &Path) -> bool {
        self.state.read().mount_points.contains(path)
    }

    fn volume_label(&self, path: &Path) -> Option<String> {
        self.state.read().labels.get(path).cloned()
    }
}
