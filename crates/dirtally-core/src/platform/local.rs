/// The real filesystem, through `std::fs`.
///
/// File sizes are the bytes the file occupies on disk: the compressed
/// size on Windows, the allocated blocks on Unix, capped at the logical
/// length. Sparse and compressed files therefore count for what they
/// really use.
///
/// Entries are stat'ed with `symlink_metadata` so links are reported as
/// themselves. A link that resolves to a directory is listed as a
/// directory carrying the reparse-point attribute, which the engine treats
/// as a junction.
use super::{volume, DirEntries, DirEntryRecord, DiskSpace, FileSystem};
use crate::error::EnumerationError;
use crate::model::FileAttributes;
use compact_str::CompactString;
use std::fs::Metadata;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFs {
    fn read_dir(&self, dir: &Path) -> Result<DirEntries<'_>, EnumerationError> {
        let entries = std::fs::read_dir(dir).map_err(|source| match source.kind() {
            std::io::ErrorKind::PermissionDenied => EnumerationError::AccessDenied {
                path: dir.to_path_buf(),
            },
            _ => EnumerationError::Io {
                path: dir.to_path_buf(),
                source,
            },
        })?;

        Ok(Box::new(entries.filter_map(|entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    debug!("skipping unreadable entry: {err}");
                    return None;
                }
            };
            let path = entry.path();
            match std::fs::symlink_metadata(&path) {
                Ok(meta) => Some(record_from_metadata(
                    &path,
                    CompactString::new(entry.file_name().to_string_lossy()),
                    &meta,
                )),
                Err(err) => {
                    debug!("cannot stat {}: {err}", path.display());
                    None
                }
            }
        })))
    }

    fn stat(&self, path: &Path) -> Option<DirEntryRecord> {
        let meta = std::fs::symlink_metadata(path).ok()?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Some(record_from_metadata(path, CompactString::new(name), &meta))
    }

    fn disk_space(&self, path: &Path) -> Option<DiskSpace> {
        volume::disk_space(path)
    }

    fn path_exists(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).is_ok()
    }

    fn is_volume_mount_point(&self, path: &Path) -> bool {
        volume::is_volume_mount_point(path)
    }

    fn volume_label(&self, path: &Path) -> Option<String> {
        volume::volume_label(path)
    }
}

fn record_from_metadata(path: &Path, name: CompactString, meta: &Metadata) -> DirEntryRecord {
    let is_link = meta.file_type().is_symlink();
    // A link counts as a directory when its target is one.
    let is_dir = meta.is_dir()
        || (is_link && std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false));

    DirEntryRecord {
        attributes: attributes_of(&name, meta, is_dir),
        name,
        is_dir,
        size: if is_dir { 0 } else { on_disk_size(path, meta) },
        last_write: meta.modified().ok(),
    }
}

/// Bytes `path` occupies on disk, never more than its logical length.
#[cfg(unix)]
fn on_disk_size(_path: &Path, meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    // `st_blocks` is always in 512-byte units.
    meta.len().min(meta.blocks().saturating_mul(512))
}

/// Bytes `path` occupies on disk, as `GetCompressedFileSizeW` reports them.
#[cfg(windows)]
fn on_disk_size(path: &Path, meta: &Metadata) -> u64 {
    use windows::Win32::Storage::FileSystem::{GetCompressedFileSizeW, INVALID_FILE_SIZE};

    let wide: Vec<u16> = path
        .to_string_lossy()
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let mut high: u32 = 0;
    let low = unsafe {
        GetCompressedFileSizeW(windows::core::PCWSTR(wide.as_ptr()), Some(&mut high as *mut u32))
    };
    // A real size of exactly 0xFFFFFFFF is indistinguishable here; the
    // logical length is the same value in that case.
    if low == INVALID_FILE_SIZE && high == 0 {
        debug!("GetCompressedFileSizeW failed for {}", path.display());
        return meta.len();
    }
    (u64::from(high) << 32) | u64::from(low)
}

#[cfg(not(any(unix, windows)))]
fn on_disk_size(_path: &Path, meta: &Metadata) -> u64 {
    meta.len()
}

#[cfg(windows)]
fn attributes_of(_name: &str, meta: &Metadata, _is_dir: bool) -> FileAttributes {
    use std::os::windows::fs::MetadataExt;
    FileAttributes(meta.file_attributes())
}

#[cfg(not(windows))]
fn attributes_of(name: &str, meta: &Metadata, is_dir: bool) -> FileAttributes {
    let mut bits = 0;
    if name.starts_with('.') {
        bits |= FileAttributes::HIDDEN;
    }
    if meta.permissions().readonly() {
        bits |= FileAttributes::READONLY;
    }
    if meta.file_type().is_symlink() {
        bits |= FileAttributes::REPARSE_POINT;
    }
    if is_dir {
        bits |= FileAttributes::DIRECTORY;
    } else {
        bits |= FileAttributes::ARCHIVE;
    }
    FileAttributes(bits)
}
