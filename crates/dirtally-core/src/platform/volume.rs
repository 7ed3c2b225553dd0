/// Volume queries: free space, labels and mount-point detection.
///
/// Windows goes through `GetDiskFreeSpaceExW`, `GetVolumeInformationW` and
/// `GetVolumeNameForVolumeMountPointW`; Unix uses `statvfs` and compares
/// device ids with the parent directory. Unix volumes have no label.
use super::DiskSpace;
use std::path::Path;

/// Total and caller-visible free bytes of the volume holding `path`.
///
/// Returns `None` when the query fails; callers keep their previous value.
#[cfg(windows)]
pub fn disk_space(path: &Path) -> Option<DiskSpace> {
    use windows::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

    let wide = to_wide(path);
    let mut free_caller: u64 = 0;
    let mut total: u64 = 0;
    let mut free_total: u64 = 0;
    let ok = unsafe {
        GetDiskFreeSpaceExW(
            windows::core::PCWSTR(wide.as_ptr()),
            Some(&mut free_caller as *mut u64),
            Some(&mut total as *mut u64),
            Some(&mut free_total as *mut u64),
        )
        .is_ok()
    };
    if !ok {
        tracing::debug!("GetDiskFreeSpaceExW failed for {}", path.display());
        return None;
    }
    Some(DiskSpace {
        total,
        free: free_caller,
    })
}

/// Whether `path` is a volume root: a drive root or a mounted volume folder.
#[cfg(windows)]
pub fn is_volume_mount_point(path: &Path) -> bool {
    use windows::Win32::Storage::FileSystem::GetVolumeNameForVolumeMountPointW;

    // The API wants a trailing backslash.
    let mut text = path.to_string_lossy().into_owned();
    if !text.ends_with('\\') {
        text.push('\\');
    }
    let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
    let mut volume = [0u16; 64];
    unsafe {
        GetVolumeNameForVolumeMountPointW(windows::core::PCWSTR(wide.as_ptr()), &mut volume)
            .is_ok()
    }
}

/// Label of the volume rooted at `path`; `None` when empty or unreadable.
#[cfg(windows)]
pub fn volume_label(path: &Path) -> Option<String> {
    use windows::Win32::Storage::FileSystem::GetVolumeInformationW;

    // The API wants a trailing backslash.
    let mut text = path.to_string_lossy().into_owned();
    if !text.ends_with('\\') {
        text.push('\\');
    }
    let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
    let mut label_buf = [0u16; 256];
    let ok = unsafe {
        GetVolumeInformationW(
            windows::core::PCWSTR(wide.as_ptr()),
            Some(&mut label_buf),
            None,
            None,
            None,
            None,
        )
        .is_ok()
    };
    if !ok {
        tracing::debug!("GetVolumeInformationW failed for {}", path.display());
        return None;
    }
    let len = label_buf.iter().position(|&c| c == 0).unwrap_or(label_buf.len());
    let label = String::from_utf16_lossy(&label_buf[..len]);
    (!label.is_empty()).then_some(label)
}

#[cfg(not(windows))]
pub fn volume_label(_path: &Path) -> Option<String> {
    None
}

#[cfg(windows)]
fn to_wide(path: &Path) -> Vec<u16> {
    path.to_string_lossy()
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect()
}

#[cfg(unix)]
pub fn disk_space(path: &Path) -> Option<DiskSpace> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: `c_path` is NUL-terminated and `stat` is a valid out-pointer.
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        tracing::debug!("statvfs failed for {}", path.display());
        return None;
    }
    let fragment = stat.f_frsize as u64;
    Some(DiskSpace {
        total: (stat.f_blocks as u64).saturating_mul(fragment),
        free: (stat.f_bavail as u64).saturating_mul(fragment),
    })
}

/// Whether `path` is a volume root: `/` or a directory on a different
/// device than its parent.
#[cfg(unix)]
pub fn is_volume_mount_point(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return false;
    };
    if !meta.is_dir() {
        return false;
    }
    match path.parent() {
        None => true,
        Some(parent) => match std::fs::metadata(parent) {
            Ok(parent_meta) => parent_meta.dev() != meta.dev(),
            Err(_) => false,
        },
    }
}

#[cfg(not(any(unix, windows)))]
pub fn disk_space(_path: &Path) -> Option<DiskSpace> {
    None
}

#[cfg(not(any(unix, windows)))]
pub fn is_volume_mount_point(path: &Path) -> bool {
    path.parent().is_none()
}
