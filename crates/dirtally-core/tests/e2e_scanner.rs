/// End-to-end scanner integration tests.
///
/// These tests run the background host (`start_scan`) against a real
/// temporary filesystem through `LocalFs`, verifying that slices converge
/// to a complete tree, that totals match the bytes on disk, and that
/// refresh and cancellation commands are served through the channels.
use dirtally_core::platform::{FileSystem, LocalFs};
use dirtally_core::scanner::progress::ScanProgress;
use dirtally_core::scanner::refresh::RefreshOutcome;
use dirtally_core::scanner::{start_scan, ScanHandle, PROGRESS_CHANNEL_CAPACITY};
use dirtally_core::{NodeKind, Settings};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Create a reproducible directory tree for scanner tests:
///
/// ```text
/// root/
///   alpha/
///     a.txt   (100 bytes)
///     b.rs    (200 bytes)
///   beta/
///     c.png   (300 bytes)
///   d.zip     (400 bytes)
/// ```
///
/// Logical bytes: 1 000. Totals are compared against [`on_disk`], since
/// the scanner counts the bytes each file occupies.
fn build_test_tree(root: &Path) {
    let alpha = root.join("alpha");
    let beta = root.join("beta");
    fs::create_dir_all(&alpha).unwrap();
    fs::create_dir_all(&beta).unwrap();

    write_bytes(&alpha.join("a.txt"), 100);
    write_bytes(&alpha.join("b.rs"), 200);
    write_bytes(&beta.join("c.png"), 300);
    write_bytes(&root.join("d.zip"), 400);
}

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n]).unwrap();
}

/// Sum of the sizes the scanner reports for `paths`.
fn on_disk(paths: &[PathBuf]) -> u64 {
    let fs = LocalFs::new();
    paths
        .iter()
        .map(|p| fs.stat(p).expect("test file exists").size)
        .sum()
}

fn test_files(root: &Path) -> Vec<PathBuf> {
    vec![
        root.join("alpha").join("a.txt"),
        root.join("alpha").join("b.rs"),
        root.join("beta").join("c.png"),
        root.join("d.zip"),
    ]
}

fn scan(root: &Path) -> ScanHandle {
    let settings = Settings {
        time_slice_ms: 1,
        ..Settings::default()
    };
    start_scan(vec![root.to_path_buf()], settings, Arc::new(LocalFs::new()))
}

/// Wait for the next message matching `want`, panicking after a generous
/// timeout. Returns the matching message.
fn wait_for(handle: &ScanHandle, want: impl Fn(&ScanProgress) -> bool) -> ScanProgress {
    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    loop {
        assert!(
            std::time::Instant::now() < deadline,
            "scanner did not answer within 30 seconds"
        );
        match handle.progress_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(message) if want(&message) => return message,
            Ok(ScanProgress::Cancelled) => panic!("scan was unexpectedly cancelled"),
            Ok(_) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                panic!("scanner channel disconnected before the expected message");
            }
        }
    }
}

fn wait_for_complete(handle: &ScanHandle) -> Duration {
    match wait_for(handle, |m| matches!(m, ScanProgress::Complete { .. })) {
        ScanProgress::Complete { duration, .. } => duration,
        _ => unreachable!(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// The scanner must visit every file and total exactly the bytes written.
#[test]
fn scan_discovers_all_files() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let expected = on_disk(&test_files(tmp.path()));

    let handle = scan(tmp.path());
    wait_for_complete(&handle);

    let tree = handle.live_tree.read();
    let root = tree.root().expect("scan root");
    let node = tree.node(root);
    // 1 root + 2 dirs + 4 files.
    assert_eq!(tree.len(), 7);
    assert_eq!(node.size(), expected);
    assert_eq!(node.files_count(), 4);
    assert_eq!(node.subdirs_count(), 2);
    assert_eq!(node.read_jobs(), 0);
    assert!(node.is_done());
    assert_eq!(node.kind, NodeKind::Directory);
}

/// Scans of an empty directory must complete with only the root.
#[test]
fn scan_empty_directory() {
    let tmp = TempDir::new().expect("failed to create temp dir");

    let handle = scan(tmp.path());
    wait_for_complete(&handle);

    let tree = handle.live_tree.read();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.node(tree.root().unwrap()).size(), 0);
}

/// Cancellation must stop the thread and send `Cancelled`, whether the scan
/// was still running or already idle.
#[test]
fn scan_cancellation_sends_cancelled_message() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());

    let handle = scan(tmp.path());
    handle.cancel();
    assert!(handle.is_cancelled());

    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    let mut received_cancelled = false;
    while std::time::Instant::now() < deadline {
        match handle.progress_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(ScanProgress::Cancelled) => {
                received_cancelled = true;
                break;
            }
            Ok(_) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    assert!(received_cancelled, "scanner must send Cancelled within 30 s");
}

/// Every slice reports the running totals of the root.
#[test]
fn scan_sends_progress_updates() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let mut files = Vec::new();
    for i in 0..50 {
        let path = tmp.path().join(format!("file{i:03}.bin"));
        write_bytes(&path, 1024);
        files.push(path);
    }
    let expected = on_disk(&files);

    let handle = scan(tmp.path());
    let update = wait_for(&handle, |m| matches!(m, ScanProgress::Update { .. }));
    match update {
        ScanProgress::Update { files_found, total_size, .. } => {
            assert_eq!(files_found, 50);
            assert_eq!(total_size, expected);
        }
        _ => unreachable!(),
    }
    wait_for_complete(&handle);
}

/// `PROGRESS_CHANNEL_CAPACITY` must be positive so `send()` never blocks
/// on an empty channel.
const _: () = assert!(
    PROGRESS_CHANNEL_CAPACITY > 0,
    "PROGRESS_CHANNEL_CAPACITY must be > 0"
);

/// A refresh command after a deletion shrinks the live totals and the host
/// completes again.
#[test]
fn refresh_after_deletion_updates_the_live_tree() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let root_path = tmp.path().canonicalize().unwrap();
    let files = test_files(&root_path);
    let expected = on_disk(&files) - on_disk(&files[2..3]);

    let handle = scan(&root_path);
    wait_for_complete(&handle);

    fs::remove_file(root_path.join("beta").join("c.png")).unwrap();
    handle.refresh(root_path.join("beta"));

    let refreshed = wait_for(&handle, |m| matches!(m, ScanProgress::Refreshed { .. }));
    assert_eq!(
        refreshed,
        ScanProgress::Refreshed {
            path: root_path.join("beta"),
            outcome: RefreshOutcome::Refreshed,
        }
    );
    wait_for_complete(&handle);

    let tree = handle.live_tree.read();
    let root = tree.root().unwrap();
    assert_eq!(tree.node(root).size(), expected);
    assert_eq!(tree.node(root).files_count(), 3);
    assert!(tree.node(root).is_done());
}

/// Refreshing a directory that vanished reports it as deleted.
#[test]
fn refresh_of_vanished_directory_reports_deleted() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let root_path = tmp.path().canonicalize().unwrap();
    let files = test_files(&root_path);
    let expected = on_disk(&files[2..]);

    let handle = scan(&root_path);
    wait_for_complete(&handle);

    fs::remove_dir_all(root_path.join("alpha")).unwrap();
    handle.refresh(root_path.join("alpha"));
    let refreshed = wait_for(&handle, |m| matches!(m, ScanProgress::Refreshed { .. }));
    assert!(matches!(
        refreshed,
        ScanProgress::Refreshed {
            outcome: RefreshOutcome::Deleted,
            ..
        }
    ));
    wait_for_complete(&handle);

    let tree = handle.live_tree.read();
    let root = tree.root().unwrap();
    assert_eq!(tree.node(root).size(), expected);
    assert_eq!(tree.node(root).subdirs_count(), 1);
}

/// A path outside the scanned tree is answered with an error.
#[test]
fn refresh_outside_the_tree_is_an_error() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());

    let handle = scan(tmp.path());
    wait_for_complete(&handle);

    handle.refresh(PathBuf::from("/definitely/not/scanned"));
    let error = wait_for(&handle, |m| matches!(m, ScanProgress::Error { .. }));
    assert!(matches!(error, ScanProgress::Error { .. }));
}
