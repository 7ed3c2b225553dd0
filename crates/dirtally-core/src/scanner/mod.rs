/// Scanner module — drives the incremental scan.
///
/// - [`budget`] decides how much one scheduler call may do.
/// - [`schedule`] is the resumable walk (`DirTree::do_some_work`).
/// - [`refresh`] rescans a node in place (`DirTree::start_refresh`).
///
/// [`start_scan`] hosts all of this on a background thread that writes
/// into a **shared `LiveTree`** (`Arc<RwLock<DirTree>>`), one time slice
/// per write-lock acquisition, so a reader can render the growing tree
/// between slices. Structural events go to a bounded channel, or with
/// [`start_scan_with_observer`] straight to the caller's observer.
pub mod budget;
pub mod progress;
pub mod refresh;
pub mod schedule;

use crate::config::{ScanContext, ScanOptions, Settings};
use crate::events::{ChannelObserver, TreeEvent, TreeObserver};
use crate::model::DirTree;
use crate::platform::FileSystem;
use budget::TimeBudget;
use progress::{ScanCommand, ScanProgress};
use refresh::RefreshOutcome;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// A shared, concurrently-readable tree.
///
/// The scan thread holds the write lock for one slice at a time. Readers
/// take the read lock between slices.
pub type LiveTree = Arc<RwLock<DirTree>>;

/// Maximum number of progress messages that may queue up in the channel.
///
/// One `Update` is sent per slice. If the host stops draining, the scan
/// thread blocks on the full channel instead of growing the heap.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// Maximum number of queued structural events.
///
/// Events are sent while the tree is locked, so a full channel drops them.
/// Drops are counted in [`ScanProgress::Update`].
pub const EVENT_CHANNEL_CAPACITY: usize = 65_536;

/// Handle to a running or idle scan. Allows cancellation, refresh and
/// policy changes, and receiving progress updates.
pub struct ScanHandle {
    /// Receiver for progress updates from the scan thread.
    pub progress_rx: Receiver<ScanProgress>,
    /// Receiver for structural tree events. Never yields when the scan
    /// was started with its own observer.
    pub events_rx: Receiver<TreeEvent>,
    /// Shared tree that is populated incrementally during scanning.
    pub live_tree: LiveTree,
    command_tx: Sender<ScanCommand>,
    cancel_flag: Arc<AtomicBool>,
    dropped_events: Arc<AtomicU64>,
    _thread: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Request the scan thread to stop as soon as possible.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        // Wakes the thread when it is idling on the command channel.
        let _ = self.command_tx.send(ScanCommand::Cancel);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// Rescan the node that covers `path`. Answered with
    /// [`ScanProgress::Refreshed`] or [`ScanProgress::Error`].
    pub fn refresh(&self, path: impl Into<PathBuf>) {
        let _ = self.command_tx.send(ScanCommand::Refresh(path.into()));
    }

    pub fn set_options(&self, options: ScanOptions) {
        let _ = self.command_tx.send(ScanCommand::SetOptions(options));
    }

    /// Tree events lost to a full event channel so far.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

/// Start scanning `roots` on a background thread.
///
/// After the root is done the thread stays alive, serving refresh and
/// option commands, until cancelled or until the handle is dropped.
pub fn start_scan(roots: Vec<PathBuf>, settings: Settings, fs: Arc<dyn FileSystem>) -> ScanHandle {
    let (events_tx, events_rx) = crossbeam_channel::bounded::<TreeEvent>(EVENT_CHANNEL_CAPACITY);
    let observer = ChannelObserver::new(events_tx);
    let dropped_events = observer.dropped_counter();
    spawn_host(roots, settings, fs, Box::new(observer), events_rx, dropped_events)
}

/// Start scanning with `observer` receiving every notification.
///
/// The observer runs on the scan thread while the tree is write-locked,
/// so it must not touch the `LiveTree`. Nothing is ever dropped.
pub fn start_scan_with_observer(
    roots: Vec<PathBuf>,
    settings: Settings,
    fs: Arc<dyn FileSystem>,
    observer: Box<dyn TreeObserver>,
) -> ScanHandle {
    spawn_host(
        roots,
        settings,
        fs,
        observer,
        crossbeam_channel::never(),
        Arc::new(AtomicU64::new(0)),
    )
}

fn spawn_host(
    roots: Vec<PathBuf>,
    settings: Settings,
    fs: Arc<dyn FileSystem>,
    observer: Box<dyn TreeObserver>,
    events_rx: Receiver<TreeEvent>,
    dropped_events: Arc<AtomicU64>,
) -> ScanHandle {
    let (progress_tx, progress_rx) =
        crossbeam_channel::bounded::<ScanProgress>(PROGRESS_CHANNEL_CAPACITY);
    let (command_tx, command_rx) = crossbeam_channel::unbounded::<ScanCommand>();
    let cancel_flag = Arc::new(AtomicBool::new(false));

    let live_tree: LiveTree = Arc::new(RwLock::new(DirTree::with_observer(observer)));

    let host = ScanHost {
        roots,
        options: settings.options,
        time_slice: settings.time_slice(),
        fs,
        live_tree: live_tree.clone(),
        progress_tx,
        command_rx,
        cancel_flag: cancel_flag.clone(),
        dropped_events: dropped_events.clone(),
    };

    let thread = thread::Builder::new()
        .name("dirtally-scanner".into())
        .spawn(move || host.run())
        .expect("failed to spawn scanner thread");

    ScanHandle {
        progress_rx,
        events_rx,
        live_tree,
        command_tx,
        cancel_flag,
        dropped_events,
        _thread: Some(thread),
    }
}

/// State owned by the scan thread.
struct ScanHost {
    roots: Vec<PathBuf>,
    options: ScanOptions,
    time_slice: Duration,
    fs: Arc<dyn FileSystem>,
    live_tree: LiveTree,
    progress_tx: Sender<ScanProgress>,
    command_rx: Receiver<ScanCommand>,
    cancel_flag: Arc<AtomicBool>,
    dropped_events: Arc<AtomicU64>,
}

/// Whether the thread should keep going after a command.
enum Flow {
    Continue,
    Stop,
}

impl ScanHost {
    fn run(self) {
        info!("Starting scan of {} root(s)", self.roots.len());
        let live = Arc::clone(&self.live_tree);

        let opened = {
            let mut tree = live.write();
            let ctx = ScanContext::new(&*self.fs, &self.options);
            tree.open(&self.roots, &ctx)
        };
        if let Err(err) = opened {
            error!("cannot open scan roots: {err}");
            let _ = self.progress_tx.send(ScanProgress::Error {
                path: String::new(),
                message: err.to_string(),
            });
            return;
        }
        self.serve(live)
    }

    fn serve(mut self, live: LiveTree) {
        let mut started = Instant::now();
        let mut finished = false;

        loop {
            while let Ok(command) = self.command_rx.try_recv() {
                if let Flow::Stop = self.handle(command, &live) {
                    return self.cancelled();
                }
                finished = false;
                started = Instant::now();
            }
            if self.cancel_flag.load(Ordering::Relaxed) {
                return self.cancelled();
            }

            let root_done = if finished {
                true
            } else {
                match self.run_slice(&live) {
                    Some(done) => done,
                    None => return self.receiver_gone(),
                }
            };

            if root_done && !finished {
                finished = true;
                let error_count = live.read().enumeration_failures();
                let duration = started.elapsed();
                info!("Scan complete in {duration:?} with {error_count} error(s)");
                if !self.send(ScanProgress::Complete {
                    duration,
                    error_count,
                }) {
                    return self.receiver_gone();
                }
            }

            if finished {
                // Idle until the host asks for more work.
                match self.command_rx.recv() {
                    Ok(command) => {
                        if let Flow::Stop = self.handle(command, &live) {
                            return self.cancelled();
                        }
                        finished = false;
                        started = Instant::now();
                    }
                    Err(_) => {
                        debug!("scan handle dropped; scanner thread exits");
                        return;
                    }
                }
            }
        }
    }

    /// Run one slice under the write lock. Returns whether the root is
    /// done (or gone), or `None` once nobody receives progress any more.
    fn run_slice(&self, live: &LiveTree) -> Option<bool> {
        let (update, failures, done) = {
            let mut tree = live.write();
            let Some(root) = tree.root() else {
                return Some(true);
            };
            let ctx = ScanContext::new(&*self.fs, &self.options);
            let mut budget = TimeBudget::new(self.time_slice).with_cancel_flag(self.cancel_flag.clone());
            if let Err(err) = tree.do_some_work(root, &ctx, &mut budget) {
                error!("scan slice failed: {err}");
                let _ = self.progress_tx.send(ScanProgress::Error {
                    path: tree.full_path(root).display().to_string(),
                    message: err.to_string(),
                });
            }
            let node = tree.node(root);
            let update = ScanProgress::Update {
                files_found: node.files_count(),
                dirs_found: node.subdirs_count(),
                total_size: node.size(),
                pending_read_jobs: node.read_jobs(),
                position: tree.progress_pos(root),
                range: tree.progress_range(root, &*self.fs),
                dropped_events: self.dropped_events.load(Ordering::Relaxed),
            };
            let done = node.is_done();
            (update, tree.take_failures(), done)
        };

        for (path, message) in failures {
            self.send(ScanProgress::Error {
                path: path.display().to_string(),
                message,
            });
        }
        self.send(update).then_some(done)
    }

    /// Returns `false` when the receiving side is gone.
    fn send(&self, message: ScanProgress) -> bool {
        self.progress_tx.send(message).is_ok()
    }

    fn receiver_gone(&self) {
        debug!("progress receiver dropped; scanner thread exits");
    }

    fn handle(&mut self, command: ScanCommand, live: &LiveTree) -> Flow {
        match command {
            ScanCommand::Cancel => Flow::Stop,
            ScanCommand::Refresh(path) => {
                self.refresh(&path, live);
                Flow::Continue
            }
            ScanCommand::SetOptions(options) => {
                debug!("applying options {options:?}");
                self.options = options;
                let mut tree = live.write();
                let ctx = ScanContext::new(&*self.fs, &self.options);
                if let Err(err) = tree.apply_options(&ctx) {
                    error!("cannot apply options: {err}");
                }
                Flow::Continue
            }
        }
    }

    fn refresh(&self, path: &Path, live: &LiveTree) {
        let mut tree = live.write();
        let target = tree
            .root()
            .and_then(|root| tree.find_node_by_path(root, path));
        let Some(target) = target else {
            let _ = self.progress_tx.send(ScanProgress::Error {
                path: path.display().to_string(),
                message: "path is not part of the scanned tree".into(),
            });
            return;
        };

        let ctx = ScanContext::new(&*self.fs, &self.options);
        match tree.start_refresh(target, &ctx) {
            Ok(outcome) => {
                let unlinked = outcome == RefreshOutcome::Deleted && tree.root().is_none();
                drop(tree);
                info!("Refreshed {}: {outcome:?}", path.display());
                let _ = self.progress_tx.send(ScanProgress::Refreshed {
                    path: path.to_path_buf(),
                    outcome,
                });
                if unlinked {
                    let _ = self.progress_tx.send(ScanProgress::RootUnlinked);
                }
            }
            Err(err) => {
                drop(tree);
                error!("refresh of {} failed: {err}", path.display());
                let _ = self.progress_tx.send(ScanProgress::Error {
                    path: path.display().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    fn cancelled(&self) {
        info!("Scan cancelled");
        let _ = self.progress_tx.send(ScanProgress::Cancelled);
    }
}
