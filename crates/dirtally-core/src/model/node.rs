/// A single node in the aggregation tree.
///
/// Nodes live in the [`DirTree`](super::DirTree) slot arena and refer to
/// each other by [`NodeIndex`]. The parent link is a plain index and never
/// owns anything; the parent's `children` vector is the only owning edge.
use super::attributes::Attributes;
use compact_str::CompactString;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Lightweight index into the arena.
///
/// Uses `u32` to keep nodes small. Indices of removed nodes are recycled,
/// so an index must not be kept past the `child_removed` notification of
/// its node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Create a new `NodeIndex` from a `usize`.
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    /// Return the index as a `usize` for Vec indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// What a node stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum NodeKind {
    /// Synthetic root grouping several scanned drives or folders.
    MyComputer,
    /// A volume root or mount point that was opened as a scan root.
    Drive,
    Directory,
    File,
    /// Free space of the parent drive.
    FreeSpace,
    /// Capacity of the parent drive not covered by any other child.
    Unknown,
}

impl NodeKind {
    /// Kinds that may own children.
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(self, Self::MyComputer | Self::Drive | Self::Directory)
    }

    /// Kinds whose children come from a directory listing.
    #[inline]
    pub fn is_enumerable(self) -> bool {
        matches!(self, Self::Drive | Self::Directory)
    }

    /// Bookkeeping items that are not backed by the filesystem.
    #[inline]
    pub fn is_synthetic(self) -> bool {
        matches!(self, Self::FreeSpace | Self::Unknown)
    }

    /// Kinds that never own children.
    #[inline]
    pub fn is_leaf_kind(self) -> bool {
        !self.is_container()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::MyComputer => "My Computer",
            Self::Drive => "Drive",
            Self::Directory => "Directory",
            Self::File => "File",
            Self::FreeSpace => "Free Space",
            Self::Unknown => "Unknown",
        }
    }
}

/// Display names of the synthetic items.
pub const FREE_SPACE_NAME: &str = "<Free Space>";
pub const UNKNOWN_NAME: &str = "<Unknown>";

/// One element of the aggregation tree.
///
/// Aggregate fields are only written by the aggregation engine so that
/// `size == own_size + Σ children.size` holds between mutations.
#[derive(Debug, Clone)]
pub struct Node {
    /// Leaf name, or the full path for scan roots.
    pub name: CompactString,

    pub kind: NodeKind,

    /// Absolute path anchoring this node. Set on scan roots and drives;
    /// every other path is rebuilt by joining names upward.
    pub(crate) base_path: Option<PathBuf>,

    pub(crate) parent: Option<NodeIndex>,
    pub(crate) children: Vec<NodeIndex>,

    /// Bytes attributable to this node alone.
    pub(crate) own_size: u64,
    /// `own_size` plus the aggregate size of every child.
    pub(crate) size: u64,
    /// Files in the subtree. A file counts itself.
    pub(crate) files: u64,
    /// Directories strictly below this node.
    pub(crate) subdirs: u64,
    /// Containers in the subtree (including this one) whose listing is pending.
    pub(crate) read_jobs: u64,

    /// Own last-write time as reported by the filesystem.
    pub(crate) own_last_change: Option<SystemTime>,
    /// Latest last-write time anywhere in the subtree.
    pub(crate) last_change: Option<SystemTime>,

    pub(crate) attributes: Attributes,
    pub(crate) ticks_worked: Duration,
    pub(crate) read_job_done: bool,
    pub(crate) done: bool,
}

impl Node {
    fn blank(name: CompactString, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            base_path: None,
            parent: None,
            children: Vec::new(),
            own_size: 0,
            size: 0,
            files: 0,
            subdirs: 0,
            read_jobs: 0,
            own_last_change: None,
            last_change: None,
            attributes: Attributes::default(),
            ticks_worked: Duration::ZERO,
            read_job_done: true,
            done: false,
        }
    }

    /// A fully sized file. Files are complete at creation.
    pub fn file(
        name: CompactString,
        size: u64,
        attributes: Attributes,
        last_write: Option<SystemTime>,
    ) -> Self {
        let mut node = Self::blank(name, NodeKind::File);
        node.own_size = size;
        node.size = size;
        node.files = 1;
        node.attributes = attributes;
        node.own_last_change = last_write;
        node.last_change = last_write;
        node.done = true;
        node
    }

    /// A directory awaiting enumeration, or a leaf-like directory when
    /// `dont_follow` is set (mount point or junction under a disabled policy).
    pub fn directory(
        name: CompactString,
        attributes: Attributes,
        last_write: Option<SystemTime>,
        dont_follow: bool,
    ) -> Self {
        let mut node = Self::blank(name, NodeKind::Directory);
        node.attributes = attributes;
        node.own_last_change = last_write;
        node.last_change = last_write;
        if !dont_follow {
            node.read_job_done = false;
            node.read_jobs = 1;
        }
        node
    }

    /// A drive rooted at `path`, awaiting enumeration. `name` is the
    /// formatted volume name.
    pub fn drive(path: PathBuf, name: CompactString) -> Self {
        let mut node = Self::blank(name, NodeKind::Drive);
        node.base_path = Some(path);
        node.read_job_done = false;
        node.read_jobs = 1;
        node
    }

    /// A directory opened as a scan root.
    pub fn root_directory(path: PathBuf, last_write: Option<SystemTime>) -> Self {
        let mut node = Self::directory(
            CompactString::new(path.to_string_lossy()),
            Attributes::default(),
            last_write,
            false,
        );
        node.base_path = Some(path);
        node
    }

    /// Synthetic root grouping several scan roots. Has no listing of its own.
    pub fn my_computer() -> Self {
        Self::blank(CompactString::new(NodeKind::MyComputer.label()), NodeKind::MyComputer)
    }

    pub fn free_space(bytes: u64) -> Self {
        let mut node = Self::blank(CompactString::new(FREE_SPACE_NAME), NodeKind::FreeSpace);
        node.own_size = bytes;
        node.size = bytes;
        node.done = true;
        node
    }

    /// Starts empty; sized when the owning drive finishes.
    pub fn unknown() -> Self {
        let mut node = Self::blank(CompactString::new(UNKNOWN_NAME), NodeKind::Unknown);
        node.done = true;
        node
    }

    // ── Read accessors ───────────────────────────────────────────────

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn own_size(&self) -> u64 {
        self.own_size
    }

    #[inline]
    pub fn files_count(&self) -> u64 {
        self.files
    }

    #[inline]
    pub fn subdirs_count(&self) -> u64 {
        self.subdirs
    }

    #[inline]
    pub fn items_count(&self) -> u64 {
        self.files + self.subdirs
    }

    #[inline]
    pub fn read_jobs(&self) -> u64 {
        self.read_jobs
    }

    #[inline]
    pub fn last_change(&self) -> Option<SystemTime> {
        self.last_change
    }

    #[inline]
    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    #[inline]
    pub fn ticks_worked(&self) -> Duration {
        self.ticks_worked
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    #[inline]
    pub fn is_read_job_done(&self) -> bool {
        self.read_job_done
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    /// Lower-cased extension including the dot, `"."` when there is none.
    /// Only meaningful for files.
    pub fn extension(&self) -> CompactString {
        match self.name.rfind('.') {
            Some(pos) => CompactString::new(self.name[pos..].to_lowercase()),
            None => CompactString::new("."),
        }
    }

    /// What this node adds to its parent's directory count.
    #[inline]
    pub(crate) fn dir_contribution(&self) -> u64 {
        self.subdirs + u64::from(self.kind == NodeKind::Directory)
    }
}
