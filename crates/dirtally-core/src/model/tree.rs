/// Slot-arena tree of [`Node`]s.
///
/// All nodes live in a single `Vec<Option<Node>>`. Relationships use
/// `NodeIndex` rather than pointers; a removed subtree frees its slots
/// onto a free list and later insertions reuse them. Totals are kept
/// current incrementally by the aggregation engine (`crate::aggregate`),
/// never recomputed wholesale.
use super::format::format_volume_name;
use super::node::{Node, NodeIndex, NodeKind};
use crate::config::ScanContext;
use crate::error::TreeError;
use crate::events::{NullObserver, TreeObserver};
use compact_str::CompactString;
use std::path::{Component, Path, PathBuf};

pub struct DirTree {
    slots: Vec<Option<Node>>,
    free_slots: Vec<NodeIndex>,
    live: usize,
    root: Option<NodeIndex>,
    pub(crate) observer: Box<dyn TreeObserver>,
    pub(crate) enumeration_failures: u64,
    /// Failed listings not yet collected by [`DirTree::take_failures`].
    pub(crate) pending_failures: Vec<(PathBuf, String)>,
}

impl std::fmt::Debug for DirTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirTree")
            .field("live", &self.live)
            .field("root", &self.root)
            .field("enumeration_failures", &self.enumeration_failures)
            .finish_non_exhaustive()
    }
}

impl Default for DirTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirTree {
    /// An empty tree that publishes nothing.
    pub fn new() -> Self {
        Self::with_observer(Box::new(NullObserver))
    }

    pub fn with_observer(observer: Box<dyn TreeObserver>) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            live: 0,
            root: None,
            observer,
            enumeration_failures: 0,
            pending_failures: Vec::new(),
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn TreeObserver>) {
        self.observer = observer;
    }

    /// Establish the scan root for `roots`, replacing any previous tree.
    ///
    /// One path becomes a Drive when it is a filesystem root or a volume
    /// mount point, a Directory otherwise. Several paths are grouped under
    /// a MyComputer root. Drives get their synthetic children right away
    /// when the policy asks for them.
    pub fn open(&mut self, roots: &[PathBuf], ctx: &ScanContext<'_>) -> Result<NodeIndex, TreeError> {
        self.clear();
        let root = match roots {
            [] => return Err(TreeError::NoRoot),
            [single] => {
                let node = Self::root_node(single, ctx);
                self.insert(node)
            }
            many => {
                let computer = self.insert(Node::my_computer());
                self.root = Some(computer);
                for path in many {
                    let node = Self::root_node(path, ctx);
                    let child = self.add_child(computer, node)?;
                    self.attach_synthetic_items(child, ctx)?;
                }
                computer
            }
        };
        self.root = Some(root);
        if roots.len() == 1 {
            self.attach_synthetic_items(root, ctx)?;
        }
        tracing::debug!("opened scan root {:?} for {} path(s)", root, roots.len());
        Ok(root)
    }

    fn root_node(path: &Path, ctx: &ScanContext<'_>) -> Node {
        if path.parent().is_none() || ctx.fs.is_volume_mount_point(path) {
            let label = ctx.fs.volume_label(path);
            let name = format_volume_name(label.as_deref(), path);
            Node::drive(path.to_path_buf(), CompactString::new(name))
        } else {
            let last_write = ctx.fs.stat(path).and_then(|r| r.last_write);
            Node::root_directory(path.to_path_buf(), last_write)
        }
    }

    pub(crate) fn attach_synthetic_items(&mut self, idx: NodeIndex, ctx: &ScanContext<'_>) -> Result<(), TreeError> {
        if self.node(idx).kind != NodeKind::Drive {
            return Ok(());
        }
        if ctx.options.show_free_space {
            self.create_free_space_item(idx, ctx)?;
        }
        if ctx.options.show_unknown {
            self.create_unknown_item(idx)?;
        }
        Ok(())
    }

    /// Drop every node. Observers are not notified.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_slots.clear();
        self.live = 0;
        self.root = None;
        self.enumeration_failures = 0;
        self.pending_failures.clear();
    }

    // ── Slot management ──────────────────────────────────────────────

    /// Store a detached node and return its index.
    pub(crate) fn insert(&mut self, node: Node) -> NodeIndex {
        self.live += 1;
        match self.free_slots.pop() {
            Some(idx) => {
                self.slots[idx.idx()] = Some(node);
                idx
            }
            None => {
                let idx = NodeIndex::new(self.slots.len());
                self.slots.push(Some(node));
                idx
            }
        }
    }

    /// Free `idx` and its whole subtree. Totals are not touched.
    pub(crate) fn free_subtree(&mut self, idx: NodeIndex) {
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.slots[current.idx()].take() {
                stack.extend(node.children);
                self.free_slots.push(current);
                self.live -= 1;
            }
        }
    }

    pub(crate) fn unlink_root(&mut self) {
        if let Some(root) = self.root.take() {
            self.free_subtree(root);
        }
    }

    // ── Read access ──────────────────────────────────────────────────

    #[inline]
    pub fn root(&self) -> Option<NodeIndex> {
        self.root
    }

    /// The node at `idx`, `None` for a freed or out-of-range slot.
    #[inline]
    pub fn get(&self, idx: NodeIndex) -> Option<&Node> {
        self.slots.get(idx.idx()).and_then(Option::as_ref)
    }

    /// The node at `idx`.
    ///
    /// Panics on a freed slot: holding an index past its removal
    /// notification is a caller bug.
    #[inline]
    pub fn node(&self, idx: NodeIndex) -> &Node {
        match self.get(idx) {
            Some(node) => node,
            None => panic!("stale NodeIndex {idx:?}"),
        }
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        match self.slots.get_mut(idx.idx()).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("stale NodeIndex {idx:?}"),
        }
    }

    #[inline]
    pub fn children(&self, idx: NodeIndex) -> &[NodeIndex] {
        &self.node(idx).children
    }

    #[inline]
    pub fn parent(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.node(idx).parent
    }

    /// Number of live nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Directories that could not be listed since the tree was opened.
    #[inline]
    pub fn enumeration_failures(&self) -> u64 {
        self.enumeration_failures
    }

    /// Drain the listings that failed since the last call, with their reason.
    pub fn take_failures(&mut self) -> Vec<(PathBuf, String)> {
        std::mem::take(&mut self.pending_failures)
    }

    /// Share of the parent's size, `1.0` for the root or an empty parent.
    pub fn fraction(&self, idx: NodeIndex) -> f64 {
        match self.node(idx).parent {
            Some(parent) if self.node(parent).size > 0 => {
                self.node(idx).size as f64 / self.node(parent).size as f64
            }
            _ => 1.0,
        }
    }

    pub fn find_child_index(&self, parent: NodeIndex, child: NodeIndex) -> Option<usize> {
        self.node(parent).children.iter().position(|&c| c == child)
    }

    /// Rebuild the absolute path of a node.
    ///
    /// Walks up to the nearest anchored node (scan root or drive) and joins
    /// the names below it. Synthetic items resolve to their drive's path
    /// plus their display name. MyComputer has an empty path.
    pub fn full_path(&self, idx: NodeIndex) -> PathBuf {
        let mut names = Vec::new();
        let mut current = Some(idx);
        while let Some(i) = current {
            let node = self.node(i);
            if let Some(base) = &node.base_path {
                let mut path = base.clone();
                for name in names.iter().rev() {
                    path.push(name);
                }
                return path;
            }
            if node.kind == NodeKind::MyComputer {
                break;
            }
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.iter().rev().collect()
    }

    /// Deepest node below `root` whose path is a prefix of `path`.
    ///
    /// Comparison is component-wise and case-insensitive. Returns `None`
    /// when `root` itself is not a prefix of `path`.
    pub fn find_node_by_path(&self, root: NodeIndex, path: &Path) -> Option<NodeIndex> {
        let query = lowered_components(path);
        self.find_prefix(root, &query)
    }

    fn find_prefix(&self, idx: NodeIndex, query: &[String]) -> Option<NodeIndex> {
        let node = self.node(idx);
        if node.kind.is_synthetic() {
            return None;
        }
        if node.kind != NodeKind::MyComputer {
            let mine = lowered_components(&self.full_path(idx));
            if mine.len() > query.len() || mine[..] != query[..mine.len()] {
                return None;
            }
            if mine.len() == query.len() {
                return Some(idx);
            }
        }
        node.children
            .iter()
            .find_map(|&child| self.find_prefix(child, query))
            .or(if node.kind == NodeKind::MyComputer {
                None
            } else {
                Some(idx)
            })
    }

    /// Pre-order walk of the subtree below `idx`, including `idx`.
    pub fn descendants(&self, idx: NodeIndex) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![idx],
        }
    }
}

fn lowered_components(path: &Path) -> Vec<String> {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect()
}

/// Iterator returned by [`DirTree::descendants`].
pub struct Descendants<'a> {
    tree: &'a DirTree,
    stack: Vec<NodeIndex>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        let idx = self.stack.pop()?;
        self.stack
            .extend(self.tree.node(idx).children.iter().rev().copied());
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanOptions;
    use crate::model::Attributes;
    use crate::platform::MemoryFs;
    use compact_str::CompactString;

    fn dir(name: &str) -> Node {
        Node::directory(CompactString::new(name), Attributes::default(), None, false)
    }

    fn file(name: &str, size: u64) -> Node {
        Node::file(CompactString::new(name), size, Attributes::default(), None)
    }

    fn small_tree() -> (DirTree, NodeIndex, NodeIndex, NodeIndex) {
        let fs = MemoryFs::new();
        fs.add_dir("/data/Users");
        let options = ScanOptions::default();
        let ctx = ScanContext::new(&fs, &options);
        let mut tree = DirTree::new();
        let root = tree.open(&[PathBuf::from("/data")], &ctx).unwrap();
        let users = tree.add_child(root, dir("Users")).unwrap();
        let report = tree.add_child(users, file("Report.txt", 50)).unwrap();
        (tree, root, users, report)
    }

    #[test]
    fn full_path_joins_names_below_the_root() {
        let (tree, root, _, report) = small_tree();
        assert_eq!(tree.full_path(root), PathBuf::from("/data"));
        assert_eq!(tree.full_path(report), PathBuf::from("/data/Users/Report.txt"));
    }

    #[test]
    fn find_is_case_insensitive_and_returns_deepest_prefix() {
        let (tree, root, users, report) = small_tree();
        assert_eq!(
            tree.find_node_by_path(root, Path::new("/DATA/users/report.TXT")),
            Some(report)
        );
        assert_eq!(
            tree.find_node_by_path(root, Path::new("/data/users/missing/deeper")),
            Some(users)
        );
        assert_eq!(tree.find_node_by_path(root, Path::new("/elsewhere")), None);
    }

    #[test]
    fn drive_root_is_named_after_its_volume() {
        let fs = MemoryFs::new();
        fs.add_volume("/vol", 1000, 100);
        fs.add_volume("/bare", 1000, 100);
        fs.set_volume_label("/vol", "Data");
        let options = ScanOptions::default();
        let ctx = ScanContext::new(&fs, &options);

        let mut tree = DirTree::new();
        let root = tree.open(&[PathBuf::from("/vol")], &ctx).unwrap();
        assert_eq!(tree.node(root).kind, NodeKind::Drive);
        assert_eq!(tree.node(root).name, "Data (/vol)");
        assert_eq!(tree.full_path(root), PathBuf::from("/vol"));

        let root = tree.open(&[PathBuf::from("/bare")], &ctx).unwrap();
        assert_eq!(tree.node(root).name, "/bare");
    }

    #[test]
    fn find_does_not_match_partial_names() {
        let (tree, root, users, _) = small_tree();
        assert_ne!(
            tree.find_node_by_path(root, Path::new("/data/UsersBackup")),
            Some(users)
        );
    }

    #[test]
    fn removed_slots_are_reused() {
        let (mut tree, _, users, report) = small_tree();
        let before = tree.len();
        tree.remove_child(users, 0).unwrap();
        assert_eq!(tree.len(), before - 1);
        assert!(tree.get(report).is_none());

        let again = tree.add_child(users, file("new.txt", 1)).unwrap();
        assert_eq!(again, report);
        assert_eq!(tree.len(), before);
    }

    #[test]
    fn descendants_walk_in_preorder() {
        let (tree, root, users, report) = small_tree();
        let order: Vec<NodeIndex> = tree.descendants(root).collect();
        assert_eq!(order, vec![root, users, report]);
    }

    #[test]
    fn several_roots_share_a_my_computer_node() {
        let fs = MemoryFs::new();
        fs.add_dir("/a");
        fs.add_dir("/b");
        let options = ScanOptions::default();
        let ctx = ScanContext::new(&fs, &options);
        let mut tree = DirTree::new();
        let root = tree
            .open(&[PathBuf::from("/a"), PathBuf::from("/b")], &ctx)
            .unwrap();

        assert_eq!(tree.node(root).kind, NodeKind::MyComputer);
        assert_eq!(tree.children(root).len(), 2);
        assert_eq!(tree.node(root).read_jobs(), 2);
        assert_eq!(tree.full_path(tree.children(root)[1]), PathBuf::from("/b"));
    }

    #[test]
    fn fraction_of_root_is_one() {
        let (tree, root, users, report) = small_tree();
        assert_eq!(tree.fraction(root), 1.0);
        assert_eq!(tree.fraction(users), 1.0);
        assert_eq!(tree.fraction(report), 1.0);
    }
}
