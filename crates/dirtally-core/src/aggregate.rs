/// Aggregation engine: keeps every ancestor's totals consistent as the
/// tree changes shape.
///
/// Sizes and counts are maintained by signed deltas walked up the parent
/// chain. `last_change` is a maximum, so it can only be raised
/// incrementally; after a removal it is recomputed with
/// [`DirTree::upward_recalc_last_change`].
use crate::config::ScanContext;
use crate::error::TreeError;
use crate::model::{DirTree, Node, NodeIndex, NodeKind};
use crate::platform::FileSystem;
use std::time::SystemTime;
use tracing::{debug, trace};

/// Everything a subtree contributes to its ancestors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub size: u64,
    pub files: u64,
    pub subdirs: u64,
    pub read_jobs: u64,
}

impl Totals {
    /// What `node` adds to its parent.
    pub fn contribution_of(node: &Node) -> Self {
        Self {
            size: node.size,
            files: node.files,
            subdirs: node.dir_contribution(),
            read_jobs: node.read_jobs,
        }
    }

    #[inline]
    pub fn size(bytes: u64) -> Self {
        Self {
            size: bytes,
            ..Self::default()
        }
    }
}

impl DirTree {
    // ── Structural mutation ──────────────────────────────────────────

    /// Append `child` under `parent` and publish it.
    ///
    /// Totals reach every ancestor before the observer hears about the
    /// child, so a reader never sees a child missing from its parent's sum.
    pub fn add_child(&mut self, parent: NodeIndex, mut child: Node) -> Result<NodeIndex, TreeError> {
        if self.node(parent).done {
            return Err(TreeError::ParentDone { parent });
        }
        let totals = Totals::contribution_of(&child);
        let last_change = child.last_change;
        child.parent = Some(parent);

        self.upward_add(parent, totals);
        if let Some(t) = last_change {
            self.upward_update_last_change(parent, t);
        }
        let idx = self.insert(child);
        self.node_mut(parent).children.push(idx);
        self.observer.child_added(parent, idx);
        Ok(idx)
    }

    /// Remove and destroy the child at `index`.
    pub fn remove_child(&mut self, parent: NodeIndex, index: usize) -> Result<(), TreeError> {
        let Some(&child) = self.node(parent).children.get(index) else {
            return Err(TreeError::ChildNotFound { parent, index });
        };
        // The view must still be able to look at the child.
        self.observer.child_removed(parent, child);

        self.node_mut(parent).children.remove(index);
        let totals = Totals::contribution_of(self.node(child));
        self.upward_subtract(parent, totals);
        self.free_subtree(child);
        self.upward_recalc_last_change(parent);
        Ok(())
    }

    /// Remove and destroy every child of `parent` with one notification.
    pub fn remove_all_children(&mut self, parent: NodeIndex) {
        if self.node(parent).children.is_empty() {
            return;
        }
        self.observer.removing_all_children(parent);

        let children = std::mem::take(&mut self.node_mut(parent).children);
        let mut totals = Totals::default();
        for &child in &children {
            let c = Totals::contribution_of(self.node(child));
            totals.size += c.size;
            totals.files += c.files;
            totals.subdirs += c.subdirs;
            totals.read_jobs += c.read_jobs;
        }
        self.upward_subtract(parent, totals);
        for child in children {
            self.free_subtree(child);
        }
        self.upward_recalc_last_change(parent);
    }

    // ── Upward deltas ────────────────────────────────────────────────

    /// Add `totals` to `from` and every ancestor.
    pub fn upward_add(&mut self, from: NodeIndex, totals: Totals) {
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node_mut(idx);
            node.size += totals.size;
            node.files += totals.files;
            node.subdirs += totals.subdirs;
            node.read_jobs += totals.read_jobs;
            current = node.parent;
        }
    }

    /// Subtract `totals` from `from` and every ancestor.
    pub fn upward_subtract(&mut self, from: NodeIndex, totals: Totals) {
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node_mut(idx);
            debug_assert!(node.size >= totals.size, "size underflow at {idx:?}");
            debug_assert!(node.files >= totals.files, "file count underflow at {idx:?}");
            debug_assert!(node.subdirs >= totals.subdirs, "dir count underflow at {idx:?}");
            debug_assert!(node.read_jobs >= totals.read_jobs, "read job underflow at {idx:?}");
            node.size = node.size.saturating_sub(totals.size);
            node.files = node.files.saturating_sub(totals.files);
            node.subdirs = node.subdirs.saturating_sub(totals.subdirs);
            node.read_jobs = node.read_jobs.saturating_sub(totals.read_jobs);
            current = node.parent;
        }
    }

    pub fn upward_add_size(&mut self, from: NodeIndex, bytes: u64) {
        self.upward_add(from, Totals::size(bytes));
    }

    pub fn upward_subtract_size(&mut self, from: NodeIndex, bytes: u64) {
        self.upward_subtract(from, Totals::size(bytes));
    }

    pub fn upward_add_files(&mut self, from: NodeIndex, count: u64) {
        self.upward_add(from, Totals { files: count, ..Totals::default() });
    }

    pub fn upward_subtract_files(&mut self, from: NodeIndex, count: u64) {
        self.upward_subtract(from, Totals { files: count, ..Totals::default() });
    }

    pub fn upward_add_subdirs(&mut self, from: NodeIndex, count: u64) {
        self.upward_add(from, Totals { subdirs: count, ..Totals::default() });
    }

    pub fn upward_subtract_subdirs(&mut self, from: NodeIndex, count: u64) {
        self.upward_subtract(from, Totals { subdirs: count, ..Totals::default() });
    }

    pub fn upward_add_read_jobs(&mut self, from: NodeIndex, count: u64) {
        self.upward_add(from, Totals { read_jobs: count, ..Totals::default() });
    }

    pub fn upward_subtract_read_jobs(&mut self, from: NodeIndex, count: u64) {
        self.upward_subtract(from, Totals { read_jobs: count, ..Totals::default() });
    }

    /// Resize a leaf in place, moving the difference through every ancestor.
    pub fn set_leaf_size(&mut self, idx: NodeIndex, bytes: u64) {
        debug_assert!(self.node(idx).children.is_empty(), "set_leaf_size on a container");
        let before = self.node(idx).own_size;
        self.node_mut(idx).own_size = bytes;
        if bytes >= before {
            self.upward_add_size(idx, bytes - before);
        } else {
            self.upward_subtract_size(idx, before - bytes);
        }
    }

    // ── Last change ──────────────────────────────────────────────────

    /// Raise `last_change` from `from` upward; stops at the first ancestor
    /// that is already at least `t`.
    pub fn upward_update_last_change(&mut self, from: NodeIndex, t: SystemTime) {
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node_mut(idx);
            if node.last_change >= Some(t) {
                break;
            }
            node.last_change = Some(t);
            current = node.parent;
        }
    }

    /// Recompute `last_change` from the node's own timestamp and its
    /// children, then repeat for every ancestor. May lower the value.
    pub fn upward_recalc_last_change(&mut self, from: NodeIndex) {
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node(idx);
            let latest = node
                .children
                .iter()
                .map(|&c| self.node(c).last_change)
                .fold(node.own_last_change, Option::max);
            let node = self.node_mut(idx);
            node.last_change = latest;
            current = node.parent;
        }
    }

    // ── Completion state ─────────────────────────────────────────────

    /// Mark the node's own listing consumed (`true`) or pending again.
    ///
    /// Each container owns exactly one read-job unit while pending.
    pub fn set_read_job_done(&mut self, idx: NodeIndex, done: bool) {
        let was_done = self.node(idx).read_job_done;
        if was_done == done {
            return;
        }
        if done {
            self.upward_subtract_read_jobs(idx, 1);
        } else {
            self.upward_add_read_jobs(idx, 1);
        }
        self.node_mut(idx).read_job_done = done;
    }

    /// Clear `done` on the node and every ancestor.
    ///
    /// A finished drive drops its unknown-space value first: that value is
    /// only defined once every other child is final.
    pub fn upward_set_undone(&mut self, from: NodeIndex) {
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node(idx);
            if node.kind == NodeKind::Drive && node.done {
                if let Some(unknown) = self.find_unknown_item(idx) {
                    self.set_leaf_size(unknown, 0);
                }
            }
            let node = self.node_mut(idx);
            node.done = false;
            current = node.parent;
        }
    }

    /// Finish a node: settle drive bookkeeping, sort children by
    /// descending size once, and publish.
    pub(crate) fn set_done(&mut self, idx: NodeIndex, ctx: &ScanContext<'_>) {
        if self.node(idx).done {
            return;
        }
        if self.node(idx).kind == NodeKind::Drive {
            self.update_free_space_item(idx, ctx);
            if let Some(unknown) = self.find_unknown_item(idx) {
                self.settle_unknown_item(idx, unknown, ctx);
            }
        }
        let mut children = std::mem::take(&mut self.node_mut(idx).children);
        children.sort_by(|a, b| self.node(*b).size.cmp(&self.node(*a).size));
        let node = self.node_mut(idx);
        node.children = children;
        node.done = true;
        trace!("node {:?} done", idx);
        self.observer.node_done(idx);
    }

    // ── Synthetic items ──────────────────────────────────────────────

    fn require_drive(&self, idx: NodeIndex) -> Result<(), TreeError> {
        if self.node(idx).kind == NodeKind::Drive {
            Ok(())
        } else {
            Err(TreeError::NotADrive { node: idx })
        }
    }

    fn find_child_of_kind(&self, parent: NodeIndex, kind: NodeKind) -> Option<NodeIndex> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).kind == kind)
    }

    pub fn find_free_space_item(&self, drive: NodeIndex) -> Option<NodeIndex> {
        self.find_child_of_kind(drive, NodeKind::FreeSpace)
    }

    pub fn find_unknown_item(&self, drive: NodeIndex) -> Option<NodeIndex> {
        self.find_child_of_kind(drive, NodeKind::Unknown)
    }

    /// Add a `<Free Space>` child sized from the current free-space reading.
    pub fn create_free_space_item(
        &mut self,
        drive: NodeIndex,
        ctx: &ScanContext<'_>,
    ) -> Result<NodeIndex, TreeError> {
        self.require_drive(drive)?;
        if self.find_free_space_item(drive).is_some() {
            return Err(TreeError::DuplicateSynthetic {
                drive,
                kind: NodeKind::FreeSpace.label(),
            });
        }
        self.upward_set_undone(drive);
        let free = match ctx.fs.disk_space(&self.full_path(drive)) {
            Some(space) => space.free,
            None => {
                debug!("no free-space reading for {:?}", drive);
                0
            }
        };
        self.add_child(drive, Node::free_space(free))
    }

    /// Add an empty `<Unknown>` child; it is sized when the drive finishes.
    pub fn create_unknown_item(&mut self, drive: NodeIndex) -> Result<NodeIndex, TreeError> {
        self.require_drive(drive)?;
        if self.find_unknown_item(drive).is_some() {
            return Err(TreeError::DuplicateSynthetic {
                drive,
                kind: NodeKind::Unknown.label(),
            });
        }
        self.upward_set_undone(drive);
        self.add_child(drive, Node::unknown())
    }

    /// Bring the free-space item in line with a fresh reading.
    ///
    /// No-op when free space is not shown or the query fails.
    pub fn update_free_space_item(&mut self, drive: NodeIndex, ctx: &ScanContext<'_>) {
        if !ctx.options.show_free_space {
            return;
        }
        let Some(item) = self.find_free_space_item(drive) else {
            return;
        };
        if let Some(space) = ctx.fs.disk_space(&self.full_path(drive)) {
            self.set_leaf_size(item, space.free);
        }
    }

    /// Size the unknown item as the capacity no displayed child accounts for.
    fn settle_unknown_item(&mut self, drive: NodeIndex, unknown: NodeIndex, ctx: &ScanContext<'_>) {
        let Some(space) = ctx.fs.disk_space(&self.full_path(drive)) else {
            debug!("no capacity reading for {:?}; unknown space left unchanged", drive);
            return;
        };
        // Exclude the item's own current value from the accounted size.
        let accounted = self.node(drive).size - self.node(unknown).size;
        let mut unknown_size = space.total.saturating_sub(accounted);
        if self.find_free_space_item(drive).is_none() {
            unknown_size = unknown_size.saturating_sub(space.free);
        }
        self.set_leaf_size(unknown, unknown_size);
    }

    pub fn remove_free_space_item(&mut self, drive: NodeIndex) -> Result<(), TreeError> {
        self.require_drive(drive)?;
        self.upward_set_undone(drive);
        self.remove_child_of_kind(drive, NodeKind::FreeSpace)
    }

    pub fn remove_unknown_item(&mut self, drive: NodeIndex) -> Result<(), TreeError> {
        self.require_drive(drive)?;
        self.upward_set_undone(drive);
        self.remove_child_of_kind(drive, NodeKind::Unknown)
    }

    fn remove_child_of_kind(&mut self, drive: NodeIndex, kind: NodeKind) -> Result<(), TreeError> {
        let position = self
            .node(drive)
            .children
            .iter()
            .position(|&c| self.node(c).kind == kind);
        match position {
            Some(index) => self.remove_child(drive, index),
            None => Err(TreeError::ChildNotFound {
                parent: drive,
                index: self.node(drive).children.len(),
            }),
        }
    }

    /// Create or remove synthetic items on every drive to match `ctx.options`.
    ///
    /// Touched drives become unfinished; the scheduler settles them again.
    pub fn apply_options(&mut self, ctx: &ScanContext<'_>) -> Result<(), TreeError> {
        let Some(root) = self.root() else {
            return Ok(());
        };
        let drives: Vec<NodeIndex> = self
            .descendants(root)
            .filter(|&i| self.node(i).kind == NodeKind::Drive)
            .collect();
        for drive in drives {
            let has_free = self.find_free_space_item(drive).is_some();
            if ctx.options.show_free_space && !has_free {
                self.create_free_space_item(drive, ctx)?;
            } else if !ctx.options.show_free_space && has_free {
                self.remove_free_space_item(drive)?;
            }
            let has_unknown = self.find_unknown_item(drive).is_some();
            if ctx.options.show_unknown && !has_unknown {
                self.create_unknown_item(drive)?;
            } else if !ctx.options.show_unknown && has_unknown {
                self.remove_unknown_item(drive)?;
            } else if has_unknown && self.node(drive).done {
                // Free space visibility changes what unknown must cover.
                self.upward_set_undone(drive);
            }
        }
        Ok(())
    }

    // ── Progress ─────────────────────────────────────────────────────

    /// Bytes expected for a finished scan: used capacity per drive.
    pub fn progress_range(&self, idx: NodeIndex, fs: &dyn FileSystem) -> Option<u64> {
        match self.node(idx).kind {
            NodeKind::MyComputer => self
                .node(idx)
                .children
                .iter()
                .filter(|&&c| self.node(c).kind == NodeKind::Drive)
                .map(|&c| self.progress_range(c, fs))
                .sum(),
            NodeKind::Drive => fs.disk_space(&self.full_path(idx)).map(|s| s.used()),
            _ => None,
        }
    }

    /// Progress so far, in the unit of [`progress_range`](Self::progress_range)
    /// for drives and in items for directories.
    pub fn progress_pos(&self, idx: NodeIndex) -> u64 {
        let node = self.node(idx);
        match node.kind {
            NodeKind::MyComputer => node
                .children
                .iter()
                .filter(|&&c| self.node(c).kind == NodeKind::Drive)
                .map(|&c| self.progress_pos(c))
                .sum(),
            NodeKind::Drive => {
                let free = self
                    .find_free_space_item(idx)
                    .map_or(0, |f| self.node(f).size);
                node.size.saturating_sub(free)
            }
            _ => node.files + node.subdirs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanOptions;
    use crate::model::Attributes;
    use crate::platform::MemoryFs;
    use compact_str::CompactString;
    use std::path::PathBuf;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn file(name: &str, size: u64, secs: u64) -> Node {
        Node::file(CompactString::new(name), size, Attributes::default(), Some(at(secs)))
    }

    fn dir(name: &str) -> Node {
        Node::directory(CompactString::new(name), Attributes::default(), None, false)
    }

    fn open_dir_root(fs: &MemoryFs) -> (DirTree, NodeIndex) {
        fs.add_dir("/d");
        let options = ScanOptions::default();
        let ctx = ScanContext::new(fs, &options);
        let mut tree = DirTree::new();
        let root = tree.open(&[PathBuf::from("/d")], &ctx).unwrap();
        (tree, root)
    }

    /// `size == own_size + Σ children.size` and the count equivalents.
    fn assert_consistent(tree: &DirTree, idx: NodeIndex) {
        let node = tree.node(idx);
        let children = node.children();
        let size: u64 = children.iter().map(|&c| tree.node(c).size()).sum();
        let files: u64 = children.iter().map(|&c| tree.node(c).files_count()).sum();
        let dirs: u64 = children.iter().map(|&c| tree.node(c).dir_contribution()).sum();
        assert_eq!(node.size(), node.own_size() + size, "size at {idx:?}");
        let own_file = u64::from(node.kind == NodeKind::File);
        assert_eq!(node.files_count(), own_file + files, "files at {idx:?}");
        assert_eq!(node.subdirs_count(), dirs, "subdirs at {idx:?}");
        for &c in children {
            assert!(node.last_change() >= tree.node(c).last_change());
            assert_consistent(tree, c);
        }
    }

    #[test]
    fn add_child_propagates_to_every_ancestor() {
        let fs = MemoryFs::new();
        let (mut tree, root) = open_dir_root(&fs);
        let e = tree.add_child(root, dir("e")).unwrap();
        tree.add_child(root, file("a", 100, 10)).unwrap();
        tree.add_child(root, file("b", 50, 20)).unwrap();
        tree.add_child(e, file("c", 25, 30)).unwrap();

        assert_eq!(tree.node(root).size(), 175);
        assert_eq!(tree.node(root).files_count(), 3);
        assert_eq!(tree.node(root).subdirs_count(), 1);
        assert_eq!(tree.node(root).last_change(), Some(at(30)));
        assert_consistent(&tree, root);
    }

    #[test]
    fn removing_restores_totals_and_lowers_last_change() {
        let fs = MemoryFs::new();
        let (mut tree, root) = open_dir_root(&fs);
        let e = tree.add_child(root, dir("e")).unwrap();
        tree.add_child(root, file("a", 100, 10)).unwrap();
        tree.add_child(e, file("c", 25, 30)).unwrap();

        tree.remove_child(root, 0).unwrap();
        assert_eq!(tree.node(root).size(), 100);
        assert_eq!(tree.node(root).files_count(), 1);
        assert_eq!(tree.node(root).subdirs_count(), 0);
        assert_eq!(tree.node(root).last_change(), Some(at(10)));
        assert_consistent(&tree, root);
    }

    #[test]
    fn remove_all_children_zeroes_the_subtree() {
        let fs = MemoryFs::new();
        let (mut tree, root) = open_dir_root(&fs);
        let e = tree.add_child(root, dir("e")).unwrap();
        tree.add_child(e, file("c", 25, 30)).unwrap();
        tree.add_child(root, file("a", 100, 10)).unwrap();

        tree.remove_all_children(root);
        assert_eq!(tree.node(root).size(), 0);
        assert_eq!(tree.node(root).items_count(), 0);
        assert_eq!(tree.node(root).read_jobs(), 1);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn adding_to_a_finished_node_is_rejected() {
        let fs = MemoryFs::new();
        let (mut tree, root) = open_dir_root(&fs);
        let options = ScanOptions::default();
        let ctx = ScanContext::new(&fs, &options);
        tree.set_done(root, &ctx);
        assert_eq!(
            tree.add_child(root, file("late", 1, 1)),
            Err(TreeError::ParentDone { parent: root })
        );
    }

    #[test]
    fn removing_a_missing_child_is_rejected() {
        let fs = MemoryFs::new();
        let (mut tree, root) = open_dir_root(&fs);
        assert_eq!(
            tree.remove_child(root, 3),
            Err(TreeError::ChildNotFound { parent: root, index: 3 })
        );
    }

    #[test]
    fn last_change_update_is_monotonic() {
        let fs = MemoryFs::new();
        let (mut tree, root) = open_dir_root(&fs);
        let e = tree.add_child(root, dir("e")).unwrap();
        tree.upward_update_last_change(e, at(50));
        tree.upward_update_last_change(e, at(40));
        assert_eq!(tree.node(e).last_change(), Some(at(50)));
        assert_eq!(tree.node(root).last_change(), Some(at(50)));
    }

    #[test]
    fn read_jobs_count_pending_containers() {
        let fs = MemoryFs::new();
        let (mut tree, root) = open_dir_root(&fs);
        let e = tree.add_child(root, dir("e")).unwrap();
        tree.add_child(e, dir("f")).unwrap();
        assert_eq!(tree.node(root).read_jobs(), 3);

        tree.set_read_job_done(e, true);
        tree.set_read_job_done(e, true);
        assert_eq!(tree.node(root).read_jobs(), 2);

        tree.set_read_job_done(e, false);
        assert_eq!(tree.node(root).read_jobs(), 3);
    }

    #[test]
    fn leaf_resize_moves_the_difference_upward() {
        let fs = MemoryFs::new();
        let (mut tree, root) = open_dir_root(&fs);
        let a = tree.add_child(root, file("a", 100, 1)).unwrap();
        tree.set_leaf_size(a, 40);
        assert_eq!(tree.node(root).size(), 40);
        tree.set_leaf_size(a, 90);
        assert_eq!(tree.node(root).size(), 90);
    }

    #[test]
    fn synthetic_items_require_a_drive() {
        let fs = MemoryFs::new();
        let (mut tree, root) = open_dir_root(&fs);
        assert_eq!(
            tree.create_unknown_item(root),
            Err(TreeError::NotADrive { node: root })
        );
    }

    #[test]
    fn drive_gets_free_and_unknown_items() {
        let fs = MemoryFs::new();
        fs.add_volume("/vol", 1000, 200);
        let options = ScanOptions::default();
        let ctx = ScanContext::new(&fs, &options);
        let mut tree = DirTree::new();
        let drive = tree.open(&[PathBuf::from("/vol")], &ctx).unwrap();

        assert_eq!(tree.node(drive).kind, NodeKind::Drive);
        let free = tree.find_free_space_item(drive).unwrap();
        assert_eq!(tree.node(free).size(), 200);
        assert!(tree.find_unknown_item(drive).is_some());
        assert_eq!(
            tree.create_unknown_item(drive),
            Err(TreeError::DuplicateSynthetic {
                drive,
                kind: NodeKind::Unknown.label()
            })
        );
    }

    #[test]
    fn free_space_follows_the_volume() {
        let fs = MemoryFs::new();
        fs.add_volume("/vol", 1000, 200);
        let options = ScanOptions::default();
        let ctx = ScanContext::new(&fs, &options);
        let mut tree = DirTree::new();
        let drive = tree.open(&[PathBuf::from("/vol")], &ctx).unwrap();

        fs.set_free("/vol", 150);
        tree.update_free_space_item(drive, &ctx);
        let free = tree.find_free_space_item(drive).unwrap();
        assert_eq!(tree.node(free).size(), 150);
        assert_eq!(tree.node(drive).size(), 150);
    }

    #[test]
    fn removing_free_space_item_shrinks_the_drive() {
        let fs = MemoryFs::new();
        fs.add_volume("/vol", 1000, 200);
        let options = ScanOptions::default();
        let ctx = ScanContext::new(&fs, &options);
        let mut tree = DirTree::new();
        let drive = tree.open(&[PathBuf::from("/vol")], &ctx).unwrap();

        tree.remove_free_space_item(drive).unwrap();
        assert!(tree.find_free_space_item(drive).is_none());
        assert_eq!(tree.node(drive).size(), 0);
        assert!(tree.remove_free_space_item(drive).is_err());
    }
}
