/// Scan scheduler — the resumable, time-sliced walk.
///
/// The tree itself is the continuation: every node remembers whether its
/// listing was read, whether it is done, and how long it has been worked
/// on. `do_some_work` can therefore be abandoned at any budget check and
/// called again later on the same node.
///
/// Per container the states are
/// `not enumerated → enumerated, unfinished → done`. Listing a directory
/// happens in one go; only the recursion into children is sliced.
use super::budget::WorkBudget;
use crate::config::ScanContext;
use crate::error::TreeError;
use crate::model::{Attributes, DirTree, Node, NodeIndex, NodeKind};
use crate::platform::DirEntryRecord;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

impl DirTree {
    /// Advance the scan below `idx` until the budget runs out or the
    /// node is done.
    ///
    /// A done node is left untouched. Every call performs at least one
    /// unit of work on an unfinished node, so repeated calls always
    /// terminate, even with an already exhausted budget. Errors are
    /// invariant violations only; filesystem trouble is absorbed.
    pub fn do_some_work(
        &mut self,
        idx: NodeIndex,
        ctx: &ScanContext<'_>,
        budget: &mut dyn WorkBudget,
    ) -> Result<(), TreeError> {
        if self.node(idx).done {
            return Ok(());
        }
        let start = Instant::now();
        let result = self.work_on(idx, ctx, budget);
        self.node_mut(idx).ticks_worked += start.elapsed();
        result
    }

    fn work_on(
        &mut self,
        idx: NodeIndex,
        ctx: &ScanContext<'_>,
        budget: &mut dyn WorkBudget,
    ) -> Result<(), TreeError> {
        let kind = self.node(idx).kind;
        if !kind.is_container() {
            self.set_done(idx, ctx);
            return Ok(());
        }

        if kind.is_enumerable() && !self.node(idx).read_job_done {
            self.read_directory(idx, ctx, budget)?;
            if kind == NodeKind::Drive {
                self.update_free_space_item(idx, ctx);
            }
            if self.node(idx).children.is_empty() {
                self.set_done(idx, ctx);
                return Ok(());
            }
            if budget.is_exhausted() {
                return Ok(());
            }
        }

        if self.node(idx).children.is_empty() {
            self.set_done(idx, ctx);
            return Ok(());
        }

        loop {
            let Some(next) = self.least_worked_child(idx) else {
                self.set_done(idx, ctx);
                return Ok(());
            };
            budget.yield_now();
            self.do_some_work(next, ctx, budget)?;
            if budget.is_exhausted() {
                return Ok(());
            }
        }
    }

    /// Unfinished child with the smallest `ticks_worked`; first wins on ties.
    fn least_worked_child(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.node(idx)
            .children
            .iter()
            .copied()
            .filter(|&c| !self.node(c).done)
            .min_by_key(|&c| self.node(c).ticks_worked)
    }

    /// List the directory behind `idx` once and attach its entries.
    ///
    /// Subdirectories are attached before files. A listing that cannot be
    /// produced leaves the node with no children and is recorded as a
    /// failure.
    fn read_directory(
        &mut self,
        idx: NodeIndex,
        ctx: &ScanContext<'_>,
        budget: &mut dyn WorkBudget,
    ) -> Result<(), TreeError> {
        let path = self.full_path(idx);
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        match ctx.fs.read_dir(&path) {
            Ok(entries) => {
                for record in entries {
                    budget.yield_now();
                    if ctx.options.skip_hidden && record.attributes.is_hidden() {
                        continue;
                    }
                    if record.is_dir {
                        dirs.push(record);
                    } else {
                        files.push(record);
                    }
                }
            }
            Err(err) => {
                warn!("{err}");
                self.enumeration_failures += 1;
                self.pending_failures.push((path.clone(), err.to_string()));
            }
        }

        debug!(
            "listed {}: {} dirs, {} files",
            path.display(),
            dirs.len(),
            files.len()
        );
        for record in dirs {
            self.add_directory(idx, &path, record, ctx)?;
        }
        for record in files {
            self.add_file(idx, record)?;
        }
        self.set_read_job_done(idx, true);
        Ok(())
    }

    fn add_directory(
        &mut self,
        parent: NodeIndex,
        parent_path: &Path,
        record: DirEntryRecord,
        ctx: &ScanContext<'_>,
    ) -> Result<NodeIndex, TreeError> {
        let child_path = parent_path.join(record.name.as_str());
        let dont_follow = is_dont_follow(ctx, &child_path, &record);
        if dont_follow {
            debug!("not descending into {}", child_path.display());
        }
        let node = Node::directory(
            record.name,
            Attributes::from_raw(record.attributes),
            record.last_write,
            dont_follow,
        );
        self.add_child(parent, node)
    }

    fn add_file(&mut self, parent: NodeIndex, record: DirEntryRecord) -> Result<NodeIndex, TreeError> {
        let node = Node::file(
            record.name,
            record.size,
            Attributes::from_raw(record.attributes),
            record.last_write,
        );
        self.add_child(parent, node)
    }
}

/// Whether a subdirectory is a mount point or junction that the current
/// policy says not to enter.
pub(crate) fn is_dont_follow(ctx: &ScanContext<'_>, path: &Path, record: &DirEntryRecord) -> bool {
    let is_mount = !ctx.options.follow_mount_points && ctx.fs.is_volume_mount_point(path);
    let is_junction = !ctx.options.follow_junctions && ctx.fs.is_junction(record.attributes);
    is_mount || is_junction
}
