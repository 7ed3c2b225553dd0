/// Refresh controller — rescan one node in place.
///
/// The node's whole contribution is withdrawn from every ancestor, its
/// children are destroyed, and the path is read again. A vanished path
/// detaches the node; anything else is rebuilt synchronously with an
/// unbounded budget.
use super::budget::Unbounded;
use super::schedule::is_dont_follow;
use crate::aggregate::Totals;
use crate::config::ScanContext;
use crate::error::TreeError;
use crate::model::{Attributes, DirTree, NodeIndex, NodeKind};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// What a refresh found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshOutcome {
    /// The node was rebuilt from the current disk contents.
    Refreshed,
    /// The path is gone; the node was removed (or the tree emptied, for the root).
    Deleted,
}

impl DirTree {
    /// Rescan `idx` in place.
    ///
    /// Fails for synthetic items. A MyComputer root refreshes each of its
    /// children. Ancestors are left unfinished; the next scheduler pass
    /// over the root settles them.
    pub fn start_refresh(&mut self, idx: NodeIndex, ctx: &ScanContext<'_>) -> Result<RefreshOutcome, TreeError> {
        let kind = self.node(idx).kind;
        if kind.is_synthetic() {
            return Err(TreeError::SyntheticRefresh { node: idx });
        }
        self.node_mut(idx).ticks_worked = Duration::ZERO;

        if kind == NodeKind::MyComputer {
            self.upward_set_undone(idx);
            let children = self.node(idx).children.clone();
            for child in children {
                self.start_refresh(child, ctx)?;
            }
            self.do_some_work(idx, ctx, &mut Unbounded)?;
            return Ok(RefreshOutcome::Refreshed);
        }

        let view = self.observer.capture_view_state(idx);
        self.withdraw(idx)?;

        let path = self.full_path(idx);
        let record = if ctx.fs.path_exists(&path) {
            ctx.fs.stat(&path)
        } else {
            None
        };
        let Some(record) = record else {
            info!("{} no longer exists", path.display());
            match self.node(idx).parent {
                None => {
                    self.observer.root_unlinked();
                    self.unlink_root();
                }
                Some(parent) => {
                    if let Some(index) = self.find_child_index(parent, idx) {
                        self.remove_child(parent, index)?;
                    }
                }
            }
            return Ok(RefreshOutcome::Deleted);
        };

        let is_scan_root = self.node(idx).base_path.is_some();
        {
            let node = self.node_mut(idx);
            node.own_last_change = record.last_write;
            if !is_scan_root {
                node.attributes = Attributes::from_raw(record.attributes);
            }
        }
        if let Some(t) = record.last_write {
            self.upward_update_last_change(idx, t);
        }

        if kind == NodeKind::File {
            self.node_mut(idx).own_size = record.size;
            self.upward_add(
                idx,
                Totals {
                    size: record.size,
                    files: 1,
                    ..Totals::default()
                },
            );
            self.set_done(idx, ctx);
            debug!("refreshed file {}", path.display());
            return Ok(RefreshOutcome::Refreshed);
        }

        if kind == NodeKind::Directory && !is_scan_root && is_dont_follow(ctx, &path, &record) {
            // Still a leaf under the current policy.
            self.do_some_work(idx, ctx, &mut Unbounded)?;
            self.observer.restore_view_state(idx, view);
            return Ok(RefreshOutcome::Refreshed);
        }

        self.set_read_job_done(idx, false);
        self.attach_synthetic_items(idx, ctx)?;
        self.do_some_work(idx, ctx, &mut Unbounded)?;
        self.observer.restore_view_state(idx, view);
        info!(
            "refreshed {}: {} bytes in {} files",
            path.display(),
            self.node(idx).size,
            self.node(idx).files
        );
        Ok(RefreshOutcome::Refreshed)
    }

    /// Take the node's entire contribution out of every ancestor and
    /// leave it childless with all totals at zero.
    fn withdraw(&mut self, idx: NodeIndex) -> Result<(), TreeError> {
        self.node_mut(idx).own_last_change = None;
        self.upward_set_undone(idx);
        self.remove_all_children(idx);

        self.set_read_job_done(idx, true);
        let node = self.node(idx);
        let residual = Totals {
            size: node.own_size,
            files: u64::from(node.kind == NodeKind::File),
            ..Totals::default()
        };
        self.upward_subtract(idx, residual);
        self.node_mut(idx).own_size = 0;
        self.upward_recalc_last_change(idx);

        let node = self.node(idx);
        let leftovers = [
            ("read_jobs", node.read_jobs),
            ("files", node.files),
            ("subdirs", node.subdirs),
            ("size", node.size),
        ];
        for (field, remaining) in leftovers {
            if remaining != 0 {
                return Err(TreeError::UnbalancedRefresh {
                    node: idx,
                    field,
                    remaining,
                });
            }
        }
        Ok(())
    }
}
