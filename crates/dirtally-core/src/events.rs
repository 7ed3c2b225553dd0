/// View notifications published by the tree.
///
/// The core never talks to a widget. Whatever renders the tree implements
/// [`TreeObserver`], or subscribes through a [`ChannelObserver`] and drains
/// [`TreeEvent`]s on its own thread.
///
/// Ordering guarantees:
/// - `child_added` fires after the new child's totals reached every ancestor.
/// - `child_removed` / `removing_all_children` fire while the children still
///   exist, before any total is subtracted.
use crate::model::NodeIndex;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// UI-adjacent state preserved across a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewState {
    pub was_visible: bool,
    pub was_expanded: bool,
    pub scroll_offset: i32,
}

/// Receiver of structural changes. All methods default to no-ops.
pub trait TreeObserver: Send + Sync {
    fn child_added(&self, _parent: NodeIndex, _child: NodeIndex) {}

    fn child_removed(&self, _parent: NodeIndex, _child: NodeIndex) {}

    fn removing_all_children(&self, _parent: NodeIndex) {}

    /// The node finished scanning and its children were re-sorted by size.
    fn node_done(&self, _node: NodeIndex) {}

    /// The scan root vanished from disk; the tree is now empty.
    fn root_unlinked(&self) {}

    /// Called before a refresh tears the node down.
    fn capture_view_state(&self, _node: NodeIndex) -> ViewState {
        ViewState::default()
    }

    /// Called once the refreshed node has been rebuilt.
    fn restore_view_state(&self, _node: NodeIndex, _state: ViewState) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl TreeObserver for NullObserver {}

/// Structural change as sent over a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    ChildAdded { parent: NodeIndex, child: NodeIndex },
    ChildRemoved { parent: NodeIndex, child: NodeIndex },
    RemovingAllChildren { parent: NodeIndex },
    NodeDone { node: NodeIndex },
    RootUnlinked,
    RestoreViewState { node: NodeIndex, state: ViewState },
}

/// Forwards every notification into a crossbeam channel.
///
/// Uses `try_send`: a full or disconnected channel drops events rather
/// than stalling the scanner while it holds the tree lock. Every lost
/// event is counted; a view that sees a non-zero count must resync from
/// the tree. Hosts that cannot lose events install their own
/// [`TreeObserver`] instead.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<TreeEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<TreeEvent>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared count of events that could not be delivered.
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    fn send(&self, event: TreeEvent) {
        if self.tx.try_send(event).is_err() && self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
            warn!("tree event channel is full or closed; events are being dropped");
        }
    }
}

impl TreeObserver for ChannelObserver {
    fn child_added(&self, parent: NodeIndex, child: NodeIndex) {
        self.send(TreeEvent::ChildAdded { parent, child });
    }

    fn child_removed(&self, parent: NodeIndex, child: NodeIndex) {
        self.send(TreeEvent::ChildRemoved { parent, child });
    }

    fn removing_all_children(&self, parent: NodeIndex) {
        self.send(TreeEvent::RemovingAllChildren { parent });
    }

    fn node_done(&self, node: NodeIndex) {
        self.send(TreeEvent::NodeDone { node });
    }

    fn root_unlinked(&self) {
        self.send(TreeEvent::RootUnlinked);
    }

    fn restore_view_state(&self, node: NodeIndex, state: ViewState) {
        self.send(TreeEvent::RestoreViewState { node, state });
    }
}
