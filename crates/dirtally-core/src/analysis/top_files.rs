/// Top-N largest files below a node.
use crate::model::{DirTree, NodeIndex, NodeKind};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;

/// A single entry in the "largest files" results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargestFile {
    /// Index into the tree arena. Valid until the next structural change.
    pub index: NodeIndex,
    pub path: PathBuf,
    pub size: u64,
}

/// The `n` largest files below `root`, largest first.
///
/// Keeps a bounded min-heap so memory stays proportional to `n`.
pub fn largest_files(tree: &DirTree, root: NodeIndex, n: usize) -> Vec<LargestFile> {
    if n == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<(u64, NodeIndex)>> = BinaryHeap::with_capacity(n + 1);
    for idx in tree.descendants(root) {
        let node = tree.node(idx);
        if node.kind != NodeKind::File {
            continue;
        }
        heap.push(Reverse((node.size(), idx)));
        if heap.len() > n {
            heap.pop();
        }
    }

    let mut sorted: Vec<(u64, NodeIndex)> = heap.into_iter().map(|Reverse(entry)| entry).collect();
    sorted.sort_by(|a, b| b.cmp(a));
    sorted
        .into_iter()
        .map(|(size, index)| LargestFile {
            index,
            path: tree.full_path(index),
            size,
        })
        .collect()
}
