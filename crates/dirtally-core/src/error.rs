/// Error types of the core engine.
///
/// [`TreeError`] signals a broken invariant: the scheduler or a caller
/// asked for a mutation the tree cannot honour. These indicate bugs, not
/// user-facing conditions. Filesystem trouble never surfaces as a
/// `TreeError`; it is absorbed where it happens.
use crate::model::NodeIndex;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("cannot add a child to finished node {parent:?}")]
    ParentDone { parent: NodeIndex },

    #[error("node {parent:?} has no child at position {index}")]
    ChildNotFound { parent: NodeIndex, index: usize },

    #[error("synthetic node {node:?} cannot be refreshed")]
    SyntheticRefresh { node: NodeIndex },

    #[error("node {node:?} is not a drive")]
    NotADrive { node: NodeIndex },

    #[error("drive {drive:?} already owns a {kind} item")]
    DuplicateSynthetic { drive: NodeIndex, kind: &'static str },

    #[error("refresh of {node:?} left {remaining} in {field}")]
    UnbalancedRefresh {
        node: NodeIndex,
        field: &'static str,
        remaining: u64,
    },

    #[error("the tree has no root")]
    NoRoot,
}

/// A directory listing could not be produced.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("cannot list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("access denied: {path}")]
    AccessDenied { path: PathBuf },

    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },
}
