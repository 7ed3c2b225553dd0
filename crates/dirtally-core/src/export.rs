/// Report export — JSON snapshot and flat CSV of a (sub)tree.
///
/// Both formats identify a node by its report path: the absolute path for
/// filesystem-backed nodes, the drive path joined with the display name
/// for synthetic items.
use crate::model::{DirTree, NodeIndex, NodeKind};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::io::Write;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode JSON report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot encode CSV report: {0}")]
    Csv(#[from] csv::Error),
}

/// One node of the JSON snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub kind: NodeKind,
    pub path: String,
    pub size: u64,
    pub files: u64,
    pub subdirs: u64,
    /// RFC 3339, UTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change: Option<String>,
    pub attributes: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeReport>,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    path: &'a str,
    kind: &'static str,
    size: u64,
    files: u64,
    subdirs: u64,
    last_change: &'a str,
    attributes: &'a str,
}

fn rfc3339(time: Option<SystemTime>) -> Option<String> {
    time.map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Build the nested report for `idx`. Children deeper than `max_depth`
/// levels below `idx` are omitted; `None` means unlimited.
pub fn build_report(tree: &DirTree, idx: NodeIndex, max_depth: Option<usize>) -> NodeReport {
    let node = tree.node(idx);
    let children = match max_depth {
        Some(0) => Vec::new(),
        _ => node
            .children()
            .iter()
            .map(|&c| build_report(tree, c, max_depth.map(|d| d - 1)))
            .collect(),
    };
    NodeReport {
        name: node.name.to_string(),
        kind: node.kind,
        path: tree.full_path(idx).display().to_string(),
        size: node.size(),
        files: node.files_count(),
        subdirs: node.subdirs_count(),
        last_change: rfc3339(node.last_change()),
        attributes: node.attributes().to_string(),
        done: node.is_done(),
        children,
    }
}

/// Write the subtree below `root` as pretty-printed JSON.
pub fn export_json<W: Write>(
    tree: &DirTree,
    root: NodeIndex,
    max_depth: Option<usize>,
    mut writer: W,
) -> Result<(), ExportError> {
    let report = build_report(tree, root, max_depth);
    serde_json::to_writer_pretty(&mut writer, &report)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Write one CSV row per node below `root`, in pre-order.
pub fn export_csv<W: Write>(tree: &DirTree, root: NodeIndex, writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for idx in tree.descendants(root) {
        let node = tree.node(idx);
        let path = tree.full_path(idx).display().to_string();
        let last_change = rfc3339(node.last_change()).unwrap_or_default();
        let attributes = node.attributes().to_string();
        wtr.serialize(CsvRow {
            path: &path,
            kind: node.kind.label(),
            size: node.size(),
            files: node.files_count(),
            subdirs: node.subdirs_count(),
            last_change: &last_change,
            attributes: &attributes,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScanContext, ScanOptions};
    use crate::platform::MemoryFs;
    use crate::scanner::budget::Unbounded;
    use std::path::PathBuf;
    use std::time::Duration;

    fn scanned() -> (DirTree, NodeIndex) {
        let fs = MemoryFs::new();
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        fs.add_file_with("/r/a.txt", 100, 0, Some(t));
        fs.add_file("/r/sub/b.bin", 20);
        let options = ScanOptions::default();
        let ctx = ScanContext::new(&fs, &options);
        let mut tree = DirTree::new();
        let root = tree.open(&[PathBuf::from("/r")], &ctx).unwrap();
        tree.do_some_work(root, &ctx, &mut Unbounded).unwrap();
        (tree, root)
    }

    #[test]
    fn json_report_nests_children() {
        let (tree, root) = scanned();
        let mut out = Vec::new();
        export_json(&tree, root, None, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["size"], 120);
        assert_eq!(value["kind"], "Directory");
        assert_eq!(value["last_change"], "1970-01-02T00:00:00Z");
        assert_eq!(value["children"][0]["name"], "a.txt");
        assert_eq!(value["children"][1]["children"][0]["path"], "/r/sub/b.bin");
    }

    #[test]
    fn json_depth_limit_prunes_children() {
        let (tree, root) = scanned();
        let report = build_report(&tree, root, Some(1));
        assert_eq!(report.children.len(), 2);
        assert!(report.children.iter().all(|c| c.children.is_empty()));
    }

    #[test]
    fn csv_has_a_row_per_node() {
        let (tree, root) = scanned();
        let mut out = Vec::new();
        export_csv(&tree, root, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "path,kind,size,files,subdirs,last_change,attributes");
        assert_eq!(lines.len(), 1 + tree.len());
        assert!(lines[1].starts_with("/r,Directory,120,2,1,"));
    }
}
