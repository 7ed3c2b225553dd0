/// Per-extension statistics over a scanned subtree.
///
/// Every file is bucketed by its lower-cased extension (with the leading
/// dot; files without one share the `"."` bucket) and the buckets are
/// ranked by bytes. Each bucket also carries a broad category for grouped
/// display.
use crate::model::{DirTree, NodeIndex, NodeKind};
use compact_str::CompactString;
use serde::Serialize;
use std::collections::HashMap;

/// Broad file type categories for grouped display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileCategory {
    Documents,
    Images,
    Video,
    Audio,
    Archives,
    Code,
    Executables,
    System,
    Other,
}

impl FileCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Documents => "Documents",
            Self::Images => "Images",
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::Archives => "Archives",
            Self::Code => "Code",
            Self::Executables => "Executables",
            Self::System => "System",
            Self::Other => "Other",
        }
    }
}

/// Categorise a lower-cased extension, with or without its leading dot.
pub fn categorise_extension(ext: &str) -> FileCategory {
    match ext.trim_start_matches('.') {
        "doc" | "docx" | "pdf" | "txt" | "rtf" | "odt" | "xls" | "xlsx" | "ppt" | "pptx"
        | "csv" | "md" | "epub" => FileCategory::Documents,
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" | "ico" | "tiff" | "tif"
        | "psd" | "raw" | "heic" => FileCategory::Images,
        "mp4" | "mkv" | "avi" | "mov" | "wmv" | "webm" | "m4v" | "mpg" | "mpeg" => {
            FileCategory::Video
        }
        "mp3" | "wav" | "flac" | "aac" | "ogg" | "wma" | "m4a" | "opus" => FileCategory::Audio,
        "zip" | "rar" | "7z" | "tar" | "gz" | "bz2" | "xz" | "zst" | "cab" | "iso" | "dmg" => {
            FileCategory::Archives
        }
        "rs" | "py" | "js" | "ts" | "c" | "cpp" | "h" | "hpp" | "cs" | "java" | "go" | "rb"
        | "html" | "css" | "json" | "xml" | "yaml" | "yml" | "toml" | "sql" | "sh" => {
            FileCategory::Code
        }
        "exe" | "msi" | "dll" | "so" | "dylib" | "app" | "com" => FileCategory::Executables,
        "sys" | "drv" | "inf" | "log" | "dat" | "reg" | "tmp" | "bak" => FileCategory::System,
        _ => FileCategory::Other,
    }
}

/// Totals of one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionRecord {
    pub extension: CompactString,
    pub category: FileCategory,
    pub bytes: u64,
    pub files: u64,
}

/// Bucket every file below `root` by extension, largest bucket first.
///
/// Ties are broken by extension so the order is stable.
pub fn collect_extension_data(tree: &DirTree, root: NodeIndex) -> Vec<ExtensionRecord> {
    let mut buckets: HashMap<CompactString, (u64, u64)> = HashMap::new();
    for idx in tree.descendants(root) {
        let node = tree.node(idx);
        if node.kind != NodeKind::File {
            continue;
        }
        let entry = buckets.entry(node.extension()).or_default();
        entry.0 += node.size();
        entry.1 += 1;
    }

    let mut records: Vec<ExtensionRecord> = buckets
        .into_iter()
        .map(|(extension, (bytes, files))| ExtensionRecord {
            category: categorise_extension(&extension),
            extension,
            bytes,
            files,
        })
        .collect();
    records.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.extension.cmp(&b.extension)));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScanContext, ScanOptions};
    use crate::platform::MemoryFs;
    use crate::scanner::budget::Unbounded;
    use std::path::PathBuf;

    #[test]
    fn categorise_is_dot_agnostic() {
        assert_eq!(categorise_extension(".jpg"), FileCategory::Images);
        assert_eq!(categorise_extension("rs"), FileCategory::Code);
        assert_eq!(categorise_extension("."), FileCategory::Other);
    }

    #[test]
    fn extensions_are_grouped_case_insensitively() {
        let fs = MemoryFs::new();
        fs.add_file("/p/a.JPG", 300);
        fs.add_file("/p/sub/b.jpg", 200);
        fs.add_file("/p/main.rs", 400);
        fs.add_file("/p/Makefile", 10);
        let options = ScanOptions::default();
        let ctx = ScanContext::new(&fs, &options);
        let mut tree = DirTree::new();
        let root = tree.open(&[PathBuf::from("/p")], &ctx).unwrap();
        tree.do_some_work(root, &ctx, &mut Unbounded).unwrap();

        let records = collect_extension_data(&tree, root);
        let summary: Vec<(&str, u64, u64)> = records
            .iter()
            .map(|r| (r.extension.as_str(), r.bytes, r.files))
            .collect();
        assert_eq!(summary, vec![(".jpg", 500, 2), (".rs", 400, 1), (".", 10, 1)]);
        assert_eq!(records[0].category, FileCategory::Images);
    }

    #[test]
    fn record_serializes_extension_as_a_string() {
        let record = ExtensionRecord {
            extension: CompactString::new(".png"),
            category: FileCategory::Images,
            bytes: 2048,
            files: 3,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["extension"], ".png");
        assert_eq!(value["category"], "Images");
        assert_eq!(value["bytes"], 2048);
    }
}
