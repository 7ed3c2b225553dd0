//! DirTally — incremental directory statistics.
//!
//! Thin binary entry point. All logic lives in the `dirtally-core` crate.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use dirtally_core::analysis::{collect_extension_data, largest_files};
use dirtally_core::export::{export_csv, export_json};
use dirtally_core::model::format::{format_count, format_fraction, format_last_change, format_size};
use dirtally_core::platform::LocalFs;
use dirtally_core::scanner::progress::ScanProgress;
use dirtally_core::scanner::start_scan;
use dirtally_core::{DirTree, NodeIndex, Settings};

/// Column the top-level listing is ordered by.
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum SortColumn {
    /// Largest first
    #[default]
    Size,
    Name,
    /// Attribute priority, read-only first
    Attributes,
    /// Most recently changed first
    LastChange,
}

#[derive(Parser, Debug)]
#[command(name = "dirtally", version, about = "Incremental directory statistics")]
struct Cli {
    /// Paths to scan; several paths are grouped under one root (default: current directory)
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Descend into volumes mounted below the scanned paths
    #[arg(long)]
    follow_mount_points: bool,

    /// Descend into junctions and directory symlinks
    #[arg(long)]
    follow_junctions: bool,

    /// Ignore hidden files and directories
    #[arg(long)]
    skip_hidden: bool,

    /// Do not add a <Free Space> item to drives
    #[arg(long)]
    no_free_space: bool,

    /// Do not add an <Unknown> item to drives
    #[arg(long)]
    no_unknown: bool,

    /// Length of one scan slice in milliseconds
    #[arg(long)]
    slice_ms: Option<u64>,

    /// Order of the top-level listing
    #[arg(long, value_enum, default_value_t = SortColumn::Size)]
    sort: SortColumn,

    /// Show the N largest files
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Show the N largest extensions
    #[arg(long, value_name = "N")]
    extensions: Option<usize>,

    /// Export the tree as JSON to file
    #[arg(long)]
    export_json: Option<PathBuf>,

    /// Maximum depth of the JSON export
    #[arg(long)]
    json_depth: Option<usize>,

    /// Export one CSV row per node to file
    #[arg(long)]
    export_csv: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialise structured logging (stderr keeps stdout for the report).
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.options.follow_mount_points |= cli.follow_mount_points;
    settings.options.follow_junctions |= cli.follow_junctions;
    settings.options.skip_hidden |= cli.skip_hidden;
    if cli.no_free_space {
        settings.options.show_free_space = false;
    }
    if cli.no_unknown {
        settings.options.show_unknown = false;
    }
    if let Some(ms) = cli.slice_ms {
        settings.time_slice_ms = ms;
    }

    let roots = cli
        .paths
        .iter()
        .map(|p| std::fs::canonicalize(p).with_context(|| format!("cannot resolve {}", p.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    tracing::info!("DirTally starting");
    let handle = start_scan(roots, settings, Arc::new(LocalFs::new()));

    let mut error_count = 0;
    let mut duration = None;
    for message in handle.progress_rx.iter() {
        match message {
            ScanProgress::Update { .. } => {
                if let Some(fraction) = message.fraction() {
                    tracing::debug!("progress {}", format_fraction(fraction));
                }
            }
            ScanProgress::Error { path, message } => {
                tracing::warn!("{path}: {message}");
            }
            ScanProgress::Complete {
                duration: took,
                error_count: errors,
            } => {
                duration = Some(took);
                error_count = errors;
                break;
            }
            ScanProgress::RootUnlinked => anyhow::bail!("scan root vanished"),
            ScanProgress::Cancelled => anyhow::bail!("scan cancelled"),
            ScanProgress::Refreshed { .. } => {}
        }
    }
    let Some(duration) = duration else {
        anyhow::bail!("scanner stopped without completing");
    };

    {
        let tree = handle.live_tree.read();
        let root = tree.root().context("scan produced no tree")?;
        let node = tree.node(root);

        println!("{}", node.name);
        println!(
            "  {}  {} files  {} folders  last change {}",
            format_size(node.size()),
            format_count(node.files_count()),
            format_count(node.subdirs_count()),
            format_last_change(node.last_change()),
        );
        println!("  scanned in {duration:.2?}, {error_count} unreadable folder(s)");
        println!();
        for child in sorted_children(&tree, root, cli.sort) {
            let c = tree.node(child);
            println!(
                "  {:>10}  {:>6}  {}",
                format_size(c.size()),
                format_fraction(tree.fraction(child)),
                c.name
            );
        }

        if let Some(n) = cli.top {
            println!();
            println!("Largest files:");
            for file in largest_files(&tree, root, n) {
                println!("  {:>10}  {}", format_size(file.size), file.path.display());
            }
        }

        if let Some(n) = cli.extensions {
            println!();
            println!("Extensions:");
            for record in collect_extension_data(&tree, root).into_iter().take(n) {
                println!(
                    "  {:>10}  {:>8} files  {:<8} {}",
                    format_size(record.bytes),
                    format_count(record.files),
                    record.extension.as_str(),
                    record.category.label()
                );
            }
        }

        if let Some(path) = &cli.export_json {
            let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            export_json(&tree, root, cli.json_depth, BufWriter::new(file))?;
            println!("Exported JSON to: {}", path.display());
        }
        if let Some(path) = &cli.export_csv {
            let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            export_csv(&tree, root, BufWriter::new(file))?;
            println!("Exported CSV to: {}", path.display());
        }
    }

    handle.cancel();
    Ok(())
}

fn sorted_children(tree: &DirTree, idx: NodeIndex, column: SortColumn) -> Vec<NodeIndex> {
    let mut children = tree.children(idx).to_vec();
    match column {
        // Finished nodes already keep their children largest first.
        SortColumn::Size => {}
        SortColumn::Name => {
            children.sort_by_key(|&c| tree.node(c).name.to_lowercase());
        }
        SortColumn::Attributes => {
            children.sort_by_key(|&c| std::cmp::Reverse(tree.node(c).attributes().sort_key()));
        }
        SortColumn::LastChange => {
            children.sort_by_key(|&c| std::cmp::Reverse(tree.node(c).last_change()));
        }
    }
    children
}
