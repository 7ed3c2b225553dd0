/// Analysis modules — post-scan insights over a finished subtree.
pub mod extensions;
pub mod top_files;

pub use extensions::{categorise_extension, collect_extension_data, ExtensionRecord, FileCategory};
pub use top_files::{largest_files, LargestFile};
