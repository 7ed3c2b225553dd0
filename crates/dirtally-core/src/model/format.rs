/// Formatting helpers for reports — human-readable sizes, counts,
/// fractions and timestamps.
///
/// All internal sizes are `u64` bytes. Floating point is only used
/// at the display-formatting boundary.
use chrono::{DateTime, Local};
use std::path::Path;
use std::time::SystemTime;

/// Format a byte count with binary units, labelled KB/MB/GB/TB.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else if b < TB {
        format!("{:.2} GB", b / GB)
    } else {
        format!("{:.2} TB", b / TB)
    }
}

/// Format a count with thousand separators.
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a 0.0–1.0 fraction as a percentage with one decimal.
pub fn format_fraction(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Display name of a drive: `"Label (C:)"`, or the bare path when the
/// volume has no label.
pub fn format_volume_name(label: Option<&str>, root: &Path) -> String {
    let text = root.to_string_lossy();
    match label.filter(|l| !l.is_empty()) {
        Some(label) => {
            let trimmed = text.trim_end_matches(|c| c == '\\' || c == '/');
            let short = if trimmed.is_empty() { text.as_ref() } else { trimmed };
            format!("{label} ({short})")
        }
        None => text.into_owned(),
    }
}

/// Local-time rendering of a last-change timestamp; empty when unknown.
pub fn format_last_change(time: Option<SystemTime>) -> String {
    match time {
        Some(t) => DateTime::<Local>::from(t)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_pick_the_right_unit() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1_048_576), "1.0 MB");
        assert_eq!(format_size(1_073_741_824), "1.00 GB");
        assert_eq!(format_size(1_099_511_627_776), "1.00 TB");
    }

    #[test]
    fn counts_get_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn fraction_is_a_percentage() {
        assert_eq!(format_fraction(0.5), "50.0%");
        assert_eq!(format_fraction(1.0), "100.0%");
    }

    #[test]
    fn volume_name_falls_back_to_the_path() {
        assert_eq!(format_volume_name(None, Path::new("/mnt/data")), "/mnt/data");
        assert_eq!(format_volume_name(Some(""), Path::new("/")), "/");
    }

    #[test]
    fn volume_name_shows_label_and_root() {
        assert_eq!(format_volume_name(Some("Data"), Path::new("/mnt/data/")), "Data (/mnt/data)");
        assert_eq!(format_volume_name(Some("Root"), Path::new("/")), "Root (/)");
    }

    #[test]
    fn unknown_time_is_blank() {
        assert_eq!(format_last_change(None), "");
        assert!(!format_last_change(Some(SystemTime::now())).is_empty());
    }
}
