//! Progress reporting for the checksum scan
//!
//! Provides a real-time status spinner using indicatif and the start/end
//! banners printed around a scan.

use crate::scan::ScanStats;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner that displays scan status
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let style = ProgressStyle::with_template("{spinner:.cyan} {elapsed_precise} {wide_msg}")
            .expect("spinner template is valid")
            .tick_chars(r"-\|/-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar }
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a count with thousands separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

/// Format an elapsed duration compactly for status lines
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    if total >= 3600 {
        format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    } else if total >= 60 {
        format!("{}:{:02}", total / 60, total % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

/// Print a header at the start of the scan
pub fn print_header(root: &str) {
    println!();
    println!(
        "{} {}",
        style("medialibchecker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), root);
    println!();
}

/// Print a summary of the scan results
pub fn print_summary(stats: &ScanStats) {
    let duration_secs = stats.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        stats.bytes_hashed as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if stats.completed {
        println!("{}", style("Scan Complete").green().bold());
    } else {
        println!("{}", style("Scan Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(stats.directories)
    );
    println!("  {} {}", style("Files:").bold(), format_number(stats.files));
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(stats.total_bytes, BINARY)
    );
    println!(
        "  {} {} files, {} ({}/s) in {} passes",
        style("Hashed:").bold(),
        format_number(stats.files_hashed),
        format_size(stats.bytes_hashed, BINARY),
        format_size(rate as u64, BINARY),
        stats.passes,
    );
    println!(
        "  {} {}",
        style("Duration:").bold(),
        format_elapsed(stats.duration)
    );
    if stats.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(stats.errors)
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "1:15");
        assert_eq!(format_elapsed(Duration::from_secs(3700)), "1:01:40");
    }
}
