use std::fmt::Display;
use std::io::stdout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::{
    execute,
    style::{Color as CtColor, Print, ResetColor, SetForegroundColor},
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::core::RunReport;

static COLOR_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn set_color_enabled(enabled: bool) {
    COLOR_ENABLED.store(enabled, Ordering::Relaxed);
}

fn print_line(color: CtColor, marker: &str, message: &str) {
    if COLOR_ENABLED.load(Ordering::Relaxed) {
        let _ = execute!(
            stdout(),
            SetForegroundColor(color),
            Print(marker),
            Print(message),
            Print("\n"),
            ResetColor
        );
    } else {
        println!("{}{}", marker, message);
    }
}

/// Print success message
pub fn print_success(message: &str) {
    print_line(CtColor::Green, "✅ ", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    print_line(CtColor::Yellow, "⚠️  ", message);
}

/// Print error message
pub fn print_error(error: &dyn Display) {
    print_line(CtColor::Red, "❌ ", &error.to_string());
}

/// Print info message
pub fn print_info(message: &str) {
    print_line(CtColor::Blue, "ℹ️  ", message);
}

pub fn print_report(verb: &str, archive: &dyn Display, report: &RunReport) {
    print_success(&format!(
        "{} {} project(s), {} branch(es), {} patch(es) via {}",
        verb, report.projects, report.branches, report.patches, archive
    ));
}

/// Per-project progress bar; hidden when progress output is disabled
pub fn create_progress_bar(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("▰▰▱"),
    );
    pb
}
