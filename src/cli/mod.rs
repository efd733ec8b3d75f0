//! CLI subcommand implementations for the `pluck` binary.
//!
//! Argument parsing uses clap derive macros. The top-level [`app::Cli`]
//! struct and [`app::Commands`] enum live in [`app`] and are shared between
//! `main.rs` and `build.rs` (for man pages and completions) via `include!()`.
//!
//! Each subcommand module has an `Options` struct holding the parsed
//! arguments and a `pub fn execute(opts, writer) -> Result<(), PluckError>`
//! entry point. The `writer: &mut dyn Write` parameter lets tests capture
//! output and the global `--output` flag redirect it to a file.
//!
//! # Subcommands
//!
//! | Command | Module | Purpose |
//! |---------|--------|---------|
//! | `pluck trim` | [`trim`] | Run Stage 1 and Stage 2, dry run unless `--trim` |
//! | `pluck checkpoint` | [`checkpoint`] | Print a checkpoint file without opening a database |
//! | `pluck info` | [`info`] | Show the decoded header page or the supported ODS list |
//!
//! `--json` switches every subcommand to `serde_json` output. A progress
//! bar (via [`indicatif`]) tracks Stage 2 in text mode. The `wprintln!`
//! macro wraps `writeln!` to convert `io::Error` into `PluckError`.

pub mod app;
pub mod checkpoint;
pub mod info;
pub mod trim;

/// Write a line to the given writer, converting io::Error to PluckError.
macro_rules! wprintln {
    ($w:expr) => {
        writeln!($w).map_err(|e| $crate::PluckError::Io(e.to_string()))
    };
    ($w:expr, $($arg:tt)*) => {
        writeln!($w, $($arg)*).map_err(|e| $crate::PluckError::Io(e.to_string()))
    };
}

pub(crate) use wprintln;

use indicatif::{ProgressBar, ProgressStyle};

use crate::trim::ProgressSink;

/// Create a styled progress bar for iterating over pages.
pub(crate) fn create_progress_bar(count: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(count);
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{eta}})",
            unit
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Stage 2 progress reported on an indicatif bar.
pub(crate) struct BarProgress(pub ProgressBar);

impl ProgressSink for BarProgress {
    fn advance(&self, pages: u64) {
        self.0.inc(pages);
    }
}

/// Serialize a report as pretty JSON, followed by a newline.
pub(crate) fn write_json<T: serde::Serialize>(
    value: &T,
    writer: &mut dyn std::io::Write,
) -> Result<(), crate::PluckError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| crate::PluckError::Parse(format!("JSON serialization error: {}", e)))?;
    wprintln!(writer, "{}", json)
}
