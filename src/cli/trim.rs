use std::io::Write;
use std::path::PathBuf;

use colored::Colorize;

use crate::cli::{create_progress_bar, wprintln, write_json, BarProgress};
use crate::ods::database::Database;
use crate::trim::pipeline::{self, TrimConfig, TrimReport, TrimStage};
use crate::trim::precheck::Stage2Plan;
use crate::trim::TrimMode;
use crate::util::format::format_size;
use crate::PluckError;

/// Options for the `pluck trim` subcommand.
pub struct TrimOptions {
    /// Path to the database file.
    pub file: String,
    /// Punch holes instead of only counting.
    pub trim: bool,
    /// Filesystem block size (512 or 4096).
    pub block_size: u32,
    /// 1 = whole free pages only, 2 = also unused blocks.
    pub stage: u8,
    /// Stage 2 worker count.
    pub workers: u32,
    /// Checkpoint file to record and resume progress.
    pub checkpoint: Option<String>,
    /// Leave Stage 1 free pages out of Stage 2.
    pub skip_free: bool,
    /// Emit output as JSON.
    pub json: bool,
}

impl TrimOptions {
    fn config(&self) -> Result<TrimConfig, PluckError> {
        Ok(TrimConfig {
            block_size: self.block_size,
            stage: TrimStage::from_number(self.stage)?,
            workers: self.workers,
            mode: if self.trim {
                TrimMode::Destructive
            } else {
                TrimMode::DryRun
            },
            checkpoint: self.checkpoint.as_ref().map(PathBuf::from),
            skip_free_pages: self.skip_free,
        })
    }
}

/// Reclaim free pages and unused blocks of a database file.
///
/// Without `--trim` this is a dry run: both stages compute exactly what a
/// destructive run would punch, and nothing is written to the database.
/// With `--trim` the database must be fully shut down or frozen by nbackup.
///
/// When a Stage 2 worker fails, the report (including the totals of the
/// other workers) is still printed before the first error is returned.
pub fn execute(opts: &TrimOptions, writer: &mut dyn Write) -> Result<(), PluckError> {
    let config = opts.config()?;
    let db = if config.mode.is_destructive() {
        Database::open_writable(&opts.file)?
    } else {
        Database::open(&opts.file)?
    };

    let report = if opts.json {
        pipeline::run(&db, &config, &())?
    } else {
        let progress = BarProgress(create_progress_bar(db.page_count(), "pages"));
        let result = pipeline::run(&db, &config, &progress);
        progress.0.finish_and_clear();
        result?
    };

    if opts.json {
        write_json(&report, writer)?;
    } else {
        print_report(&opts.file, &report, writer)?;
    }

    match report.first_error() {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

fn print_report(file: &str, report: &TrimReport, writer: &mut dyn Write) -> Result<(), PluckError> {
    let mode = match report.mode {
        TrimMode::DryRun => "dry run".yellow(),
        TrimMode::Destructive => "trim".red().bold(),
    };
    wprintln!(writer, "Database: {}", file)?;
    wprintln!(
        writer,
        "  Page size: {}  ODS: {} ({})  Pages: {}",
        report.page_size,
        report.ods_version,
        report.family,
        report.page_count
    )?;
    wprintln!(
        writer,
        "  Mode: {}  Block size: {}  Stage: {}",
        mode,
        report.block_size,
        report.stage
    )?;
    wprintln!(writer)?;

    let s1 = &report.stage1;
    wprintln!(writer, "Stage 1 (free pages):")?;
    wprintln!(writer, "  PIP pages read: {}", s1.pips_read)?;
    wprintln!(writer, "  Free pages: {}", s1.free_pages)?;
    wprintln!(writer, "  Already trimmed: {}", s1.already_trimmed)?;
    wprintln!(
        writer,
        "  Pages to trim: {}  {}",
        format!("{}", s1.pages_trimmable).green(),
        format_size(s1.bytes)
    )?;
    wprintln!(writer)?;

    match report.stage2 {
        Stage2Plan::SkippedEncrypted => {
            wprintln!(
                writer,
                "Stage 2 (blocks): {}",
                "skipped, database is encrypted".yellow()
            )?;
        }
        Stage2Plan::NoOp => {
            wprintln!(writer, "Stage 2 (blocks): block size equals page size, nothing to do")?;
        }
        Stage2Plan::Run if report.workers.is_empty() => {
            wprintln!(writer, "Stage 2 (blocks): not requested")?;
        }
        Stage2Plan::Run => {
            wprintln!(writer, "Stage 2 (blocks):")?;
            wprintln!(
                writer,
                "  {:>6}  {:>12}  {:>12}  {:>12}  {:>12}  {}",
                "Worker",
                "Start",
                "Finish",
                "Position",
                "Blocks",
                "Status"
            )?;
            for w in &report.workers {
                let status = match &w.error {
                    Some(e) => e.kind().red(),
                    None if w.resumed_from > w.start => "resumed".cyan(),
                    None => "ok".green(),
                };
                wprintln!(
                    writer,
                    "  {:>6}  {:>12}  {:>12}  {:>12}  {:>12}  {}",
                    w.worker_id,
                    w.start,
                    w.finish,
                    w.position,
                    w.blocks,
                    status
                )?;
            }
            wprintln!(
                writer,
                "  Blocks to trim: {}  {}",
                format!("{}", report.stage2_blocks()).green(),
                format_size(report.stage2_bytes())
            )?;
        }
    }
    wprintln!(writer)?;

    let verb = if report.mode.is_destructive() {
        "Reclaimed"
    } else {
        "Reclaimable"
    };
    wprintln!(
        writer,
        "{}: {}",
        verb,
        format_size(report.total_bytes()).bold()
    )?;
    Ok(())
}
