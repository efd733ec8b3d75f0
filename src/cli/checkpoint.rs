use std::io::Write;
use std::path::Path;

use colored::Colorize;

use crate::cli::{wprintln, write_json};
use crate::trim::checkpoint::read_contents;
use crate::PluckError;

/// Options for the `pluck checkpoint` subcommand.
pub struct CheckpointOptions {
    /// Path to the checkpoint file.
    pub checkpoint: String,
    /// Emit output as JSON.
    pub json: bool,
}

/// Print every record of a checkpoint file as a table.
///
/// The file is read without taking its lock and no database is opened, so
/// this works on a checkpoint left by an interrupted or failed run.
pub fn execute(opts: &CheckpointOptions, writer: &mut dyn Write) -> Result<(), PluckError> {
    let contents = read_contents(Path::new(&opts.checkpoint))?;

    if opts.json {
        return write_json(&contents, writer);
    }

    let mode = if contents.settings.mode.is_destructive() {
        "destructive"
    } else {
        "dry run"
    };
    wprintln!(
        writer,
        "Checkpoint: {}  version {}  workers {}  block size {}  {}",
        opts.checkpoint,
        contents.version,
        contents.worker_count,
        contents.settings.block_size,
        mode
    )?;
    wprintln!(
        writer,
        "{:>6}  {:>22}  {:>12}  {:>12}  {:>12}  {:>12}",
        "Worker",
        "Error",
        "Start",
        "Finish",
        "Position",
        "Blocks"
    )?;
    for r in &contents.records {
        let error = if r.error == 0 {
            format!("{:>22}", r.error_name()).green()
        } else {
            format!("{:>22}", format!("{} ({})", r.error_name(), r.error)).red()
        };
        wprintln!(
            writer,
            "{:>6}  {}  {:>12}  {:>12}  {:>12}  {:>12}",
            r.worker_id,
            error,
            r.start,
            r.finish,
            r.position,
            r.blocks
        )?;
    }

    let missing = contents.worker_count as usize - contents.records.len();
    if missing > 0 {
        wprintln!(
            writer,
            "{}",
            format!("{} worker record(s) not written yet", missing).yellow()
        )?;
    }
    Ok(())
}
