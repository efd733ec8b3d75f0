//! Sparse-file space reclamation for Firebird / RedDatabase database files.
//!
//! The `ods-pluck` crate (library name `pluck`) finds byte ranges of a
//! database file that hold no live data and punches holes through them, so
//! the filesystem can release the storage. The file's logical size and the
//! engine's view of its page layout are left untouched. The tool works
//! offline only: the database must be fully shut down or frozen by nbackup
//! before anything is deallocated.
//!
//! # CLI Reference
//!
//! | Command | Purpose |
//! |---------|---------|
//! | [`pluck trim`](cli::app::Commands::Trim) | Find (and with `--trim`, punch) reclaimable ranges |
//! | [`pluck checkpoint`](cli::app::Commands::Checkpoint) | Print a checkpoint file as a table |
//! | [`pluck info`](cli::app::Commands::Info) | Show the decoded header page and supported ODS versions |
//! | [`pluck completions`](cli::app::Commands::Completions) | Generate shell completions |
//!
//! Every run is a dry run unless `--trim` is given.
//!
//! # How trimming works
//!
//! 1. **Stage 1** ([`trim::pip_scan`]) walks the page inventory bitmap chain
//!    and plans a whole-page hole for every page marked free.
//! 2. **Stage 2** ([`trim::scheduler`]) splits the file into one contiguous
//!    page range per worker. Each worker decodes data, blob and b-tree pages,
//!    builds a block-level occupancy bitmap ([`trim::occupancy`]), and turns
//!    the unused blocks into as few holes as possible ([`trim::planner`]).
//!    Progress is persisted per worker ([`trim::checkpoint`]) so an
//!    interrupted run resumes where it stopped.
//!
//! ## Quick example
//!
//! ```no_run
//! use pluck::ods::database::Database;
//! use pluck::trim::pipeline::{run, TrimConfig};
//!
//! let db = Database::open("employee.fdb").unwrap();
//! let report = run(&db, &TrimConfig::default(), &()).unwrap();
//! println!("{} bytes reclaimable", report.total_bytes());
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ods::database`] | File I/O, header page, positioned page reads, hole punching |
//! | [`ods::header`] | Page header, header page and flag decoding |
//! | [`ods::version`] | ODS version families and their layouts |
//! | [`ods::pip`] | Page inventory bitmap pages |
//! | [`ods::view`] | Tagged decoding of data, blob and b-tree pages |
//! | [`trim::precheck`] | Checks run before any scanning |
//! | [`trim::pip_scan`] | Stage 1 whole-page scan |
//! | [`trim::occupancy`] | Block occupancy bitmaps |
//! | [`trim::planner`] | Bitmap to hole-punch runs |
//! | [`trim::scheduler`] | Stage 2 worker pool |
//! | [`trim::checkpoint`] | Per-worker progress file |
//! | [`trim::pipeline`] | Stage 1 + Stage 2 orchestration |

#[cfg(feature = "cli")]
pub mod cli;
pub mod ods;
pub mod trim;
pub mod util;

use thiserror::Error;

/// Errors returned by `pluck` operations.
///
/// Each variant has a stable numeric [code](PluckError::code), used both as
/// the process exit status and as the error field of checkpoint records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluckError {
    /// An I/O error occurred (open, short read, or write failure).
    #[error("I/O error: {0}")]
    Io(String),

    /// The header carries an ODS version outside the supported set.
    #[error("Unsupported ODS: {0}")]
    UnsupportedOds(String),

    /// The hole-punch primitive failed.
    #[error("Trim failed: {0}")]
    TrimFailed(String),

    /// Destructive mode was requested on a database that is neither fully
    /// shut down nor nbackup-locked.
    #[error("Database must be full shutdown or nbackup lock: {0}")]
    DatabaseNotLocked(String),

    /// A page expected to be a page inventory page has another type tag.
    #[error("Corrupt PIP: {0}")]
    CorruptPip(String),

    /// The database is encrypted and its page contents cannot be trusted.
    #[error("Database is encrypted: {0}")]
    DatabaseEncrypted(String),

    /// Checkpoint version/worker count mismatch, or a prior run failed.
    #[error("Incompatible checkpoint: {0}")]
    IncompatibleCheckpoint(String),

    /// A parse error occurred (malformed header or unexpected values).
    #[error("Parse error: {0}")]
    Parse(String),

    /// An invalid argument was supplied (bad block size, worker count, etc.).
    #[error("Invalid argument: {0}")]
    Argument(String),
}

impl PluckError {
    /// Stable numeric code: process exit status and checkpoint error field.
    pub fn code(&self) -> u32 {
        match self {
            PluckError::Io(_) => 1,
            PluckError::UnsupportedOds(_) => 2,
            PluckError::TrimFailed(_) => 3,
            PluckError::DatabaseNotLocked(_) => 4,
            PluckError::CorruptPip(_) => 5,
            PluckError::DatabaseEncrypted(_) => 6,
            PluckError::IncompatibleCheckpoint(_) => 7,
            PluckError::Parse(_) => 8,
            PluckError::Argument(_) => 9,
        }
    }

    /// Rebuild an error from a stored code. Returns `None` for 0.
    pub fn from_code(code: u32, message: String) -> Option<Self> {
        Some(match code {
            0 => return None,
            1 => PluckError::Io(message),
            2 => PluckError::UnsupportedOds(message),
            3 => PluckError::TrimFailed(message),
            4 => PluckError::DatabaseNotLocked(message),
            5 => PluckError::CorruptPip(message),
            6 => PluckError::DatabaseEncrypted(message),
            7 => PluckError::IncompatibleCheckpoint(message),
            8 => PluckError::Parse(message),
            _ => PluckError::Argument(message),
        })
    }

    /// Short name of the error kind, for tables and JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            PluckError::Io(_) => "IoError",
            PluckError::UnsupportedOds(_) => "UnsupportedOds",
            PluckError::TrimFailed(_) => "TrimFailed",
            PluckError::DatabaseNotLocked(_) => "DatabaseNotLocked",
            PluckError::CorruptPip(_) => "CorruptPip",
            PluckError::DatabaseEncrypted(_) => "DatabaseEncrypted",
            PluckError::IncompatibleCheckpoint(_) => "IncompatibleCheckpoint",
            PluckError::Parse(_) => "Parse",
            PluckError::Argument(_) => "Argument",
        }
    }
}

/// Name for a stored error code (0 is "ok").
pub fn error_code_name(code: u32) -> &'static str {
    PluckError::from_code(code, String::new())
        .map(|e| e.kind())
        .unwrap_or("ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_roundtrip() {
        let all = [
            PluckError::Io(String::new()),
            PluckError::UnsupportedOds(String::new()),
            PluckError::TrimFailed(String::new()),
            PluckError::DatabaseNotLocked(String::new()),
            PluckError::CorruptPip(String::new()),
            PluckError::DatabaseEncrypted(String::new()),
            PluckError::IncompatibleCheckpoint(String::new()),
            PluckError::Parse(String::new()),
            PluckError::Argument(String::new()),
        ];
        let mut codes: Vec<u32> = all.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
        assert!(!codes.contains(&0));
        for e in &all {
            assert_eq!(PluckError::from_code(e.code(), String::new()).as_ref(), Some(e));
        }
    }

    #[test]
    fn test_code_zero_is_ok() {
        assert!(PluckError::from_code(0, "x".to_string()).is_none());
        assert_eq!(error_code_name(0), "ok");
        assert_eq!(error_code_name(3), "TrimFailed");
    }

    #[test]
    fn test_display() {
        let e = PluckError::CorruptPip("Page 8067 is not pip".to_string());
        assert_eq!(e.to_string(), "Corrupt PIP: Page 8067 is not pip");
    }
}
