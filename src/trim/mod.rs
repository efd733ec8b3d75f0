//! The trimming engine.
//!
//! [`precheck`] gates every run. [`pip_scan`] (Stage 1) finds whole free
//! pages from the page inventory bitmaps. [`occupancy`] and [`planner`]
//! turn one page into a block bitmap and then into hole runs;
//! [`scheduler`] applies them (Stage 2) across a pool of workers whose
//! progress is recorded by [`checkpoint`]. [`pipeline`] ties the stages
//! together.

use serde::Serialize;

pub mod checkpoint;
pub mod occupancy;
pub mod pip_scan;
pub mod pipeline;
pub mod planner;
pub mod precheck;
pub mod scheduler;
#[cfg(test)]
pub(crate) mod testutil;

/// Whether holes are only counted or actually punched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TrimMode {
    /// Count what would be reclaimed; never call the hole-punch primitive.
    #[default]
    DryRun,
    /// Punch holes in place.
    Destructive,
}

impl TrimMode {
    pub fn is_destructive(self) -> bool {
        self == TrimMode::Destructive
    }
}

/// A single hole: a byte range to deallocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hole {
    pub offset: u64,
    pub length: u64,
}

impl Hole {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Observer for Stage 2 progress. Called from worker threads.
pub trait ProgressSink: Sync {
    /// `pages` more pages have been processed.
    fn advance(&self, pages: u64);
}

impl ProgressSink for () {
    fn advance(&self, _pages: u64) {}
}
