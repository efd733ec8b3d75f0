//! End-to-end trim run: preconditions, Stage 1, then Stage 2.
//!
//! Stage 1 always runs single-threaded and to completion before Stage 2
//! starts; its holes are applied only once the whole inventory chain has
//! been read without error. A checkpoint is opened and checked against the
//! run before Stage 1 reads anything. Stage 2 worker failures do not abort the run:
//! the report carries every worker's totals and [`TrimReport::first_error`]
//! surfaces the first failure.

use std::path::PathBuf;

use log::{debug, info};
use serde::Serialize;

use crate::ods::database::{Database, PageStore};
use crate::ods::header::HeaderPage;
use crate::ods::version::OdsFamily;
use crate::trim::checkpoint::{
    CheckpointRecord, CheckpointSettings, CheckpointStore, MAX_WORKERS,
};
use crate::trim::occupancy::BlockGeometry;
use crate::trim::pip_scan::{self, PipScanSummary};
use crate::trim::precheck::{self, Stage2Plan};
use crate::trim::scheduler::{self, Stage2Job, WorkerOutcome, WorkerRange};
use crate::trim::{ProgressSink, TrimMode};
use crate::PluckError;

/// Which stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TrimStage {
    /// Whole free pages only.
    Pages,
    /// Whole free pages, then unused blocks inside pages.
    #[default]
    PagesAndBlocks,
}

impl TrimStage {
    /// Map the numeric stage used on the command line (1 or 2).
    pub fn from_number(n: u8) -> Result<Self, PluckError> {
        match n {
            1 => Ok(TrimStage::Pages),
            2 => Ok(TrimStage::PagesAndBlocks),
            other => Err(PluckError::Argument(format!(
                "Wrong stage {}, expected 1 or 2",
                other
            ))),
        }
    }

    pub fn number(self) -> u8 {
        match self {
            TrimStage::Pages => 1,
            TrimStage::PagesAndBlocks => 2,
        }
    }
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct TrimConfig {
    pub block_size: u32,
    pub stage: TrimStage,
    pub workers: u32,
    pub mode: TrimMode,
    /// Record (and resume) worker progress in this file.
    pub checkpoint: Option<PathBuf>,
    /// Leave pages found free in Stage 1 out of Stage 2.
    pub skip_free_pages: bool,
}

impl Default for TrimConfig {
    fn default() -> Self {
        TrimConfig {
            block_size: 512,
            stage: TrimStage::PagesAndBlocks,
            workers: 1,
            mode: TrimMode::DryRun,
            checkpoint: None,
            skip_free_pages: false,
        }
    }
}

/// Totals of a run.
#[derive(Debug, Clone, Serialize)]
pub struct TrimReport {
    pub page_size: u32,
    pub page_count: u64,
    pub ods_version: String,
    pub family: OdsFamily,
    pub block_size: u32,
    pub mode: TrimMode,
    pub stage: u8,
    pub stage2: Stage2Plan,
    pub stage1: PipScanSummary,
    /// Stage 2 outcomes in worker-id order; empty when Stage 2 did not run.
    pub workers: Vec<WorkerOutcome>,
}

impl TrimReport {
    pub fn stage2_blocks(&self) -> u64 {
        self.workers.iter().map(|w| w.blocks).sum()
    }

    pub fn stage2_bytes(&self) -> u64 {
        self.workers.iter().map(|w| w.bytes).sum()
    }

    /// Bytes reclaimed (or reclaimable, in a dry run) by both stages.
    pub fn total_bytes(&self) -> u64 {
        self.stage1.bytes + self.stage2_bytes()
    }

    /// First worker failure, in worker-id order.
    pub fn first_error(&self) -> Option<&PluckError> {
        self.workers.iter().find_map(|w| w.error.as_ref())
    }
}

/// Run a trim over an open database.
///
/// A destructive run needs the database opened with
/// [`Database::open_writable`].
pub fn run(
    db: &Database,
    config: &TrimConfig,
    progress: &dyn ProgressSink,
) -> Result<TrimReport, PluckError> {
    if config.mode.is_destructive() && !db.is_writable() {
        return Err(PluckError::Argument(format!(
            "{} must be opened writable for a destructive run",
            db.path().display()
        )));
    }
    run_on(db, db.header(), config, progress)
}

/// Run a trim over any page store, given its decoded header.
pub fn run_on(
    store: &dyn PageStore,
    header: &HeaderPage,
    config: &TrimConfig,
    progress: &dyn ProgressSink,
) -> Result<TrimReport, PluckError> {
    let pre = precheck::validate(header, config.block_size, config.mode)?;
    if config.workers == 0 || config.workers > MAX_WORKERS {
        return Err(PluckError::Argument(format!(
            "Worker count {} out of range 1..={}",
            config.workers, MAX_WORKERS
        )));
    }
    let page_count = store.page_count();
    info!(
        "Trim {} pages, block size {}, stage {}, {:?}",
        page_count,
        config.block_size,
        config.stage.number(),
        config.mode
    );

    // Stage 2 settings and the checkpoint are checked before anything is
    // read or punched.
    let stage2 = if config.stage == TrimStage::PagesAndBlocks && pre.stage2 == Stage2Plan::Run {
        let geometry = BlockGeometry::new(header.page_size, config.block_size)?;
        let expected: Vec<CheckpointRecord> = scheduler::partition(page_count, config.workers)
            .iter()
            .map(WorkerRange::fresh_record)
            .collect();
        let (checkpoint, starts) = match &config.checkpoint {
            Some(path) => {
                let settings = CheckpointSettings {
                    block_size: config.block_size,
                    mode: config.mode,
                };
                let (ck, starts) = CheckpointStore::open_or_create(path, settings, &expected)?;
                (Some(ck), starts)
            }
            None => (None, expected),
        };
        Some((geometry, checkpoint, starts))
    } else {
        None
    };

    let scan = pip_scan::scan(store, pre.family)?;
    let stage1 = scan.summary();
    info!(
        "Stage 1: {} free pages, {} to trim, {} already trimmed",
        stage1.free_pages, stage1.pages_trimmable, stage1.already_trimmed
    );
    if config.mode.is_destructive() {
        for hole in &scan.holes {
            store.punch_hole(hole.offset, hole.length)?;
        }
        debug!("Stage 1: punched {} pages", scan.holes.len());
    }

    let mut report = TrimReport {
        page_size: header.page_size,
        page_count,
        ods_version: header.ods_version.to_string(),
        family: pre.family,
        block_size: config.block_size,
        mode: config.mode,
        stage: config.stage.number(),
        stage2: pre.stage2,
        stage1,
        workers: Vec::new(),
    };

    let Some((geometry, checkpoint, starts)) = stage2 else {
        debug!("Stage 2 not run ({:?}, {:?})", config.stage, pre.stage2);
        return Ok(report);
    };

    let job = Stage2Job {
        store,
        family: pre.family,
        geometry,
        mode: config.mode,
        skip_pages: config.skip_free_pages.then_some(&scan.free_pages),
        checkpoint: checkpoint.as_ref(),
    };
    report.workers = scheduler::run(&job, &starts, progress)?;
    if let Some(ck) = &checkpoint {
        ck.sync()?;
    }

    info!(
        "Stage 2: {} blocks over {} workers",
        report.stage2_blocks(),
        report.workers.len()
    );
    Ok(report)
}
