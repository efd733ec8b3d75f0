//! Stage 2: block-level trimming across a pool of workers.
//!
//! The page space is cut into one contiguous range per worker. All workers
//! start together on a dedicated rayon pool and are joined together. Each
//! walks its range in increasing page order: read, analyze, plan, drop the
//! holes that already read back as zeros, punch the rest (destructive mode
//! only), then record the new position in its checkpoint slot. A record is
//! written only after the page's holes are punched, so a recorded position
//! never runs ahead of completed work.
//!
//! A failing worker stops alone and stores its error code in its record;
//! the others run to the end of their ranges.

use log::{debug, trace, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::ods::database::PageStore;
use crate::ods::version::OdsFamily;
use crate::trim::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::trim::occupancy::{analyze, BlockGeometry};
use crate::trim::pip_scan::FreePageSet;
use crate::trim::planner::plan;
use crate::trim::{ProgressSink, TrimMode};
use crate::util::fs::is_zeroed;
use crate::PluckError;

/// Contiguous page range `[start, finish)` owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerRange {
    pub worker_id: u32,
    pub start: u64,
    pub finish: u64,
}

impl WorkerRange {
    pub fn len(&self) -> u64 {
        self.finish - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.finish == self.start
    }

    pub fn fresh_record(&self) -> CheckpointRecord {
        CheckpointRecord::fresh(self.worker_id, self.start, self.finish)
    }
}

/// Split `[0, total_pages)` into `workers` ranges.
///
/// Range `k` is `[total·k/w, total·(k+1)/w)`; sizes differ by at most one.
pub fn partition(total_pages: u64, workers: u32) -> Vec<WorkerRange> {
    let w = workers.max(1) as u128;
    let total = total_pages as u128;
    (0..w)
        .map(|k| WorkerRange {
            worker_id: k as u32,
            start: (total * k / w) as u64,
            finish: (total * (k + 1) / w) as u64,
        })
        .collect()
}

/// Everything a Stage 2 worker needs, shared by all workers.
pub struct Stage2Job<'a> {
    pub store: &'a dyn PageStore,
    pub family: OdsFamily,
    pub geometry: BlockGeometry,
    pub mode: TrimMode,
    /// Pages to leave alone (the Stage 1 free set, with `--skip-free`).
    pub skip_pages: Option<&'a FreePageSet>,
    pub checkpoint: Option<&'a CheckpointStore>,
}

/// Result of one worker, collected after the join.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerOutcome {
    pub worker_id: u32,
    pub start: u64,
    pub finish: u64,
    /// Position the worker started from (its range start unless resumed).
    pub resumed_from: u64,
    /// Next page the worker would have processed.
    pub position: u64,
    /// Pages processed in this run.
    pub pages: u64,
    /// Blocks trimmed or trimmable, including those recorded before a resume.
    pub blocks: u64,
    pub bytes: u64,
    /// Planned blocks skipped because they already read back as zeros.
    pub already_trimmed_blocks: u64,
    /// Hole-punch calls issued (or that would be issued, in a dry run).
    pub holes: u64,
    #[serde(skip)]
    pub error: Option<PluckError>,
    /// Error code written to the checkpoint record, 0 if none.
    pub error_code: u32,
}

impl WorkerOutcome {
    fn starting(record: &CheckpointRecord, block_size: u32) -> Self {
        WorkerOutcome {
            worker_id: record.worker_id,
            start: record.start,
            finish: record.finish,
            resumed_from: record.position,
            position: record.position,
            pages: 0,
            blocks: record.blocks,
            bytes: record.blocks * block_size as u64,
            already_trimmed_blocks: 0,
            holes: 0,
            error: None,
            error_code: 0,
        }
    }
}

#[derive(Default)]
struct PageStats {
    blocks: u64,
    already_trimmed: u64,
    holes: u64,
}

/// Run one worker per start record and wait for all of them.
///
/// Each record gives the worker's range and the position to start from
/// (see [`CheckpointStore::open_or_create`]). The returned outcomes are in
/// worker-id order.
pub fn run(
    job: &Stage2Job<'_>,
    starts: &[CheckpointRecord],
    progress: &dyn ProgressSink,
) -> Result<Vec<WorkerOutcome>, PluckError> {
    if starts.is_empty() {
        return Ok(Vec::new());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(starts.len())
        .thread_name(|i| format!("pluck-worker-{}", i))
        .build()
        .map_err(|e| PluckError::Io(format!("Cannot start worker pool: {}", e)))?;

    let outcomes: Vec<WorkerOutcome> = pool.install(|| {
        starts
            .par_iter()
            .with_max_len(1)
            .map(|record| run_worker(job, *record, progress))
            .collect()
    });
    Ok(outcomes)
}

fn run_worker(
    job: &Stage2Job<'_>,
    mut record: CheckpointRecord,
    progress: &dyn ProgressSink,
) -> WorkerOutcome {
    let block_size = job.geometry.block_size;
    let mut outcome = WorkerOutcome::starting(&record, block_size);
    debug!(
        "Worker {} range [{}, {}) from page {}",
        record.worker_id, record.start, record.finish, record.position
    );
    if record.position > record.start {
        progress.advance(record.position - record.start);
    }

    let mut buf = vec![0u8; job.geometry.page_size as usize];
    while record.position < record.finish {
        let page = record.position;
        let stats = match process_page(job, page, &mut buf) {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Worker {} stopped at page {}: {}", record.worker_id, page, e);
                record.error = e.code();
                if let Some(ck) = job.checkpoint {
                    if let Err(ck_err) = ck.update(&record) {
                        warn!("Worker {} cannot record its error: {}", record.worker_id, ck_err);
                    }
                }
                outcome.error_code = record.error;
                outcome.error = Some(e);
                break;
            }
        };

        record.position += 1;
        record.blocks += stats.blocks;
        outcome.pages += 1;
        outcome.already_trimmed_blocks += stats.already_trimmed;
        outcome.holes += stats.holes;

        if let Some(ck) = job.checkpoint {
            if let Err(e) = ck.update(&record) {
                outcome.error_code = e.code();
                outcome.error = Some(e);
                break;
            }
        }
        progress.advance(1);
    }

    outcome.position = record.position;
    outcome.blocks = record.blocks;
    outcome.bytes = record.blocks * block_size as u64;
    debug!(
        "Worker {} done at page {}: {} blocks",
        outcome.worker_id, outcome.position, outcome.blocks
    );
    outcome
}

fn process_page(job: &Stage2Job<'_>, page: u64, buf: &mut [u8]) -> Result<PageStats, PluckError> {
    let mut stats = PageStats::default();
    if job.skip_pages.is_some_and(|free| free.contains(page)) {
        return Ok(stats);
    }
    job.store.read_page_into(page, buf)?;

    let geometry = &job.geometry;
    let bitmap = analyze(buf, job.family, geometry);
    let page_offset = page * geometry.page_size as u64;
    let block_size = geometry.block_size as u64;

    for hole in plan(&bitmap, page_offset, geometry.block_size) {
        let rel = (hole.offset - page_offset) as usize;
        let blocks = hole.length / block_size;
        if is_zeroed(&buf[rel..rel + hole.length as usize]) {
            stats.already_trimmed += blocks;
            continue;
        }
        if job.mode.is_destructive() {
            job.store.punch_hole(hole.offset, hole.length)?;
        }
        trace!(
            "Page {} hole at {} ({} blocks)",
            page,
            hole.offset,
            blocks
        );
        stats.blocks += blocks;
        stats.holes += 1;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trim::checkpoint::CheckpointSettings;
    use crate::trim::testutil::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    struct Counter(AtomicU64);

    impl ProgressSink for Counter {
        fn advance(&self, pages: u64) {
            self.0.fetch_add(pages, Ordering::Relaxed);
        }
    }

    /// 4096/512 image where every data page carries the 6-free-block layout
    /// with non-zero noise in the free blocks.
    fn noisy_image(pages: u64) -> DbImage {
        let mut image = DbImage::new(4096, pages, 0x800C);
        image.set_pip(1, OdsFamily::Current, 0, &[]);
        for p in 2..pages {
            image.set_data_page(p, &[(3000, 50)], true);
        }
        image
    }

    fn job<'a>(store: &'a MemoryStore, mode: TrimMode) -> Stage2Job<'a> {
        Stage2Job {
            store,
            family: OdsFamily::Current,
            geometry: BlockGeometry::new(4096, 512).unwrap(),
            mode,
            skip_pages: None,
            checkpoint: None,
        }
    }

    fn settings(mode: TrimMode) -> CheckpointSettings {
        CheckpointSettings {
            block_size: 512,
            mode,
        }
    }

    fn fresh(total: u64, workers: u32) -> Vec<CheckpointRecord> {
        partition(total, workers)
            .iter()
            .map(WorkerRange::fresh_record)
            .collect()
    }

    #[test]
    fn test_partition_properties() {
        for total in [0u64, 1, 7, 100, 1001, 65_537] {
            for workers in [1u32, 2, 3, 7, 16, 256] {
                let ranges = partition(total, workers);
                assert_eq!(ranges.len(), workers as usize);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges.last().unwrap().finish, total);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].finish, pair[1].start);
                }
                let min = ranges.iter().map(|r| r.len()).min().unwrap();
                let max = ranges.iter().map(|r| r.len()).max().unwrap();
                assert!(max - min <= 1, "total {} workers {}", total, workers);
                for (k, r) in ranges.iter().enumerate() {
                    assert_eq!(r.worker_id, k as u32);
                }
            }
        }
    }

    #[test]
    fn test_dry_run_counts_without_punching() {
        let store = noisy_image(10).into_store();
        let before = store.bytes();
        let counter = Counter(AtomicU64::new(0));
        let outcomes = run(&job(&store, TrimMode::DryRun), &fresh(10, 3), &counter).unwrap();

        assert_eq!(outcomes.len(), 3);
        let blocks: u64 = outcomes.iter().map(|o| o.blocks).sum();
        assert_eq!(blocks, 8 * 6);
        assert!(store.punched().is_empty());
        assert_eq!(store.bytes(), before);
        assert_eq!(counter.0.load(Ordering::Relaxed), 10);
        assert!(outcomes.iter().all(|o| o.error.is_none()));
    }

    #[test]
    fn test_destructive_punches_and_converges() {
        let store = noisy_image(6).into_store();
        let outcomes = run(&job(&store, TrimMode::Destructive), &fresh(6, 2), &()).unwrap();
        let blocks: u64 = outcomes.iter().map(|o| o.blocks).sum();
        assert_eq!(blocks, 4 * 6);
        // Three holes per page: blocks 1-3, 4, 6-7
        assert_eq!(store.punched().len(), 4 * 3);
        assert_eq!(store.punched()[0].offset, 2 * 4096 + 512);

        // Occupied bytes survive
        let bytes = store.bytes();
        assert!(bytes[2 * 4096 + 3000..2 * 4096 + 3050].iter().all(|&b| b == 0xCD));

        let again = run(&job(&store, TrimMode::Destructive), &fresh(6, 2), &()).unwrap();
        assert_eq!(again.iter().map(|o| o.blocks).sum::<u64>(), 0);
        assert_eq!(again.iter().map(|o| o.already_trimmed_blocks).sum::<u64>(), 4 * 6);
        assert_eq!(store.punched().len(), 4 * 3);
    }

    #[test]
    fn test_failure_is_scoped_to_worker() {
        let store = noisy_image(12).into_store().failing_reads_at(3);
        let outcomes = run(&job(&store, TrimMode::DryRun), &fresh(12, 3), &()).unwrap();

        let failed = &outcomes[0];
        assert!(matches!(failed.error, Some(PluckError::Io(_))));
        assert_eq!(failed.error_code, 1);
        assert_eq!(failed.position, 3);
        // pages 2 only (0 header, 1 pip)
        assert_eq!(failed.blocks, 6);

        assert!(outcomes[1].error.is_none());
        assert!(outcomes[2].error.is_none());
        assert_eq!(outcomes[1].blocks + outcomes[2].blocks, 8 * 6);
    }

    #[test]
    fn test_punch_failure_records_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");
        let store = noisy_image(4).into_store().failing_punches();
        let starts = fresh(4, 1);
        let (ck, starts) = CheckpointStore::open_or_create(&path, settings(TrimMode::Destructive), &starts).unwrap();
        let mut j = job(&store, TrimMode::Destructive);
        j.checkpoint = Some(&ck);
        let outcomes = run(&j, &starts, &()).unwrap();

        assert!(matches!(outcomes[0].error, Some(PluckError::TrimFailed(_))));
        let contents = crate::trim::checkpoint::read_contents(&path).unwrap();
        assert_eq!(contents.records[0].error, 3);
        assert_eq!(contents.records[0].position, 2);
    }

    #[test]
    fn test_resume_matches_uninterrupted_run() {
        let full_store = noisy_image(20).into_store();
        let full = run(&job(&full_store, TrimMode::DryRun), &fresh(20, 2), &()).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");
        let store = noisy_image(20).into_store();
        {
            let (ck, _) = CheckpointStore::open_or_create(&path, settings(TrimMode::DryRun), &fresh(20, 2)).unwrap();
            // Worker 1 had done pages 10..14 before an interruption
            let mut rec = fresh(20, 2)[1];
            rec.position = 14;
            rec.blocks = 4 * 6;
            ck.update(&rec).unwrap();
        }

        let (ck, starts) = CheckpointStore::open_or_create(&path, settings(TrimMode::DryRun), &fresh(20, 2)).unwrap();
        assert_eq!(starts[1].position, 14);
        let mut j = job(&store, TrimMode::DryRun);
        j.checkpoint = Some(&ck);
        let counter = Counter(AtomicU64::new(0));
        let resumed = run(&j, &starts, &counter).unwrap();

        assert_eq!(resumed[1].resumed_from, 14);
        assert_eq!(resumed[1].pages, 6);
        assert_eq!(resumed[1].blocks, full[1].blocks);
        assert_eq!(resumed[0].blocks, full[0].blocks);
        assert_eq!(counter.0.load(Ordering::Relaxed), 20);

        let contents = crate::trim::checkpoint::read_contents(&path).unwrap();
        assert!(contents.records.iter().all(|r| r.is_complete()));
    }

    #[test]
    fn test_skip_free_pages() {
        let store = noisy_image(6).into_store();
        let mut free = FreePageSet::with_capacity(6);
        free.insert(4);
        free.insert(5);
        let mut j = job(&store, TrimMode::DryRun);
        j.skip_pages = Some(&free);
        let outcomes = run(&j, &fresh(6, 1), &()).unwrap();
        assert_eq!(outcomes[0].blocks, 2 * 6);
        assert_eq!(outcomes[0].pages, 6);
    }
}
