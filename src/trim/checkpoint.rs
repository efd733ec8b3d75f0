//! Per-worker progress records persisted to a checkpoint file.
//!
//! # Format (version 2)
//!
//! ```text
//! offset  size  field
//! 0       4     version (2)
//! 4       4     worker count (1..=256)
//! 8       4     block size the run counted in
//! 12      4     mode (0 dry run, 1 destructive)
//! 16      40×N  one record per worker, in worker-id order
//! ```
//!
//! Each record is `u32 worker_id, u32 error, u64 start, u64 finish,
//! u64 position, u64 blocks`, little-endian. `error` is a
//! [`PluckError::code`] or 0. Slots are disjoint, so workers update their
//! own record with a single positioned write and no coordination.
//!
//! A checkpoint only resumes a run with the same block size and mode: block
//! counts are in units of the recorded block size, and pages a dry run has
//! passed over have not been punched.
//!
//! The file is held under an exclusive `fs2` lock for the whole run so two
//! processes cannot resume the same checkpoint.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use fs2::FileExt as LockExt;
use log::debug;
use serde::Serialize;

use crate::trim::TrimMode;
use crate::{error_code_name, PluckError};

pub const CHECKPOINT_VERSION: u32 = 2;
pub const MAX_WORKERS: u32 = 256;
pub const HEADER_SIZE: usize = 16;
pub const RECORD_SIZE: usize = 40;

const MODE_DRY_RUN: u32 = 0;
const MODE_DESTRUCTIVE: u32 = 1;

/// Run settings a checkpoint was written under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckpointSettings {
    pub block_size: u32,
    pub mode: TrimMode,
}

impl CheckpointSettings {
    fn mode_code(&self) -> u32 {
        match self.mode {
            TrimMode::DryRun => MODE_DRY_RUN,
            TrimMode::Destructive => MODE_DESTRUCTIVE,
        }
    }
}

/// Progress of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckpointRecord {
    pub worker_id: u32,
    /// 0 when the worker has not failed, else an error code.
    pub error: u32,
    /// First page of the worker's range.
    pub start: u64,
    /// One past the last page of the range.
    pub finish: u64,
    /// Next page to process.
    pub position: u64,
    /// Blocks trimmed (or trimmable, in a dry run) so far.
    pub blocks: u64,
}

impl CheckpointRecord {
    /// A record for a worker that has not processed anything yet.
    pub fn fresh(worker_id: u32, start: u64, finish: u64) -> Self {
        CheckpointRecord {
            worker_id,
            error: 0,
            start,
            finish,
            position: start,
            blocks: 0,
        }
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        LittleEndian::write_u32(&mut buf[0..], self.worker_id);
        LittleEndian::write_u32(&mut buf[4..], self.error);
        LittleEndian::write_u64(&mut buf[8..], self.start);
        LittleEndian::write_u64(&mut buf[16..], self.finish);
        LittleEndian::write_u64(&mut buf[24..], self.position);
        LittleEndian::write_u64(&mut buf[32..], self.blocks);
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECORD_SIZE {
            return None;
        }
        Some(CheckpointRecord {
            worker_id: LittleEndian::read_u32(&buf[0..]),
            error: LittleEndian::read_u32(&buf[4..]),
            start: LittleEndian::read_u64(&buf[8..]),
            finish: LittleEndian::read_u64(&buf[16..]),
            position: LittleEndian::read_u64(&buf[24..]),
            blocks: LittleEndian::read_u64(&buf[32..]),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.position >= self.finish
    }

    pub fn error_name(&self) -> &'static str {
        error_code_name(self.error)
    }
}

/// Raw contents of a checkpoint file, as read for display.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointContents {
    pub version: u32,
    pub worker_count: u32,
    pub settings: CheckpointSettings,
    pub records: Vec<CheckpointRecord>,
}

/// Read a checkpoint file without locking or validating the records.
///
/// Only the header is checked; records carrying errors are returned as
/// they are. A truncated file yields the complete records only.
pub fn read_contents(path: &Path) -> Result<CheckpointContents, PluckError> {
    let data = std::fs::read(path).map_err(|e| {
        PluckError::Io(format!("Cannot read checkpoint {}: {}", path.display(), e))
    })?;
    let (worker_count, settings) = parse_header(&data, path)?;
    let records = data[HEADER_SIZE..]
        .chunks_exact(RECORD_SIZE)
        .take(worker_count as usize)
        .filter_map(CheckpointRecord::decode)
        .collect();
    Ok(CheckpointContents {
        version: CHECKPOINT_VERSION,
        worker_count,
        settings,
        records,
    })
}

fn parse_header(data: &[u8], path: &Path) -> Result<(u32, CheckpointSettings), PluckError> {
    if data.len() < HEADER_SIZE {
        return Err(PluckError::IncompatibleCheckpoint(format!(
            "{} is too short ({} bytes)",
            path.display(),
            data.len()
        )));
    }
    let version = LittleEndian::read_u32(&data[0..]);
    let worker_count = LittleEndian::read_u32(&data[4..]);
    if version != CHECKPOINT_VERSION {
        return Err(PluckError::IncompatibleCheckpoint(format!(
            "Checkpoint version {} (expected {})",
            version, CHECKPOINT_VERSION
        )));
    }
    if worker_count == 0 || worker_count > MAX_WORKERS {
        return Err(PluckError::IncompatibleCheckpoint(format!(
            "Worker count {} out of range 1..={}",
            worker_count, MAX_WORKERS
        )));
    }
    let block_size = LittleEndian::read_u32(&data[8..]);
    let mode = match LittleEndian::read_u32(&data[12..]) {
        MODE_DRY_RUN => TrimMode::DryRun,
        MODE_DESTRUCTIVE => TrimMode::Destructive,
        other => {
            return Err(PluckError::IncompatibleCheckpoint(format!(
                "Unknown checkpoint mode {}",
                other
            )))
        }
    };
    Ok((worker_count, CheckpointSettings { block_size, mode }))
}

/// An open, locked checkpoint file.
pub struct CheckpointStore {
    file: File,
    worker_count: u32,
    settings: CheckpointSettings,
    records: Vec<CheckpointRecord>,
}

impl CheckpointStore {
    /// Create (or truncate) a checkpoint for `worker_count` workers.
    pub fn create<P: AsRef<Path>>(
        path: P,
        settings: CheckpointSettings,
        worker_count: u32,
    ) -> Result<Self, PluckError> {
        let path = path.as_ref();
        if worker_count == 0 || worker_count > MAX_WORKERS {
            return Err(PluckError::Argument(format!(
                "Worker count {} out of range 1..={}",
                worker_count, MAX_WORKERS
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                PluckError::Io(format!("Cannot create checkpoint {}: {}", path.display(), e))
            })?;
        lock(&file, path)?;
        file.set_len(0)
            .map_err(|e| PluckError::Io(format!("Cannot truncate checkpoint: {}", e)))?;

        let mut header = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut header[0..], CHECKPOINT_VERSION);
        LittleEndian::write_u32(&mut header[4..], worker_count);
        LittleEndian::write_u32(&mut header[8..], settings.block_size);
        LittleEndian::write_u32(&mut header[12..], settings.mode_code());
        file.write_all_at(&header, 0)
            .map_err(|e| PluckError::Io(format!("Cannot write checkpoint header: {}", e)))?;
        debug!("Created checkpoint {} for {} workers", path.display(), worker_count);

        Ok(CheckpointStore {
            file,
            worker_count,
            settings,
            records: Vec::new(),
        })
    }

    /// Open and lock an existing checkpoint.
    ///
    /// Fails with `IncompatibleCheckpoint` when the header is out of range or
    /// any record carries an error: resuming a failed run is refused.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PluckError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                PluckError::Io(format!("Cannot open checkpoint {}: {}", path.display(), e))
            })?;
        lock(&file, path)?;

        let len = file
            .metadata()
            .map_err(|e| PluckError::Io(format!("Cannot stat checkpoint: {}", e)))?
            .len() as usize;
        let mut data = vec![0u8; len];
        file.read_exact_at(&mut data, 0)
            .map_err(|e| PluckError::Io(format!("Cannot read checkpoint: {}", e)))?;

        let (worker_count, settings) = parse_header(&data, path)?;
        let records: Vec<CheckpointRecord> = data[HEADER_SIZE..]
            .chunks_exact(RECORD_SIZE)
            .take(worker_count as usize)
            .filter_map(CheckpointRecord::decode)
            .collect();

        if let Some(failed) = records.iter().find(|r| r.error != 0) {
            return Err(PluckError::IncompatibleCheckpoint(format!(
                "worker {} failed with {} in the previous run",
                failed.worker_id,
                failed.error_name()
            )));
        }
        debug!(
            "Loaded checkpoint {}: {} workers, {} records",
            path.display(),
            worker_count,
            records.len()
        );

        Ok(CheckpointStore {
            file,
            worker_count,
            settings,
            records,
        })
    }

    /// Load the checkpoint at `path` if it exists and is non-empty, else
    /// create it. A loaded checkpoint must carry `settings` and its records
    /// must describe exactly the ranges in `expected`; slots missing from a
    /// truncated file start fresh.
    ///
    /// Returns the store and the record each worker should start from.
    pub fn open_or_create<P: AsRef<Path>>(
        path: P,
        settings: CheckpointSettings,
        expected: &[CheckpointRecord],
    ) -> Result<(Self, Vec<CheckpointRecord>), PluckError> {
        let path = path.as_ref();
        let worker_count = expected.len() as u32;
        let exists = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        if !exists {
            let store = Self::create(path, settings, worker_count)?;
            for record in expected {
                store.update(record)?;
            }
            return Ok((store, expected.to_vec()));
        }

        let store = Self::load(path)?;
        if store.settings != settings {
            return Err(PluckError::IncompatibleCheckpoint(format!(
                "checkpoint was written by a {:?} run with block size {}, run is {:?} with block size {}",
                store.settings.mode, store.settings.block_size, settings.mode, settings.block_size
            )));
        }
        if store.worker_count != worker_count {
            return Err(PluckError::IncompatibleCheckpoint(format!(
                "checkpoint has {} workers, run uses {}",
                store.worker_count, worker_count
            )));
        }

        let mut starts = Vec::with_capacity(expected.len());
        for want in expected {
            match store.records.get(want.worker_id as usize) {
                Some(have) => {
                    if have.worker_id != want.worker_id
                        || have.start != want.start
                        || have.finish != want.finish
                        || have.position < have.start
                        || have.position > have.finish
                    {
                        return Err(PluckError::IncompatibleCheckpoint(format!(
                            "worker {} range [{}, {}) does not match [{}, {})",
                            want.worker_id, have.start, have.finish, want.start, want.finish
                        )));
                    }
                    starts.push(*have);
                }
                None => {
                    store.update(want)?;
                    starts.push(*want);
                }
            }
        }
        Ok((store, starts))
    }

    /// Overwrite the slot of `record.worker_id` with one positioned write.
    pub fn update(&self, record: &CheckpointRecord) -> Result<(), PluckError> {
        if record.worker_id >= self.worker_count {
            return Err(PluckError::Argument(format!(
                "Worker id {} out of range (checkpoint has {} workers)",
                record.worker_id, self.worker_count
            )));
        }
        let offset = (HEADER_SIZE + record.worker_id as usize * RECORD_SIZE) as u64;
        self.file
            .write_all_at(&record.encode(), offset)
            .map_err(|e| {
                PluckError::Io(format!(
                    "Cannot write checkpoint record {}: {}",
                    record.worker_id, e
                ))
            })
    }

    /// Flush record writes to disk.
    pub fn sync(&self) -> Result<(), PluckError> {
        self.file
            .sync_data()
            .map_err(|e| PluckError::Io(format!("Cannot sync checkpoint: {}", e)))
    }
}

fn lock(file: &File, path: &Path) -> Result<(), PluckError> {
    LockExt::try_lock_exclusive(file).map_err(|e| {
        PluckError::Io(format!(
            "Checkpoint {} is locked by another run: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DRY: CheckpointSettings = CheckpointSettings {
        block_size: 512,
        mode: TrimMode::DryRun,
    };

    fn ranges() -> Vec<CheckpointRecord> {
        vec![
            CheckpointRecord::fresh(0, 0, 50),
            CheckpointRecord::fresh(1, 50, 100),
        ]
    }

    #[test]
    fn test_record_layout() {
        let rec = CheckpointRecord {
            worker_id: 2,
            error: 3,
            start: 10,
            finish: 20,
            position: 15,
            blocks: 99,
        };
        let buf = rec.encode();
        assert_eq!(LittleEndian::read_u32(&buf[0..]), 2);
        assert_eq!(LittleEndian::read_u32(&buf[4..]), 3);
        assert_eq!(LittleEndian::read_u64(&buf[24..]), 15);
        assert_eq!(LittleEndian::read_u64(&buf[32..]), 99);
        assert_eq!(CheckpointRecord::decode(&buf), Some(rec));
        assert_eq!(rec.error_name(), "TrimFailed");
        assert!(CheckpointRecord::decode(&buf[..39]).is_none());
    }

    #[test]
    fn test_create_then_update_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");
        {
            let (store, starts) = CheckpointStore::open_or_create(&path, DRY, &ranges()).unwrap();
            assert_eq!(starts, ranges());
            let mut rec = starts[1];
            rec.position = 70;
            rec.blocks = 12;
            store.update(&rec).unwrap();
        }
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, (HEADER_SIZE + 2 * RECORD_SIZE) as u64);

        let (_, starts) = CheckpointStore::open_or_create(&path, DRY, &ranges()).unwrap();
        assert_eq!(starts[0].position, 0);
        assert_eq!(starts[1].position, 70);
        assert_eq!(starts[1].blocks, 12);
    }

    #[test]
    fn test_failed_record_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");
        {
            let (store, starts) = CheckpointStore::open_or_create(&path, DRY, &ranges()).unwrap();
            let mut rec = starts[0];
            rec.error = PluckError::TrimFailed(String::new()).code();
            store.update(&rec).unwrap();
        }
        assert!(matches!(
            CheckpointStore::load(&path),
            Err(PluckError::IncompatibleCheckpoint(_))
        ));
        // Display still works
        let contents = read_contents(&path).unwrap();
        assert_eq!(contents.records[0].error, 3);
    }

    #[test]
    fn test_partition_mismatch_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");
        drop(CheckpointStore::open_or_create(&path, DRY, &ranges()).unwrap());

        let three = vec![
            CheckpointRecord::fresh(0, 0, 33),
            CheckpointRecord::fresh(1, 33, 66),
            CheckpointRecord::fresh(2, 66, 100),
        ];
        assert!(matches!(
            CheckpointStore::open_or_create(&path, DRY, &three),
            Err(PluckError::IncompatibleCheckpoint(_))
        ));

        let shifted = vec![
            CheckpointRecord::fresh(0, 0, 60),
            CheckpointRecord::fresh(1, 60, 120),
        ];
        assert!(matches!(
            CheckpointStore::open_or_create(&path, DRY, &shifted),
            Err(PluckError::IncompatibleCheckpoint(_))
        ));
    }

    #[test]
    fn test_settings_recorded_in_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");
        let settings = CheckpointSettings {
            block_size: 4096,
            mode: TrimMode::Destructive,
        };
        drop(CheckpointStore::open_or_create(&path, settings, &ranges()).unwrap());

        let data = std::fs::read(&path).unwrap();
        assert_eq!(LittleEndian::read_u32(&data[0..]), CHECKPOINT_VERSION);
        assert_eq!(LittleEndian::read_u32(&data[8..]), 4096);
        assert_eq!(LittleEndian::read_u32(&data[12..]), 1);
        assert_eq!(read_contents(&path).unwrap().settings, settings);
    }

    #[test]
    fn test_other_mode_or_block_size_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");
        drop(CheckpointStore::open_or_create(&path, DRY, &ranges()).unwrap());

        let destructive = CheckpointSettings {
            mode: TrimMode::Destructive,
            ..DRY
        };
        assert!(matches!(
            CheckpointStore::open_or_create(&path, destructive, &ranges()),
            Err(PluckError::IncompatibleCheckpoint(_))
        ));

        let bigger_blocks = CheckpointSettings {
            block_size: 4096,
            ..DRY
        };
        assert!(matches!(
            CheckpointStore::open_or_create(&path, bigger_blocks, &ranges()),
            Err(PluckError::IncompatibleCheckpoint(_))
        ));

        // The refused runs left the file as it was
        assert_eq!(read_contents(&path).unwrap().settings, DRY);
        assert!(CheckpointStore::open_or_create(&path, DRY, &ranges()).is_ok());
    }

    #[test]
    fn test_bad_header_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");

        // Version 1 files carry no block size or mode
        let mut data = vec![0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut data[0..], 1);
        LittleEndian::write_u32(&mut data[4..], 1);
        std::fs::write(&path, &data).unwrap();
        assert!(matches!(
            CheckpointStore::load(&path),
            Err(PluckError::IncompatibleCheckpoint(_))
        ));

        LittleEndian::write_u32(&mut data[0..], CHECKPOINT_VERSION);
        LittleEndian::write_u32(&mut data[4..], 257);
        std::fs::write(&path, &data).unwrap();
        assert!(matches!(
            read_contents(&path),
            Err(PluckError::IncompatibleCheckpoint(_))
        ));

        LittleEndian::write_u32(&mut data[4..], 1);
        LittleEndian::write_u32(&mut data[8..], 512);
        LittleEndian::write_u32(&mut data[12..], 7);
        std::fs::write(&path, &data).unwrap();
        assert!(matches!(
            read_contents(&path),
            Err(PluckError::IncompatibleCheckpoint(_))
        ));
    }

    #[test]
    fn test_truncated_file_fills_missing_slots() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");
        drop(CheckpointStore::create(&path, DRY, 2).unwrap());
        let (_, starts) = CheckpointStore::open_or_create(&path, DRY, &ranges()).unwrap();
        assert_eq!(starts, ranges());
        assert_eq!(read_contents(&path).unwrap().records.len(), 2);
    }

    #[test]
    fn test_update_out_of_range() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::create(dir.path().join("ckpt"), DRY, 1).unwrap();
        assert!(store.update(&CheckpointRecord::fresh(1, 0, 1)).is_err());
        assert!(CheckpointStore::create(dir.path().join("x"), DRY, 0).is_err());
    }
}
