//! Database file I/O.
//!
//! Provides [`Database`], the entry point for opening a database file. The
//! header page is read once at open time; pages are then read with
//! positioned reads (`pread`) so a single `&Database` can be shared by
//! several worker threads without seek contention. In writable mode,
//! [`Database::punch_hole`] deallocates byte ranges while keeping the
//! file's logical size.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use log::info;

use crate::ods::constants::*;
use crate::ods::header::HeaderPage;
use crate::PluckError;

/// Page-granular access to a database image.
///
/// Implemented by [`Database`]; the trimming engine is written against this
/// trait so it can run over any page source. Implementations must allow
/// concurrent calls on disjoint byte ranges.
pub trait PageStore: Sync {
    fn page_size(&self) -> u32;

    fn page_count(&self) -> u64;

    /// Read one full page into `buf` (exactly one page long).
    fn read_page_into(&self, page_number: u64, buf: &mut [u8]) -> Result<(), PluckError>;

    /// Deallocate a byte range, keeping the logical size.
    fn punch_hole(&self, offset: u64, length: u64) -> Result<(), PluckError>;
}

/// An open database file.
pub struct Database {
    file: File,
    path: PathBuf,
    file_size: u64,
    header: HeaderPage,
    page_count: u64,
    writable: bool,
}

impl Database {
    /// Open a database file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PluckError> {
        Self::open_with_mode(path, false)
    }

    /// Open a database file for reading and hole punching.
    pub fn open_writable<P: AsRef<Path>>(path: P) -> Result<Self, PluckError> {
        Self::open_with_mode(path, true)
    }

    fn open_with_mode<P: AsRef<Path>>(path: P, writable: bool) -> Result<Self, PluckError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|e| PluckError::Io(format!("Cannot open {}: {}", path.display(), e)))?;

        let file_size = file
            .metadata()
            .map_err(|e| PluckError::Io(format!("Cannot stat {}: {}", path.display(), e)))?
            .len();

        if file_size < SIZE_HEADER_FIXED as u64 {
            return Err(PluckError::Parse(format!(
                "File too small to be a database: {} bytes",
                file_size
            )));
        }

        let mut buf = vec![0u8; SIZE_HEADER_FIXED];
        file.read_exact_at(&mut buf, 0)
            .map_err(|e| PluckError::Io(format!("Cannot read header page: {}", e)))?;
        let header = HeaderPage::parse(&buf)?;

        let page_size = header.page_size as u64;
        if file_size % page_size != 0 {
            return Err(PluckError::Parse(format!(
                "File size {} is not a multiple of page size {}",
                file_size, page_size
            )));
        }
        let page_count = file_size / page_size;

        info!("Page size {}", header.page_size);
        info!(
            "ODS version {:x} ({})",
            header.ods_version.0,
            header.ods_version.product()
        );

        Ok(Database {
            file,
            path: path.to_path_buf(),
            file_size,
            header,
            page_count,
            writable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &HeaderPage {
        &self.header
    }

    pub fn page_size(&self) -> u32 {
        self.header.page_size
    }

    /// Total pages in the file (file size / page size).
    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Byte offset of a page.
    pub fn page_offset(&self, page_number: u64) -> u64 {
        page_number * self.header.page_size as u64
    }

    /// Read one full page into `buf`, which must be exactly one page long.
    ///
    /// A short read is an `Io` error.
    pub fn read_page_into(&self, page_number: u64, buf: &mut [u8]) -> Result<(), PluckError> {
        if page_number >= self.page_count {
            return Err(PluckError::Io(format!(
                "Page {} out of range (file has {} pages)",
                page_number, self.page_count
            )));
        }
        let offset = self.page_offset(page_number);
        self.file
            .read_exact_at(buf, offset)
            .map_err(|e| PluckError::Io(format!("Error read page {} at {}: {}", page_number, offset, e)))
    }

    /// Deallocate `[offset, offset + length)` without changing the file size.
    ///
    /// The range reads back as zeros afterwards. Any failure, including a
    /// read-only handle, is a `TrimFailed` error.
    pub fn punch_hole(&self, offset: u64, length: u64) -> Result<(), PluckError> {
        if !self.writable {
            return Err(PluckError::TrimFailed(format!(
                "{} is open read-only",
                self.path.display()
            )));
        }
        crate::util::fs::punch_hole(&self.file, offset, length)
    }
}

impl PageStore for Database {
    fn page_size(&self) -> u32 {
        Database::page_size(self)
    }

    fn page_count(&self) -> u64 {
        Database::page_count(self)
    }

    fn read_page_into(&self, page_number: u64, buf: &mut [u8]) -> Result<(), PluckError> {
        Database::read_page_into(self, page_number, buf)
    }

    fn punch_hole(&self, offset: u64, length: u64) -> Result<(), PluckError> {
        Database::punch_hole(self, offset, length)
    }
}
