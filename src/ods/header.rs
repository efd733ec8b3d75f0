//! Page header and database header page parsing.
//!
//! Every page begins with a 16-byte [`PageHeader`] whose first byte is the
//! page type tag. Page 0 additionally carries the database header
//! ([`HeaderPage`]): page size, ODS version, and a flags word whose bit
//! layout depends on the ODS family ([`HeaderFlags`]).

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::ods::constants::*;
use crate::ods::page_types::PageType;
use crate::ods::version::{FlagLayout, OdsFamily, OdsVersion};
use crate::PluckError;

/// Parsed 16-byte page header.
#[derive(Debug, Clone, Serialize)]
pub struct PageHeader {
    /// Page type tag. Byte 0.
    pub page_type: PageType,
    /// Page flags. Byte 1.
    pub flags: u8,
    /// Page checksum. Bytes 2-3.
    pub checksum: u16,
    /// Generation counter. Bytes 4-7.
    pub generation: u32,
    /// System change number. Bytes 8-11.
    pub scn: u32,
    /// Reserved (page number in later versions). Bytes 12-15.
    pub reserved: u32,
}

impl PageHeader {
    /// Parse a page header from a byte slice.
    ///
    /// The slice must be at least SIZE_PAGE_HEADER (16) bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SIZE_PAGE_HEADER {
            return None;
        }

        Some(PageHeader {
            page_type: PageType::from_u8(data[PAG_TYPE]),
            flags: data[PAG_FLAGS],
            checksum: LittleEndian::read_u16(&data[PAG_CHECKSUM..]),
            generation: LittleEndian::read_u32(&data[PAG_GENERATION..]),
            scn: LittleEndian::read_u32(&data[PAG_SCN..]),
            reserved: LittleEndian::read_u32(&data[PAG_RESERVED..]),
        })
    }
}

/// Shutdown state recorded in the header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShutdownMode {
    Online,
    Multi,
    Full,
    Single,
}

/// nbackup state recorded in the header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackupMode {
    Normal,
    /// Main file frozen, changes go to the delta file.
    Stalled,
    Merge,
    Unknown,
}

/// Replication role (current family only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplicaMode {
    None,
    ReadOnly,
    ReadWrite,
}

/// Header flags decoded with the family's bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderFlags {
    pub raw: u16,
    pub shutdown: ShutdownMode,
    pub backup: BackupMode,
    pub encrypted: bool,
    /// Encryption or decryption is running in the background.
    pub crypt_in_progress: bool,
    pub replica: ReplicaMode,
}

impl HeaderFlags {
    /// Decode the raw flags word for the given family.
    pub fn decode(raw: u16, family: OdsFamily) -> Self {
        let layout = FlagLayout::for_family(family);

        let shutdown = match raw & layout.shutdown_mask {
            v if v == layout.shutdown_single => ShutdownMode::Single,
            v if v == layout.shutdown_full => ShutdownMode::Full,
            v if v == layout.shutdown_multi => ShutdownMode::Multi,
            _ => ShutdownMode::Online,
        };

        let backup = match raw & layout.backup_mask {
            0 => BackupMode::Normal,
            v if v == layout.backup_stalled => BackupMode::Stalled,
            v if v == layout.backup_merge => BackupMode::Merge,
            _ => BackupMode::Unknown,
        };

        let replica = if layout.replica_mask == 0 {
            ReplicaMode::None
        } else {
            match raw & layout.replica_mask {
                v if v == layout.replica_read_only => ReplicaMode::ReadOnly,
                v if v == layout.replica_read_write => ReplicaMode::ReadWrite,
                _ => ReplicaMode::None,
            }
        };

        HeaderFlags {
            raw,
            shutdown,
            backup,
            encrypted: raw & layout.encrypted != 0,
            crypt_in_progress: layout.crypt_process != 0 && raw & layout.crypt_process != 0,
            replica,
        }
    }

    /// True when no engine can be writing the file: full shutdown or nbackup-stalled.
    pub fn is_locked(&self) -> bool {
        self.shutdown == ShutdownMode::Full || self.backup == BackupMode::Stalled
    }
}

/// Parsed database header (page 0).
#[derive(Debug, Clone, Serialize)]
pub struct HeaderPage {
    pub page_size: u32,
    pub ods_version: OdsVersion,
    pub next_page: u32,
    pub next_transaction: u32,
    pub raw_flags: u16,
}

impl HeaderPage {
    /// Parse the header page from the first bytes of the database file.
    ///
    /// Fails when the page type tag is not `header` or the stored page size is
    /// not one the engine can create. The ODS version is not validated here.
    pub fn parse(data: &[u8]) -> Result<Self, PluckError> {
        if data.len() < SIZE_HEADER_FIXED {
            return Err(PluckError::Parse(format!(
                "Header page too short: {} bytes",
                data.len()
            )));
        }

        let page_type = PageType::from_u8(data[PAG_TYPE]);
        if page_type != PageType::Header {
            return Err(PluckError::Parse(format!(
                "Page 0 is a {}, not a header page",
                page_type
            )));
        }

        let page_size = LittleEndian::read_u16(&data[HDR_PAGE_SIZE..]) as u32;
        // 32K is stored as 0x8000, which still fits the 16-bit field
        if !VALID_PAGE_SIZES.contains(&page_size) {
            return Err(PluckError::Parse(format!(
                "Invalid page size {} in header",
                page_size
            )));
        }

        Ok(HeaderPage {
            page_size,
            ods_version: OdsVersion(LittleEndian::read_u16(&data[HDR_ODS_VERSION..])),
            next_page: LittleEndian::read_u32(&data[HDR_NEXT_PAGE..]),
            next_transaction: LittleEndian::read_u32(&data[HDR_NEXT_TRANSACTION..]),
            raw_flags: LittleEndian::read_u16(&data[HDR_FLAGS..]),
        })
    }

    /// Resolve the ODS family; fails with `UnsupportedOds` for unknown tags.
    pub fn family(&self) -> Result<OdsFamily, PluckError> {
        self.ods_version.family()
    }

    /// Decode the flags word. Requires a supported ODS version.
    pub fn flags(&self) -> Result<HeaderFlags, PluckError> {
        Ok(HeaderFlags::decode(self.raw_flags, self.family()?))
    }
}
