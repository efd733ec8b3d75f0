//! ODS version detection and per-family layout selection.
//!
//! The 16-bit ODS tag in the header page carries a vendor flag in the high
//! bits and the major version in the low byte. Supported tags fall into two
//! structural families: [`OdsFamily::Legacy`] (ODS 11, Firebird 2.X and
//! RedDatabase 2.X) and [`OdsFamily::Current`] (ODS 12 and 13). Every other
//! tag is rejected with [`PluckError::UnsupportedOds`].

use serde::Serialize;
use std::fmt;

use crate::ods::constants::*;
use crate::PluckError;

/// Structural family of an ODS version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OdsFamily {
    /// ODS 11: signed PIP `min`, backup and shutdown bits in the high byte.
    Legacy,
    /// ODS 12+: unsigned PIP `min` plus extent/used accounting, crypt and replica flags.
    Current,
}

impl fmt::Display for OdsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OdsFamily::Legacy => write!(f, "legacy"),
            OdsFamily::Current => write!(f, "current"),
        }
    }
}

/// A supported ODS tag and the product that writes it.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SupportedOds {
    pub tag: u16,
    pub product: &'static str,
    pub family: OdsFamily,
}

/// Every ODS tag this tool knows how to trim.
pub const SUPPORTED_ODS: [SupportedOds; 6] = [
    SupportedOds {
        tag: 0x800B,
        product: "Firebird 2.X",
        family: OdsFamily::Legacy,
    },
    SupportedOds {
        tag: 0xE002,
        product: "RedDatabase 2.X",
        family: OdsFamily::Legacy,
    },
    SupportedOds {
        tag: 0x800C,
        product: "Firebird 3.X",
        family: OdsFamily::Current,
    },
    SupportedOds {
        tag: 0x800D,
        product: "Firebird 4.X",
        family: OdsFamily::Current,
    },
    SupportedOds {
        tag: 0xE00C,
        product: "RedDatabase 3.X",
        family: OdsFamily::Current,
    },
    SupportedOds {
        tag: 0xE00D,
        product: "RedDatabase 4.X",
        family: OdsFamily::Current,
    },
];

/// Raw ODS tag read from the header page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OdsVersion(pub u16);

impl OdsVersion {
    fn lookup(self) -> Option<&'static SupportedOds> {
        SUPPORTED_ODS.iter().find(|s| s.tag == self.0)
    }

    /// Resolve the structural family, failing for unrecognized tags.
    ///
    /// # Examples
    ///
    /// ```
    /// use pluck::ods::version::{OdsFamily, OdsVersion};
    ///
    /// assert_eq!(OdsVersion(0x800B).family().unwrap(), OdsFamily::Legacy);
    /// assert_eq!(OdsVersion(0x800D).family().unwrap(), OdsFamily::Current);
    /// assert!(OdsVersion(0x000A).family().is_err());
    /// ```
    pub fn family(self) -> Result<OdsFamily, PluckError> {
        self.lookup()
            .map(|s| s.family)
            .ok_or_else(|| PluckError::UnsupportedOds(format!("ODS version 0x{:04X}", self.0)))
    }

    /// Product name for supported tags, empty otherwise.
    pub fn product(self) -> &'static str {
        self.lookup().map(|s| s.product).unwrap_or("")
    }
}

impl fmt::Display for OdsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Byte layout of a page inventory page for one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipLayout {
    /// Offset of the `min` field.
    pub min_offset: usize,
    /// Whether `min` is stored signed.
    pub min_signed: bool,
    /// Offset of the first bitmap byte.
    pub bits_offset: usize,
}

impl PipLayout {
    pub fn for_family(family: OdsFamily) -> Self {
        match family {
            OdsFamily::Legacy => PipLayout {
                min_offset: PIP_MIN,
                min_signed: true,
                bits_offset: LEGACY_PIP_BITS,
            },
            OdsFamily::Current => PipLayout {
                min_offset: PIP_MIN,
                min_signed: false,
                bits_offset: CURRENT_PIP_BITS,
            },
        }
    }

    /// Number of pages tracked by one PIP.
    pub fn pages_per_pip(&self, page_size: u32) -> u64 {
        (page_size as u64 - self.bits_offset as u64) * 8
    }
}

/// Header flag masks for one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagLayout {
    pub shutdown_mask: u16,
    pub shutdown_multi: u16,
    pub shutdown_full: u16,
    pub shutdown_single: u16,
    pub backup_mask: u16,
    pub backup_stalled: u16,
    pub backup_merge: u16,
    pub encrypted: u16,
    pub crypt_process: u16,
    pub replica_mask: u16,
    pub replica_read_only: u16,
    pub replica_read_write: u16,
}

impl FlagLayout {
    pub fn for_family(family: OdsFamily) -> Self {
        match family {
            OdsFamily::Legacy => FlagLayout {
                shutdown_mask: LEGACY_HDR_SHUTDOWN_MASK,
                shutdown_multi: LEGACY_HDR_SHUTDOWN_MULTI,
                shutdown_full: LEGACY_HDR_SHUTDOWN_FULL,
                shutdown_single: LEGACY_HDR_SHUTDOWN_SINGLE,
                backup_mask: LEGACY_HDR_BACKUP_MASK,
                backup_stalled: LEGACY_HDR_NBAK_STALLED,
                backup_merge: LEGACY_HDR_NBAK_MERGE,
                encrypted: LEGACY_HDR_ENCRYPTED,
                crypt_process: 0,
                replica_mask: 0,
                replica_read_only: 0,
                replica_read_write: 0,
            },
            OdsFamily::Current => FlagLayout {
                shutdown_mask: CURRENT_HDR_SHUTDOWN_MASK,
                shutdown_multi: CURRENT_HDR_SHUTDOWN_MULTI,
                shutdown_full: CURRENT_HDR_SHUTDOWN_FULL,
                shutdown_single: CURRENT_HDR_SHUTDOWN_SINGLE,
                backup_mask: CURRENT_HDR_BACKUP_MASK,
                backup_stalled: CURRENT_HDR_NBAK_STALLED,
                backup_merge: CURRENT_HDR_NBAK_MERGE,
                encrypted: CURRENT_HDR_ENCRYPTED,
                crypt_process: CURRENT_HDR_CRYPT_PROCESS,
                replica_mask: CURRENT_HDR_REPLICA_MASK,
                replica_read_only: CURRENT_HDR_REPLICA_READ_ONLY,
                replica_read_write: CURRENT_HDR_REPLICA_READ_WRITE,
            },
        }
    }
}
