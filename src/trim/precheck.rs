//! Checks run before any scanning or trimming.
//!
//! Each failure maps to its own [`PluckError`] variant (and exit code):
//! unsupported ODS, bad block size, database not locked for a destructive
//! run, and encryption. For the current ODS family an encrypted database is
//! not an error: Stage 2 is switched off, since page contents cannot be
//! decoded, while Stage 1 still works from the plaintext inventory pages.

use log::warn;
use serde::Serialize;

use crate::ods::constants::*;
use crate::ods::header::{HeaderFlags, HeaderPage};
use crate::ods::version::OdsFamily;
use crate::trim::TrimMode;
use crate::PluckError;

/// What Stage 2 will do for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage2Plan {
    /// Block-level analysis runs.
    Run,
    /// Block size equals page size; there is no sub-page granularity.
    NoOp,
    /// Page contents are encrypted; analysis is skipped.
    SkippedEncrypted,
}

/// Result of a successful precondition check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Preconditions {
    pub family: OdsFamily,
    pub flags: HeaderFlags,
    pub stage2: Stage2Plan,
}

/// Validate a header against the requested block size and mode.
pub fn validate(
    header: &HeaderPage,
    block_size: u32,
    mode: TrimMode,
) -> Result<Preconditions, PluckError> {
    let family = header.family()?;
    let flags = HeaderFlags::decode(header.raw_flags, family);

    if !VALID_BLOCK_SIZES.contains(&block_size) {
        return Err(PluckError::Argument(format!(
            "Wrong block size {}, expected 512 or 4096",
            block_size
        )));
    }
    if block_size > header.page_size {
        return Err(PluckError::Argument(format!(
            "Block size ({}) greater than page size ({})",
            block_size, header.page_size
        )));
    }

    if mode.is_destructive() && !flags.is_locked() {
        return Err(PluckError::DatabaseNotLocked(format!(
            "shutdown mode {:?}, backup mode {:?}",
            flags.shutdown, flags.backup
        )));
    }

    let mut stage2 = if block_size == header.page_size {
        Stage2Plan::NoOp
    } else {
        Stage2Plan::Run
    };

    if flags.encrypted || flags.crypt_in_progress {
        match family {
            OdsFamily::Legacy => {
                return Err(PluckError::DatabaseEncrypted(format!(
                    "ODS {} database is encrypted",
                    header.ods_version
                )));
            }
            OdsFamily::Current => {
                warn!("Database is encrypted or changing encryption state, block-level trimming skipped");
                stage2 = Stage2Plan::SkippedEncrypted;
            }
        }
    }

    Ok(Preconditions {
        family,
        flags,
        stage2,
    })
}
