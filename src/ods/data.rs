//! Data page decoding.
//!
//! A data page stores variable-length record fragments packed from the end
//! of the page towards the front, indexed by a fragment directory that
//! follows the fixed header: `count` entries of (offset, length).

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::ods::constants::*;

/// One fragment directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub offset: u16,
    pub length: u16,
}

impl Fragment {
    /// A zero-length entry is a released slot.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Exclusive end offset of the fragment bytes.
    pub fn end(&self) -> usize {
        self.offset as usize + self.length as usize
    }
}

/// Parsed data page header and fragment directory.
#[derive(Debug, Clone, Serialize)]
pub struct DataPage {
    pub sequence: i32,
    pub relation: u16,
    pub count: u16,
    pub fragments: Vec<Fragment>,
}

impl DataPage {
    /// Parse the fixed header and as much of the directory as fits in `data`.
    ///
    /// Returns `None` only when the fixed header itself is truncated; a
    /// directory running past the buffer is kept short and reported by
    /// [`DataPage::directory_end`] exceeding the page size.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < DPG_REPEAT {
            return None;
        }
        let count = LittleEndian::read_u16(&data[DPG_COUNT..]);

        let mut fragments = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let at = DPG_REPEAT + i * SIZE_DPG_REPEAT;
            if at + SIZE_DPG_REPEAT > data.len() {
                break;
            }
            fragments.push(Fragment {
                offset: LittleEndian::read_u16(&data[at..]),
                length: LittleEndian::read_u16(&data[at + 2..]),
            });
        }

        Some(DataPage {
            sequence: LittleEndian::read_i32(&data[DPG_SEQUENCE..]),
            relation: LittleEndian::read_u16(&data[DPG_RELATION..]),
            count,
            fragments,
        })
    }

    /// Exclusive end of the fixed header plus the full fragment directory.
    pub fn directory_end(&self) -> usize {
        DPG_REPEAT + self.count as usize * SIZE_DPG_REPEAT
    }

    /// Non-empty fragments.
    pub fn live_fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter().filter(|f| !f.is_empty())
    }
}
