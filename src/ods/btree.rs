//! Index b-tree page decoding.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::ods::constants::*;

/// Parsed b-tree bucket header.
#[derive(Debug, Clone, Serialize)]
pub struct BTreePage {
    /// Right sibling page.
    pub sibling: u32,
    pub left_sibling: u32,
    pub prefix_total: i32,
    pub relation: u16,
    /// Bytes of node data following the fixed header.
    pub length: u16,
    pub id: u8,
    /// 0 for leaf buckets.
    pub level: u8,
    pub jump_interval: u16,
    pub jump_size: u16,
    pub jump_count: u8,
}

impl BTreePage {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < BTR_NODES {
            return None;
        }
        Some(BTreePage {
            sibling: LittleEndian::read_u32(&data[BTR_SIBLING..]),
            left_sibling: LittleEndian::read_u32(&data[BTR_LEFT_SIBLING..]),
            prefix_total: LittleEndian::read_i32(&data[BTR_PREFIX_TOTAL..]),
            relation: LittleEndian::read_u16(&data[BTR_RELATION..]),
            length: LittleEndian::read_u16(&data[BTR_LENGTH..]),
            id: data[BTR_ID],
            level: data[BTR_LEVEL],
            jump_interval: LittleEndian::read_u16(&data[BTR_JUMP_INTERVAL..]),
            jump_size: LittleEndian::read_u16(&data[BTR_JUMP_SIZE..]),
            jump_count: data[BTR_JUMP_COUNT],
        })
    }

    /// Exclusive end of the fixed header plus the bucket.
    pub fn bucket_end(&self) -> usize {
        BTR_NODES + self.length as usize
    }
}
