//! Block occupancy bitmaps.
//!
//! A page is split into `page_size / block_size` blocks (at most 64). Bit
//! `k` of an [`OccupancyBitmap`] is set when block `k` holds at least one
//! occupied byte. A byte range `[a, b)` spans blocks
//! `a / block_size ..= (b - 1) / block_size`.
//!
//! Only data, b-tree and blob pages get a structural bitmap. Every other
//! page type yields an empty bitmap, which the planner treats as "nothing
//! to trim at block level". Pages whose structure points past the page end
//! are reported as fully occupied.

use serde::Serialize;

use crate::ods::constants::MAX_BLOCKS_PER_PAGE;
use crate::ods::view::PageView;
use crate::ods::version::OdsFamily;
use crate::PluckError;

/// Page and block sizes of a run, with the derived blocks-per-page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockGeometry {
    pub page_size: u32,
    pub block_size: u32,
    pub blocks_per_page: u32,
}

impl BlockGeometry {
    pub fn new(page_size: u32, block_size: u32) -> Result<Self, PluckError> {
        if block_size == 0 || page_size % block_size != 0 {
            return Err(PluckError::Argument(format!(
                "Block size {} does not divide page size {}",
                block_size, page_size
            )));
        }
        let blocks_per_page = page_size / block_size;
        if blocks_per_page > MAX_BLOCKS_PER_PAGE {
            return Err(PluckError::Argument(format!(
                "Page size {} holds {} blocks of {}, more than {}",
                page_size, blocks_per_page, block_size, MAX_BLOCKS_PER_PAGE
            )));
        }
        Ok(BlockGeometry {
            page_size,
            block_size,
            blocks_per_page,
        })
    }
}

/// One bit per block of a page; set means occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyBitmap {
    bits: u64,
    width: u32,
}

impl OccupancyBitmap {
    pub fn empty(width: u32) -> Self {
        OccupancyBitmap { bits: 0, width }
    }

    pub fn full(width: u32) -> Self {
        OccupancyBitmap {
            bits: Self::mask(width),
            width,
        }
    }

    pub fn from_bits(bits: u64, width: u32) -> Self {
        OccupancyBitmap {
            bits: bits & Self::mask(width),
            width,
        }
    }

    fn mask(width: u32) -> u64 {
        if width >= 64 {
            u64::MAX
        } else {
            (1u64 << width) - 1
        }
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_set(&self, block: u32) -> bool {
        block < self.width && self.bits & (1u64 << block) != 0
    }

    pub fn is_full(&self) -> bool {
        self.bits == Self::mask(self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Mark every block touched by bytes `[start, end)`.
    pub fn mark_bytes(&mut self, start: usize, end: usize, block_size: u32) {
        if end <= start {
            return;
        }
        let first = (start / block_size as usize) as u32;
        let last = ((end - 1) / block_size as usize) as u32;
        for block in first..=last.min(self.width - 1) {
            self.bits |= 1u64 << block;
        }
    }
}

/// Compute the occupancy bitmap of one page buffer.
pub fn analyze(page: &[u8], family: OdsFamily, geometry: &BlockGeometry) -> OccupancyBitmap {
    let width = geometry.blocks_per_page;
    let page_size = geometry.page_size as usize;
    let block_size = geometry.block_size;
    let nearly_full = page_size - block_size as usize;

    match PageView::decode(page, family) {
        PageView::Data(dp) => {
            let directory_end = dp.directory_end();
            if directory_end > page_size || dp.live_fragments().any(|f| f.end() > page_size) {
                return OccupancyBitmap::full(width);
            }
            let mut bitmap = OccupancyBitmap::empty(width);
            bitmap.mark_bytes(0, directory_end, block_size);
            for fragment in dp.live_fragments() {
                bitmap.mark_bytes(fragment.offset as usize, fragment.end(), block_size);
            }
            bitmap
        }
        PageView::BTree(bt) => span_or_full(bt.bucket_end(), nearly_full, width, block_size),
        PageView::Blob(bp) => span_or_full(bp.content_end(), nearly_full, width, block_size),
        PageView::Inventory(_) | PageView::Other(_) => OccupancyBitmap::empty(width),
    }
}

fn span_or_full(end: usize, nearly_full: usize, width: u32, block_size: u32) -> OccupancyBitmap {
    if end >= nearly_full {
        return OccupancyBitmap::full(width);
    }
    let mut bitmap = OccupancyBitmap::empty(width);
    bitmap.mark_bytes(0, end, block_size);
    bitmap
}
