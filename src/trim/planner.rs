//! Turn an occupancy bitmap into hole-punch operations.
//!
//! Unused blocks are grouped greedily from the left into runs of at most
//! [`MAX_RUN_BLOCKS`]. Runs never overlap and together cover exactly the
//! clear bits of the bitmap.

use crate::trim::occupancy::OccupancyBitmap;
use crate::trim::Hole;

/// Longest run of blocks merged into a single hole.
pub const MAX_RUN_BLOCKS: u32 = 3;

/// Plan the block-level holes of one page starting at `page_offset`.
///
/// A full bitmap has nothing to give back; an empty one means the page
/// type has no block-level analysis, so both yield no holes.
pub fn plan(bitmap: &OccupancyBitmap, page_offset: u64, block_size: u32) -> Vec<Hole> {
    let mut holes = Vec::new();
    if bitmap.is_full() || bitmap.is_empty() {
        return holes;
    }

    let width = bitmap.width();
    let mut block = 0u32;
    while block < width {
        if bitmap.is_set(block) {
            block += 1;
            continue;
        }
        let limit = MAX_RUN_BLOCKS.min(width - block);
        let run = (1..limit)
            .take_while(|k| !bitmap.is_set(block + k))
            .count() as u32
            + 1;
        holes.push(Hole {
            offset: page_offset + block as u64 * block_size as u64,
            length: run as u64 * block_size as u64,
        });
        block += run;
    }
    holes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(holes: &[Hole], page_offset: u64, block_size: u64) -> Vec<(u64, u64)> {
        holes
            .iter()
            .map(|h| {
                let first = (h.offset - page_offset) / block_size;
                (first, first + h.length / block_size - 1)
            })
            .collect()
    }

    #[test]
    fn test_scenario_page() {
        let bm = OccupancyBitmap::from_bits((1 << 0) | (1 << 5), 8);
        let holes = plan(&bm, 3 * 4096, 512);
        assert_eq!(blocks(&holes, 3 * 4096, 512), vec![(1, 3), (4, 4), (6, 7)]);
        assert_eq!(holes.iter().map(|h| h.length).sum::<u64>(), 3072);
    }

    #[test]
    fn test_full_and_empty_skip() {
        assert!(plan(&OccupancyBitmap::full(8), 0, 512).is_empty());
        assert!(plan(&OccupancyBitmap::empty(8), 0, 512).is_empty());
        assert!(plan(&OccupancyBitmap::full(64), 0, 512).is_empty());
    }

    #[test]
    fn test_single_free_block() {
        let bm = OccupancyBitmap::from_bits(0b1111_1011, 8);
        let holes = plan(&bm, 0, 4096);
        assert_eq!(
            holes,
            vec![Hole {
                offset: 2 * 4096,
                length: 4096
            }]
        );
    }

    #[test]
    fn test_run_cap_at_page_end() {
        // Only block 0 used; seven free blocks -> 3 + 3 + 1
        let bm = OccupancyBitmap::from_bits(0b1, 8);
        let holes = plan(&bm, 0, 512);
        assert_eq!(blocks(&holes, 0, 512), vec![(1, 3), (4, 6), (7, 7)]);
    }

    #[test]
    fn test_coverage_and_minimality_all_patterns() {
        // Every 8-bit pattern except the skipped all-zero and all-one ones
        for bits in 1u64..0xFF {
            let bm = OccupancyBitmap::from_bits(bits, 8);
            let holes = plan(&bm, 8192, 512);

            let mut covered = 0u64;
            for h in &holes {
                assert!(h.length >= 512 && h.length <= MAX_RUN_BLOCKS as u64 * 512);
                let first = (h.offset - 8192) / 512;
                for b in first..first + h.length / 512 {
                    assert_eq!(covered & (1 << b), 0, "overlap in {:#010b}", bits);
                    covered |= 1 << b;
                }
            }
            assert_eq!(covered, !bits & 0xFF, "coverage in {:#010b}", bits);

            // Touching holes only when the left one is at the cap
            for pair in holes.windows(2) {
                if pair[0].end() == pair[1].offset {
                    assert_eq!(pair[0].length, MAX_RUN_BLOCKS as u64 * 512);
                }
            }
        }
    }

    #[test]
    fn test_wide_bitmap() {
        let bm = OccupancyBitmap::from_bits(1u64 << 63, 64);
        let holes = plan(&bm, 0, 512);
        assert_eq!(holes.iter().map(|h| h.length).sum::<u64>(), 63 * 512);
        assert_eq!(holes.len(), 21);
    }
}
