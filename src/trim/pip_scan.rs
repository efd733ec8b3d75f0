//! Stage 1: whole-page holes from the page inventory chain.
//!
//! The first PIP lives at page 1 and covers pages `[0, N)`, where
//! N = pages-per-PIP. Every following PIP sits on the last page of the
//! previous range, at `k × N − 1`, and covers `[k × N, (k + 1) × N)`. The
//! scan walks those ranges once, verifying each PIP's type tag, and plans a
//! whole-page hole for every page whose bit is set.
//!
//! A free page that already reads back as zeros (punched by an earlier run)
//! is counted as free but gets no hole, so repeated runs converge.

use log::{debug, trace};
use serde::Serialize;

use crate::ods::constants::FIRST_PIP_PAGE;
use crate::ods::database::PageStore;
use crate::ods::pip::PipPage;
use crate::ods::version::{OdsFamily, PipLayout};
use crate::trim::Hole;
use crate::util::fs::is_zeroed;
use crate::PluckError;

/// Dense bitset of free page numbers.
#[derive(Debug, Clone, Default)]
pub struct FreePageSet {
    words: Vec<u64>,
    len: u64,
}

impl FreePageSet {
    pub fn with_capacity(pages: u64) -> Self {
        FreePageSet {
            words: vec![0u64; pages.div_ceil(64) as usize],
            len: 0,
        }
    }

    pub fn insert(&mut self, page: u64) {
        let word = (page / 64) as usize;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let bit = 1u64 << (page % 64);
        if self.words[word] & bit == 0 {
            self.words[word] |= bit;
            self.len += 1;
        }
    }

    pub fn contains(&self, page: u64) -> bool {
        self.words
            .get((page / 64) as usize)
            .is_some_and(|w| w & (1u64 << (page % 64)) != 0)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Outcome of a Stage 1 scan. Nothing has been punched yet.
#[derive(Debug, Clone, Default)]
pub struct PipScan {
    /// Pages marked free in the inventory.
    pub free_pages: FreePageSet,
    /// Whole-page holes still worth punching.
    pub holes: Vec<Hole>,
    /// Free pages skipped because they already read back as zeros.
    pub already_trimmed: u64,
    /// Page inventory pages visited.
    pub pips_read: u64,
}

/// Summary of Stage 1 for reports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipScanSummary {
    pub free_pages: u64,
    pub pages_trimmable: u64,
    pub already_trimmed: u64,
    pub pips_read: u64,
    pub bytes: u64,
}

impl PipScan {
    pub fn summary(&self) -> PipScanSummary {
        PipScanSummary {
            free_pages: self.free_pages.len(),
            pages_trimmable: self.holes.len() as u64,
            already_trimmed: self.already_trimmed,
            pips_read: self.pips_read,
            bytes: self.holes.iter().map(|h| h.length).sum(),
        }
    }
}

/// Walk the PIP chain and plan whole-page holes.
///
/// Any read failure or a PIP with the wrong type tag aborts the scan; the
/// partial plan is dropped.
pub fn scan(store: &dyn PageStore, family: OdsFamily) -> Result<PipScan, PluckError> {
    let page_size = store.page_size();
    let total_pages = store.page_count();
    let pages_per_pip = PipLayout::for_family(family).pages_per_pip(page_size);

    let mut result = PipScan {
        free_pages: FreePageSet::with_capacity(total_pages),
        ..PipScan::default()
    };
    if total_pages <= FIRST_PIP_PAGE {
        return Ok(result);
    }

    let mut pip_buf = vec![0u8; page_size as usize];
    let mut page_buf = vec![0u8; page_size as usize];
    let mut pip_page_number = FIRST_PIP_PAGE;
    let mut range_start = 0u64;

    loop {
        debug!("Read pip page {} (pip #{})", pip_page_number, result.pips_read + 1);
        store.read_page_into(pip_page_number, &mut pip_buf)?;
        let pip = PipPage::parse(&pip_buf, family, pip_page_number)?;
        result.pips_read += 1;

        // The last page of this range holds the next PIP
        let next_pip = range_start + pages_per_pip - 1;
        let first = range_start + pip.min();
        let last = next_pip.min(total_pages);

        for page in first..last {
            if page == pip_page_number || !pip.is_free(page - range_start) {
                continue;
            }
            result.free_pages.insert(page);

            store.read_page_into(page, &mut page_buf)?;
            if is_zeroed(&page_buf) {
                result.already_trimmed += 1;
                continue;
            }
            trace!("trim page {}", page);
            result.holes.push(Hole {
                offset: page * page_size as u64,
                length: page_size as u64,
            });
        }

        if next_pip >= total_pages {
            break;
        }
        pip_page_number = next_pip;
        range_start += pages_per_pip;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trim::testutil::*;

    #[test]
    fn test_free_page_set() {
        let mut set = FreePageSet::with_capacity(10);
        assert!(set.is_empty());
        set.insert(3);
        set.insert(3);
        set.insert(200);
        assert_eq!(set.len(), 2);
        assert!(set.contains(3));
        assert!(set.contains(200));
        assert!(!set.contains(4));
        assert!(!set.contains(100_000));
    }

    #[test]
    fn test_free_decision_matches_bitmap() {
        let family = OdsFamily::Current;
        let free = [2u64, 3, 7, 15];
        let mut image = DbImage::new(1024, 16, 0x800C);
        image.set_pip(1, family, 0, &free);
        for p in 2..16 {
            image.fill_page(p, 5);
        }
        let store = image.into_store();

        let scan = scan(&store, family).unwrap();
        let holes: Vec<u64> = scan.holes.iter().map(|h| h.offset / 1024).collect();
        assert_eq!(holes, free.to_vec());
        assert!(scan.holes.iter().all(|h| h.length == 1024));
        assert_eq!(scan.free_pages.len(), 4);
        assert_eq!(scan.pips_read, 1);
        for p in 0..16 {
            assert_eq!(scan.free_pages.contains(p), free.contains(&p));
        }
    }

    #[test]
    fn test_scan_starts_at_min() {
        let family = OdsFamily::Legacy;
        let mut image = DbImage::new(1024, 12, 0x800B);
        image.set_pip(1, family, 6, &[3, 4, 6, 9]);
        for p in 2..12 {
            image.fill_page(p, 5);
        }
        let scan = scan(&image.into_store(), family).unwrap();
        let holes: Vec<u64> = scan.holes.iter().map(|h| h.offset / 1024).collect();
        assert_eq!(holes, vec![6, 9]);
    }

    #[test]
    fn test_zeroed_free_pages_not_replanned() {
        let family = OdsFamily::Current;
        let mut image = DbImage::new(1024, 8, 0x800C);
        image.set_pip(1, family, 0, &[4, 5]);
        image.fill_page(4, 5);
        // page 5 left all zeros
        let scan = scan(&image.into_store(), family).unwrap();
        assert_eq!(scan.free_pages.len(), 2);
        assert_eq!(scan.holes.len(), 1);
        assert_eq!(scan.already_trimmed, 1);
        let summary = scan.summary();
        assert_eq!(summary.bytes, 1024);
        assert_eq!(summary.pages_trimmable, 1);
    }

    #[test]
    fn test_follows_pip_chain() {
        let family = OdsFamily::Current;
        let ppp = PipLayout::for_family(family).pages_per_pip(1024);
        let total = ppp + 20;
        let mut image = DbImage::new(1024, total, 0x800C);
        image.set_pip(1, family, 0, &[10]);
        // Second PIP sits on the last page of the first range
        let second = ppp - 1;
        image.set_pip(second, family, 0, &[0, 5]);
        image.fill_page(10, 5);
        image.fill_page(ppp, 7);
        image.fill_page(ppp + 5, 8);

        let scan = scan(&image.into_store(), family).unwrap();
        let holes: Vec<u64> = scan.holes.iter().map(|h| h.offset / 1024).collect();
        assert_eq!(holes, vec![10, ppp, ppp + 5]);
        assert_eq!(scan.pips_read, 2);
    }

    #[test]
    fn test_corrupt_second_pip() {
        let family = OdsFamily::Legacy;
        let ppp = PipLayout::for_family(family).pages_per_pip(1024);
        let mut image = DbImage::new(1024, ppp + 4, 0x800B);
        image.set_pip(1, family, 0, &[5]);
        image.fill_page(5, 5);
        image.fill_page(ppp - 1, 5); // data page where the PIP should be

        let err = scan(&image.into_store(), family).unwrap_err();
        assert!(matches!(err, PluckError::CorruptPip(_)));
    }

    #[test]
    fn test_corrupt_first_pip() {
        let mut image = DbImage::new(1024, 4, 0x800C);
        image.fill_page(1, 4);
        let err = scan(&image.into_store(), OdsFamily::Current).unwrap_err();
        assert!(matches!(err, PluckError::CorruptPip(_)));
    }

    #[test]
    fn test_single_page_file() {
        let image = DbImage::new(1024, 1, 0x800C);
        let scan = scan(&image.into_store(), OdsFamily::Current).unwrap();
        assert!(scan.holes.is_empty());
        assert_eq!(scan.pips_read, 0);
    }

    #[test]
    fn test_short_read_is_io_error() {
        let family = OdsFamily::Current;
        let mut image = DbImage::new(1024, 6, 0x800C);
        image.set_pip(1, family, 0, &[3]);
        image.fill_page(3, 5);
        let store = image.into_store().failing_reads_at(3);
        assert!(matches!(scan(&store, family), Err(PluckError::Io(_))));
    }
}
