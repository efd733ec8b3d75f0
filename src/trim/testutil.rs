//! Synthetic database images for unit tests.

use std::sync::Mutex;

use byteorder::{ByteOrder, LittleEndian};

use crate::ods::constants::*;
use crate::ods::database::PageStore;
use crate::ods::version::{OdsFamily, PipLayout};
use crate::trim::Hole;
use crate::PluckError;

/// Builder for an in-memory database image.
pub struct DbImage {
    pub page_size: u32,
    pub pages: u64,
    pub data: Vec<u8>,
}

impl DbImage {
    /// Header page filled in, every other page zeroed.
    pub fn new(page_size: u32, pages: u64, ods: u16) -> Self {
        let mut data = vec![0u8; page_size as usize * pages as usize];
        data[PAG_TYPE] = 1;
        LittleEndian::write_u16(&mut data[HDR_PAGE_SIZE..], page_size as u16);
        LittleEndian::write_u16(&mut data[HDR_ODS_VERSION..], ods);
        DbImage {
            page_size,
            pages,
            data,
        }
    }

    pub fn page_mut(&mut self, page: u64) -> &mut [u8] {
        let ps = self.page_size as usize;
        let start = page as usize * ps;
        &mut self.data[start..start + ps]
    }

    pub fn set_pip(&mut self, page: u64, family: OdsFamily, min: u32, free: &[u64]) {
        let bits = PipLayout::for_family(family).bits_offset;
        let buf = self.page_mut(page);
        buf.fill(0);
        buf[PAG_TYPE] = 2;
        LittleEndian::write_u32(&mut buf[PIP_MIN..], min);
        for &i in free {
            buf[bits + (i / 8) as usize] |= 1 << (i % 8);
        }
    }

    /// Page with the given type tag and every body byte non-zero.
    pub fn fill_page(&mut self, page: u64, tag: u8) {
        let buf = self.page_mut(page);
        buf.fill(0xAB);
        buf[PAG_TYPE] = tag;
    }

    /// Data page with a fragment directory; fragment bytes are set to 0xCD,
    /// everything else in the body stays zero unless `noise` is set.
    pub fn set_data_page(&mut self, page: u64, fragments: &[(u16, u16)], noise: bool) {
        let buf = self.page_mut(page);
        buf.fill(if noise { 0x11 } else { 0 });
        buf[PAG_TYPE] = 5;
        LittleEndian::write_u16(&mut buf[DPG_COUNT..], fragments.len() as u16);
        for (i, &(off, len)) in fragments.iter().enumerate() {
            let at = DPG_REPEAT + i * SIZE_DPG_REPEAT;
            LittleEndian::write_u16(&mut buf[at..], off);
            LittleEndian::write_u16(&mut buf[at + 2..], len);
            buf[off as usize..off as usize + len as usize].fill(0xCD);
        }
    }

    pub fn set_blob_page(&mut self, page: u64, length: u16, noise: bool) {
        let buf = self.page_mut(page);
        buf.fill(if noise { 0x22 } else { 0 });
        buf[PAG_TYPE] = 8;
        LittleEndian::write_u16(&mut buf[BLP_LENGTH..], length);
        buf[BLP_PAGE..BLP_PAGE + length as usize].fill(0xEE);
    }

    pub fn set_btree_page(&mut self, page: u64, length: u16, noise: bool) {
        let buf = self.page_mut(page);
        buf.fill(if noise { 0x33 } else { 0 });
        buf[PAG_TYPE] = 7;
        LittleEndian::write_u16(&mut buf[BTR_LENGTH..], length);
        buf[BTR_NODES..BTR_NODES + length as usize].fill(0x77);
    }

    pub fn into_store(self) -> MemoryStore {
        MemoryStore {
            page_size: self.page_size,
            pages: self.pages,
            data: Mutex::new(self.data),
            punched: Mutex::new(Vec::new()),
            fail_read_at: None,
            fail_punch: false,
        }
    }
}

/// In-memory [`PageStore`] that records every punched hole.
pub struct MemoryStore {
    page_size: u32,
    pages: u64,
    data: Mutex<Vec<u8>>,
    punched: Mutex<Vec<Hole>>,
    fail_read_at: Option<u64>,
    fail_punch: bool,
}

impl MemoryStore {
    pub fn failing_reads_at(mut self, page: u64) -> Self {
        self.fail_read_at = Some(page);
        self
    }

    pub fn failing_punches(mut self) -> Self {
        self.fail_punch = true;
        self
    }

    pub fn punched(&self) -> Vec<Hole> {
        let mut holes = self.punched.lock().unwrap().clone();
        holes.sort_by_key(|h| h.offset);
        holes
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl PageStore for MemoryStore {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn page_count(&self) -> u64 {
        self.pages
    }

    fn read_page_into(&self, page_number: u64, buf: &mut [u8]) -> Result<(), PluckError> {
        if Some(page_number) == self.fail_read_at || page_number >= self.pages {
            return Err(PluckError::Io(format!("Error read page {}", page_number)));
        }
        let ps = self.page_size as usize;
        let start = page_number as usize * ps;
        buf.copy_from_slice(&self.data.lock().unwrap()[start..start + ps]);
        Ok(())
    }

    fn punch_hole(&self, offset: u64, length: u64) -> Result<(), PluckError> {
        if self.fail_punch {
            return Err(PluckError::TrimFailed(format!("fallocate failed at {}", offset)));
        }
        let mut data = self.data.lock().unwrap();
        data[offset as usize..(offset + length) as usize].fill(0);
        self.punched.lock().unwrap().push(Hole { offset, length });
        Ok(())
    }
}
