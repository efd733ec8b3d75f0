//! Page inventory page (PIP) decoding.
//!
//! A PIP is a bitmap over a contiguous run of pages: bit `i` set means page
//! `i` of the covered range is free. The bitmap start offset, and therefore
//! the number of pages one PIP covers, depends on the ODS family
//! ([`PipLayout`]).

use byteorder::{ByteOrder, LittleEndian};

use crate::ods::header::PageHeader;
use crate::ods::page_types::PageType;
use crate::ods::version::{OdsFamily, PipLayout};
use crate::PluckError;

/// Borrowed view over a PIP buffer.
#[derive(Debug, Clone, Copy)]
pub struct PipPage<'a> {
    data: &'a [u8],
    layout: PipLayout,
}

impl<'a> PipPage<'a> {
    /// Wrap a full page buffer, checking its type tag.
    ///
    /// `page_number` is only used for the error message.
    pub fn parse(data: &'a [u8], family: OdsFamily, page_number: u64) -> Result<Self, PluckError> {
        let header = PageHeader::parse(data).ok_or_else(|| {
            PluckError::CorruptPip(format!("Page {} is too short for a page header", page_number))
        })?;
        if header.page_type != PageType::PageInventory {
            return Err(PluckError::CorruptPip(format!(
                "Page {} is a {}, expected page inventory page",
                page_number, header.page_type
            )));
        }
        let layout = PipLayout::for_family(family);
        if data.len() <= layout.bits_offset {
            return Err(PluckError::CorruptPip(format!(
                "Page {} is too short for a PIP bitmap",
                page_number
            )));
        }
        Ok(PipPage { data, layout })
    }

    /// Lowest page index (relative to this PIP's range) that may be free.
    /// A negative legacy value is clamped to 0.
    pub fn min(&self) -> u64 {
        let at = &self.data[self.layout.min_offset..];
        if self.layout.min_signed {
            LittleEndian::read_i32(at).max(0) as u64
        } else {
            LittleEndian::read_u32(at) as u64
        }
    }

    /// Whether the page at `index` within this PIP's range is marked free.
    pub fn is_free(&self, index: u64) -> bool {
        let byte = self.layout.bits_offset + (index / 8) as usize;
        match self.data.get(byte) {
            Some(bits) => bits & (1u8 << (index % 8)) != 0,
            None => false,
        }
    }
}
