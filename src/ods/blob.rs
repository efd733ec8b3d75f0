//! Blob page decoding.
//!
//! Level-0 blob pages hold blob content; level-1 pages hold child page
//! numbers in the same area. Either way the used part is the fixed header
//! followed by `length` bytes.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::ods::constants::*;

/// Parsed blob page header.
#[derive(Debug, Clone, Serialize)]
pub struct BlobPage {
    pub lead_page: u32,
    pub sequence: u32,
    pub length: u16,
}

impl BlobPage {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < BLP_PAGE {
            return None;
        }
        Some(BlobPage {
            lead_page: LittleEndian::read_u32(&data[BLP_LEAD_PAGE..]),
            sequence: LittleEndian::read_u32(&data[BLP_SEQUENCE..]),
            length: LittleEndian::read_u16(&data[BLP_LENGTH..]),
        })
    }

    /// Exclusive end of header plus content.
    pub fn content_end(&self) -> usize {
        BLP_PAGE + self.length as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blob() {
        let mut buf = vec![0u8; 1024];
        buf[PAG_TYPE] = 8;
        LittleEndian::write_u32(&mut buf[BLP_LEAD_PAGE..], 321);
        LittleEndian::write_u32(&mut buf[BLP_SEQUENCE..], 2);
        LittleEndian::write_u16(&mut buf[BLP_LENGTH..], 500);
        let bp = BlobPage::parse(&buf).unwrap();
        assert_eq!(bp.lead_page, 321);
        assert_eq!(bp.sequence, 2);
        assert_eq!(bp.content_end(), 528);
    }

    #[test]
    fn test_too_short() {
        assert!(BlobPage::parse(&[0u8; 27]).is_none());
    }
}
