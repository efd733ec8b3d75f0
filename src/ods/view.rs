//! Tagged decoding of a raw page buffer.
//!
//! The page header is read first; its type tag selects exactly one typed
//! view of the remaining bytes.

use crate::ods::blob::BlobPage;
use crate::ods::btree::BTreePage;
use crate::ods::data::DataPage;
use crate::ods::header::PageHeader;
use crate::ods::page_types::PageType;
use crate::ods::pip::PipPage;
use crate::ods::version::OdsFamily;

/// A page buffer decoded according to its type tag.
#[derive(Debug)]
pub enum PageView<'a> {
    Data(DataPage),
    Blob(BlobPage),
    BTree(BTreePage),
    Inventory(PipPage<'a>),
    /// Any type without a structural decoder, or a buffer too short to decode.
    Other(PageType),
}

impl<'a> PageView<'a> {
    /// Decode `data` (a full page) for the given ODS family.
    pub fn decode(data: &'a [u8], family: OdsFamily) -> Self {
        let page_type = match PageHeader::parse(data) {
            Some(h) => h.page_type,
            None => return PageView::Other(PageType::Undefined),
        };

        match page_type {
            PageType::Data => DataPage::parse(data)
                .map(PageView::Data)
                .unwrap_or(PageView::Other(page_type)),
            PageType::Blob => BlobPage::parse(data)
                .map(PageView::Blob)
                .unwrap_or(PageView::Other(page_type)),
            PageType::BTree => BTreePage::parse(data)
                .map(PageView::BTree)
                .unwrap_or(PageView::Other(page_type)),
            PageType::PageInventory => PipPage::parse(data, family, 0)
                .map(PageView::Inventory)
                .unwrap_or(PageView::Other(page_type)),
            other => PageView::Other(other),
        }
    }

    pub fn page_type(&self) -> PageType {
        match self {
            PageView::Data(_) => PageType::Data,
            PageView::Blob(_) => PageType::Blob,
            PageView::BTree(_) => PageType::BTree,
            PageView::Inventory(_) => PageType::PageInventory,
            PageView::Other(t) => *t,
        }
    }
}
