//! Page type definitions.
//!
//! Maps the 1-byte page type tag at the start of every page to a
//! [`PageType`] enum. The tag set is shared by every supported ODS version.

use serde::Serialize;
use std::fmt;

/// Structural interpretation of a page, from its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PageType {
    /// Never written or released page (tag 0)
    Undefined,
    /// Database header page (tag 1)
    Header,
    /// Page inventory bitmap (tag 2)
    PageInventory,
    /// Transaction inventory (tag 3)
    TransactionInventory,
    /// Relation pointer page (tag 4)
    Pointer,
    /// Record data page (tag 5)
    Data,
    /// Index root page (tag 6)
    IndexRoot,
    /// Index b-tree bucket (tag 7)
    BTree,
    /// Blob page (tag 8)
    Blob,
    /// Generator page (tag 9)
    Generator,
    /// Write-ahead log page (tag 10)
    WriteAheadLog,
    /// Tag outside the known range
    Unknown(u8),
}

impl PageType {
    /// Map a raw tag to a page type.
    ///
    /// # Examples
    ///
    /// ```
    /// use pluck::ods::page_types::PageType;
    ///
    /// assert_eq!(PageType::from_u8(5), PageType::Data);
    /// assert_eq!(PageType::from_u8(42), PageType::Unknown(42));
    /// ```
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => PageType::Undefined,
            1 => PageType::Header,
            2 => PageType::PageInventory,
            3 => PageType::TransactionInventory,
            4 => PageType::Pointer,
            5 => PageType::Data,
            6 => PageType::IndexRoot,
            7 => PageType::BTree,
            8 => PageType::Blob,
            9 => PageType::Generator,
            10 => PageType::WriteAheadLog,
            other => PageType::Unknown(other),
        }
    }

    /// Human-readable name, matching the engine's `gstat` wording.
    pub fn name(self) -> &'static str {
        match self {
            PageType::Undefined => "undefined",
            PageType::Header => "header page",
            PageType::PageInventory => "page inventory page",
            PageType::TransactionInventory => "transaction inventory page",
            PageType::Pointer => "pointer page",
            PageType::Data => "data page",
            PageType::IndexRoot => "index root page",
            PageType::BTree => "index b-tree page",
            PageType::Blob => "blob page",
            PageType::Generator => "generator page",
            PageType::WriteAheadLog => "write ahead log",
            PageType::Unknown(_) => "unknown",
        }
    }

    /// Returns true for page types whose free tail can be trimmed block by block.
    pub fn is_block_trimmable(self) -> bool {
        matches!(self, PageType::Data | PageType::BTree | PageType::Blob)
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageType::Unknown(v) => write!(f, "unknown ({})", v),
            other => write!(f, "{}", other.name()),
        }
    }
}
