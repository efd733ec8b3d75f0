//! Firebird / RedDatabase on-disk structure (ODS) parsing.
//!
//! This module contains types and functions for reading the page formats
//! of ODS 11 (legacy family) and ODS 12/13 (current family) database files:
//! the header page, page inventory pages, and the data, blob and b-tree
//! pages whose free tails can be trimmed.
//!
//! Start with [`database::Database`] to open a file, then use
//! [`view::PageView::decode`] to interpret individual pages.

pub mod blob;
pub mod btree;
pub mod constants;
pub mod data;
pub mod database;
pub mod header;
pub mod page_types;
pub mod pip;
pub mod version;
pub mod view;
