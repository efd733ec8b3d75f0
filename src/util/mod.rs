//! Shared utilities: sparse-file primitives and report formatting.

pub mod format;
pub mod fs;
