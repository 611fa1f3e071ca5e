//! AFL Name List Module
//!
//! Sidecar file holding only the ordered entry names of an AFS archive.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (16 bytes)                                        │
//! │   Identifier (4) | Unknown1: u32 | Unknown2: i32 | Count │
//! ├──────────────────────────────────────────────────────────┤
//! │ Names (Count × 32 bytes, zero-padded)                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! The two unknown header fields are carried through unchanged.

mod import;
mod list;

pub use import::ImportReport;
pub use list::NameList;

/// Identifier written into newly created name lists
pub const MAGIC: &[u8; 4] = b"AFL\0";

/// Header size: Identifier (4) + Unknown1 (4) + Unknown2 (4) + Count (4)
pub const HEADER_SIZE: usize = 16;

/// Largest entry count a name list may hold
pub const MAX_ENTRIES: usize = 0xFFFF;
