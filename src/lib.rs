//! # afspack
//!
//! Reader and in-place editor for AFS entry archives, with:
//! - Entry extraction to memory, to a file, or to a whole folder
//! - Single-entry replacement that grows reserved space in place
//! - Batch rebuild replacing many entries in one rewrite
//! - AFL name lists importable into archive metadata
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Container                            │
//! │        (file handle, entry table, metadata table)           │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │                      │                       │
//!        ▼                      ▼                       ▼
//! ┌─────────────┐       ┌───────────────┐       ┌──────────────┐
//! │ Extraction  │       │EntryAllocator │       │BatchRebuilder│
//! │ (read-only) │       │ (one entry,   │       │ (many, full  │
//! │             │       │  shift tail)  │       │  rewrite)    │
//! └─────────────┘       └───────────────┘       └──────────────┘
//!        ▲
//!        │ names by index
//! ┌──────┴──────┐
//! │  NameList   │
//! │   (AFL)     │
//! └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod name;
pub mod timestamp;
pub mod afs;
pub mod afl;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use afl::{ImportReport, NameList};
pub use afs::{AfsBuilder, Container, EntryInfo, EntryMetadata, ExtractReport};
pub use config::{Config, RebuildStrategy, SyncStrategy};
pub use error::{AfsError, Result};
pub use name::FixedName;
pub use timestamp::Timestamp;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of afspack
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
