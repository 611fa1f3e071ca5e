//! AFS Container Module
//!
//! Single-file archive of variable-length entries with an offset table and a
//! trailing metadata table.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (8 bytes)                                         │
//! │   Identifier: "AFS\0" (4) | EntryCount: u32 (4)          │
//! ├──────────────────────────────────────────────────────────┤
//! │ Entry Table ((EntryCount + 1) × 8 bytes)                 │
//! │   [Offset: u32][Size: u32]  ... one per entry ...        │
//! │   [Offset: u32][Size: u32]  ← metadata table location    │
//! ├──────────────────────────────────────────────────────────┤
//! │ (zero padding up to the first entry)                     │
//! ├──────────────────────────────────────────────────────────┤
//! │ Entry Data                                               │
//! │   entry i occupies [offset_i, offset_i + size_i)         │
//! │   reserved space runs to offset_{i+1}, zero-padded,      │
//! │   always a multiple of the block size                    │
//! ├──────────────────────────────────────────────────────────┤
//! │ Metadata Table (EntryCount × 48 bytes)                   │
//! │   [Filename: 32][Y M D h m s: 6 × u16][FileSize: u32]    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian.

mod allocator;
mod builder;
mod codec;
mod container;
mod rebuild;

pub use builder::AfsBuilder;
pub use codec::{decode_entry_table, decode_header, encode_entry_table, encode_header};
pub use container::{Container, ExtractReport};

use crate::error::{AfsError, Result};
use crate::name::{FixedName, NAME_SIZE};
use crate::timestamp::{Timestamp, TIMESTAMP_SIZE};

// =============================================================================
// Shared Constants (used by codec, container, allocator, rebuild)
// =============================================================================

/// Identifier bytes of an AFS archive
pub const MAGIC: &[u8; 4] = b"AFS\0";

/// Header size: Identifier (4) + EntryCount (4) = 8 bytes
pub const HEADER_SIZE: u64 = 8;

/// Entry table record size: Offset (4) + Size (4) = 8 bytes
pub const ENTRY_INFO_SIZE: u64 = 8;

/// Metadata record size: Filename (32) + Timestamp (12) + FileSize (4) = 48 bytes
pub const METADATA_RECORD_SIZE: u64 = (NAME_SIZE + TIMESTAMP_SIZE + 4) as u64;

// =============================================================================
// Entry Table
// =============================================================================

/// One slot of the entry table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryInfo {
    /// Byte offset of the entry from the start of the file
    pub offset: u32,
    /// Logical size of the entry in bytes
    pub size: u32,
}

impl EntryInfo {
    pub fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }
}

/// Offset table: `entry_count` data slots followed by the metadata slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryTable {
    slots: Vec<EntryInfo>,
}

impl EntryTable {
    /// Build from `entry_count + 1` slots; the last one locates the metadata table
    pub(crate) fn from_slots(slots: Vec<EntryInfo>) -> Self {
        debug_assert!(!slots.is_empty(), "entry table always has a metadata slot");
        Self { slots }
    }

    /// Number of data entries (the metadata slot is not counted)
    pub fn entry_count(&self) -> usize {
        self.slots.len() - 1
    }

    /// Data entry slot, bounds-checked
    pub fn get(&self, id: usize) -> Result<EntryInfo> {
        self.check(id)?;
        Ok(self.slots[id])
    }

    /// Slot describing the metadata table
    pub fn metadata_slot(&self) -> EntryInfo {
        self.slots[self.entry_count()]
    }

    /// Reserved span of a data entry: distance to the next slot's offset
    pub fn reserved(&self, id: usize) -> Result<u32> {
        self.check(id)?;
        Ok(self.slots[id + 1].offset.saturating_sub(self.slots[id].offset))
    }

    /// All slots, metadata slot last
    pub fn slots(&self) -> &[EntryInfo] {
        &self.slots
    }

    /// Byte offset of entry table slot `index` inside the file
    pub(crate) fn slot_position(index: usize) -> u64 {
        HEADER_SIZE + index as u64 * ENTRY_INFO_SIZE
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut EntryInfo {
        &mut self.slots[index]
    }

    pub(crate) fn set_metadata_slot(&mut self, info: EntryInfo) {
        let n = self.entry_count();
        self.slots[n] = info;
    }

    fn check(&self, id: usize) -> Result<()> {
        if id >= self.entry_count() {
            return Err(AfsError::EntryOutOfRange {
                id,
                count: self.entry_count(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Metadata Table
// =============================================================================

/// Display metadata for one entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub filename: FixedName,
    pub last_modified: Timestamp,
    /// Logical size of the entry as recorded in the metadata table
    pub filesize: u32,
}

/// Per-entry metadata records plus any bytes stored after them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTable {
    records: Vec<EntryMetadata>,
    /// Bytes beyond `entry_count * 48`, preserved verbatim
    trailing: Vec<u8>,
}

impl MetadataTable {
    /// Default records for `count` entries
    pub fn empty(count: usize) -> Self {
        Self {
            records: vec![EntryMetadata::default(); count],
            trailing: Vec::new(),
        }
    }

    pub(crate) fn from_parts(records: Vec<EntryMetadata>, trailing: Vec<u8>) -> Self {
        Self { records, trailing }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: usize) -> Result<&EntryMetadata> {
        let count = self.records.len();
        self.records
            .get(id)
            .ok_or(AfsError::EntryOutOfRange { id, count })
    }

    pub fn get_mut(&mut self, id: usize) -> Result<&mut EntryMetadata> {
        let count = self.records.len();
        self.records
            .get_mut(id)
            .ok_or(AfsError::EntryOutOfRange { id, count })
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntryMetadata> {
        self.records.iter()
    }

    pub(crate) fn trailing(&self) -> &[u8] {
        &self.trailing
    }

    /// Size of the serialized table in bytes
    pub fn encoded_len(&self) -> u64 {
        self.records.len() as u64 * METADATA_RECORD_SIZE + self.trailing.len() as u64
    }
}

/// Convert a computed file position back to an on-disk u32 offset
pub(crate) fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        AfsError::InvalidInput(format!(
            "{} {} exceeds the 4 GiB limit of the AFS format",
            what, value
        ))
    })
}
