//! AFS codec
//!
//! Encoding and decoding of the fixed-layout parts of an archive: header,
//! entry table and metadata records.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{AfsError, Result};
use crate::name::{FixedName, NAME_SIZE};
use crate::timestamp::Timestamp;

use super::{
    EntryInfo, EntryMetadata, MetadataTable, ENTRY_INFO_SIZE, HEADER_SIZE, METADATA_RECORD_SIZE,
};

// =============================================================================
// Header
// =============================================================================

/// Encode identifier + entry count
pub fn encode_header(identifier: &[u8; 4], entry_count: u32) -> [u8; HEADER_SIZE as usize] {
    let mut out = [0u8; HEADER_SIZE as usize];
    out[..4].copy_from_slice(identifier);
    out[4..].copy_from_slice(&entry_count.to_le_bytes());
    out
}

/// Decode identifier + entry count
pub fn decode_header(bytes: &[u8]) -> Result<([u8; 4], u32)> {
    if bytes.len() < HEADER_SIZE as usize {
        return Err(AfsError::Format(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }
    let mut buf = bytes;
    let mut identifier = [0u8; 4];
    buf.copy_to_slice(&mut identifier);
    let entry_count = buf.get_u32_le();
    Ok((identifier, entry_count))
}

// =============================================================================
// Entry Table
// =============================================================================

/// Encode a single `{offset, size}` slot
pub(crate) fn encode_entry_info(info: EntryInfo) -> [u8; ENTRY_INFO_SIZE as usize] {
    let mut out = [0u8; ENTRY_INFO_SIZE as usize];
    out[..4].copy_from_slice(&info.offset.to_le_bytes());
    out[4..].copy_from_slice(&info.size.to_le_bytes());
    out
}

/// Encode all slots back to back
pub fn encode_entry_table(slots: &[EntryInfo]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(slots.len() * ENTRY_INFO_SIZE as usize);
    for slot in slots {
        out.put_u32_le(slot.offset);
        out.put_u32_le(slot.size);
    }
    out.to_vec()
}

/// Decode `slot_count` slots
pub fn decode_entry_table(bytes: &[u8], slot_count: usize) -> Result<Vec<EntryInfo>> {
    let needed = slot_count * ENTRY_INFO_SIZE as usize;
    if bytes.len() < needed {
        return Err(AfsError::Format(format!(
            "Incomplete entry table: expected {} bytes, got {}",
            needed,
            bytes.len()
        )));
    }
    let mut buf = &bytes[..needed];
    let mut slots = Vec::with_capacity(slot_count);
    while buf.has_remaining() {
        let offset = buf.get_u32_le();
        let size = buf.get_u32_le();
        slots.push(EntryInfo { offset, size });
    }
    Ok(slots)
}

// =============================================================================
// Metadata Table
// =============================================================================

/// Encode one 48-byte metadata record
pub(crate) fn encode_metadata_record(meta: &EntryMetadata, out: &mut BytesMut) {
    out.put_slice(meta.filename.as_raw());
    let t = meta.last_modified;
    for field in [t.year, t.month, t.day, t.hours, t.minutes, t.seconds] {
        out.put_u16_le(field);
    }
    out.put_u32_le(meta.filesize);
}

fn decode_metadata_record(mut buf: &[u8]) -> EntryMetadata {
    let mut name = [0u8; NAME_SIZE];
    buf.copy_to_slice(&mut name);
    let last_modified = Timestamp {
        year: buf.get_u16_le(),
        month: buf.get_u16_le(),
        day: buf.get_u16_le(),
        hours: buf.get_u16_le(),
        minutes: buf.get_u16_le(),
        seconds: buf.get_u16_le(),
    };
    EntryMetadata {
        filename: FixedName::from_raw(name),
        last_modified,
        filesize: buf.get_u32_le(),
    }
}

/// Serialize the whole metadata table, trailing bytes included
pub(crate) fn encode_metadata_table(table: &MetadataTable) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(table.encoded_len() as usize);
    for meta in table.iter() {
        encode_metadata_record(meta, &mut out);
    }
    out.put_slice(table.trailing());
    out.to_vec()
}

/// Parse a metadata table for `entry_count` entries.
///
/// Missing records (short table) default to empty; bytes past the last record
/// are kept as trailing data.
pub(crate) fn decode_metadata_table(bytes: &[u8], entry_count: usize) -> MetadataTable {
    let record_size = METADATA_RECORD_SIZE as usize;
    let mut records = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let start = i * record_size;
        match bytes.get(start..start + record_size) {
            Some(chunk) => records.push(decode_metadata_record(chunk)),
            None => records.push(EntryMetadata::default()),
        }
    }
    let consumed = (entry_count * record_size).min(bytes.len());
    MetadataTable::from_parts(records, bytes[consumed..].to_vec())
}
