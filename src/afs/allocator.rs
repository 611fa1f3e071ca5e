//! Entry Allocator
//!
//! Single-entry replacement. Data that fits the entry's reserved space is
//! written in place; data that does not first grows the reserved space, which
//! physically shifts every later entry and the metadata table.
//!
//! ## Resize
//! ```text
//! before:  | entry id | next ...            | metadata |
//!          ^offset    ^old_next
//! after:   | entry id (new_reserved)  | next ...            | metadata |
//!          ^offset                    ^old_next + delta
//! ```
//! The back half `[old_next, EOF)` is read into memory and written again right
//! after the enlarged block. The entry table is only rewritten once the bytes
//! have moved; there is no journal, so a crash in between leaves a table that
//! no longer matches the data.

use crate::error::{AfsError, Result};

use super::container::Container;
use super::{to_u32, EntryInfo};

/// Resize-aware replacement of one entry
pub(crate) struct EntryAllocator<'a> {
    afs: &'a mut Container,
}

impl<'a> EntryAllocator<'a> {
    pub(crate) fn new(afs: &'a mut Container) -> Self {
        Self { afs }
    }

    /// Replace entry `id` with `data`
    ///
    /// Steps:
    /// 1. Validate id and data
    /// 2. Grow the reserved space if `data` does not fit strictly inside it
    /// 3. Write the zero-padded block and persist the entry and metadata slots
    pub(crate) fn replace(&mut self, id: usize, data: &[u8]) -> Result<()> {
        self.afs.table.get(id)?;
        if data.is_empty() {
            return Err(AfsError::InvalidInput(format!(
                "replacement data for entry {} is empty",
                id
            )));
        }
        let size = to_u32(data.len() as u64, "entry size")?;

        let reserved = self.afs.table.reserved(id)?;
        if size >= reserved {
            self.resize_space(id, u64::from(size))?;
        }
        self.write_in_place(id, data, size)
    }

    /// Overwrite the entry's reserved block without moving anything
    ///
    /// O(1) I/O: the block itself, one entry table slot, one metadata record.
    fn write_in_place(&mut self, id: usize, data: &[u8], size: u32) -> Result<()> {
        let info = self.afs.table.get(id)?;
        let reserved = self.afs.table.reserved(id)? as usize;

        let mut block = vec![0u8; reserved];
        block[..data.len()].copy_from_slice(data);
        self.afs.write_at(u64::from(info.offset), &block)?;

        self.afs.table.slot_mut(id).size = size;
        self.afs.metadata.get_mut(id)?.filesize = size;
        self.afs.persist_slot(id)?;
        self.afs.persist_metadata_record(id)?;
        self.afs.maybe_sync()?;

        tracing::debug!(
            "Replaced entry {} in place ({} of {} reserved bytes)",
            id,
            size,
            reserved
        );
        Ok(())
    }

    /// Grow entry `id` to hold `len` bytes, shifting everything after it
    fn resize_space(&mut self, id: usize, len: u64) -> Result<()> {
        let old = self.afs.table.slots().to_vec();
        let n = self.afs.table.entry_count();

        let entry_offset = u64::from(old[id].offset);
        let old_next = u64::from(old[id + 1].offset);
        let new_reserved = self.afs.config.align_up(len);

        // Recompute every later offset from the existing reserved spans. The
        // metadata slot (index n) lands at the end of the shifted region.
        let mut new_slots = old.clone();
        let mut cursor = entry_offset + new_reserved;
        for j in (id + 1)..=n {
            new_slots[j] = EntryInfo::new(to_u32(cursor, "entry offset")?, old[j].size);
            if j < n {
                cursor += u64::from(old[j + 1].offset.saturating_sub(old[j].offset));
            }
        }
        to_u32(cursor + u64::from(old[n].size), "archive size")?;

        // Move the back half: zero block for the entry, then the untouched tail
        let back_half = if self.afs.file.metadata()?.len() > old_next {
            self.afs.read_tail(old_next)?
        } else {
            Vec::new()
        };
        let mut moved = vec![0u8; new_reserved as usize];
        moved.extend_from_slice(&back_half);
        self.afs.write_at(entry_offset, &moved)?;

        // Only now point the table at the new layout
        for (j, slot) in new_slots.into_iter().enumerate() {
            *self.afs.table.slot_mut(j) = slot;
        }
        self.afs.write_table()?;

        tracing::info!(
            "Resized entry {} from {} to {} bytes, shifted {} later bytes by {}",
            id,
            old_next.saturating_sub(entry_offset),
            new_reserved,
            back_half.len(),
            (entry_offset + new_reserved).saturating_sub(old_next)
        );
        Ok(())
    }
}
