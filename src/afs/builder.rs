//! AFS Builder
//!
//! Lays out a brand-new archive from a list of entries and writes it in one
//! pass. Every entry reserves at least one block, so offsets strictly
//! increase even for empty entries.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::afl::NameList;
use crate::config::Config;
use crate::error::{AfsError, Result};
use crate::name::FixedName;
use crate::timestamp::Timestamp;

use super::codec::{encode_entry_table, encode_header, encode_metadata_table};
use super::container::Container;
use super::{
    to_u32, EntryInfo, EntryMetadata, EntryTable, MetadataTable, ENTRY_INFO_SIZE, HEADER_SIZE,
    MAGIC,
};

/// Entry waiting to be laid out
struct PendingEntry {
    name: FixedName,
    data: Vec<u8>,
    last_modified: Timestamp,
}

/// Builder for creating new archives
pub struct AfsBuilder {
    /// Output file path
    path: PathBuf,
    /// Block size and durability settings
    config: Config,
    /// Entries in archive order
    entries: Vec<PendingEntry>,
}

impl AfsBuilder {
    /// Create a builder writing to `path` with the default config
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_config(path, Config::default())
    }

    pub fn with_config(path: impl AsRef<Path>, config: Config) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            entries: Vec::new(),
        }
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Add a named entry
    pub fn add(&mut self, name: &str, data: impl Into<Vec<u8>>, last_modified: Timestamp) -> Result<()> {
        self.add_raw(FixedName::new(name)?, data.into(), last_modified);
        Ok(())
    }

    /// Add an unnamed, empty entry
    pub fn add_empty(&mut self) {
        self.add_raw(FixedName::default(), Vec::new(), Timestamp::default());
    }

    pub(crate) fn add_raw(&mut self, name: FixedName, data: Vec<u8>, last_modified: Timestamp) {
        self.entries.push(PendingEntry {
            name,
            data,
            last_modified,
        });
    }

    /// Add a file from disk, named after its base name and stamped with its
    /// modification time
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .ok_or_else(|| AfsError::InvalidPath(path.to_path_buf()))?
            .to_string_lossy()
            .into_owned();
        self.add_file_as(FixedName::new(&name)?, path)
    }

    fn add_file_as(&mut self, name: FixedName, path: &Path) -> Result<()> {
        let data = fs::read(path).map_err(|e| AfsError::io_at(path, e))?;
        let last_modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map(Timestamp::from_system_time)
            .unwrap_or_default();
        self.add_raw(name, data, last_modified);
        Ok(())
    }

    /// Add one entry per name list entry, reading `folder/<name>`
    ///
    /// Names without a matching file become empty entries that keep the name.
    pub fn add_named_files(&mut self, names: &NameList, folder: impl AsRef<Path>) -> Result<()> {
        let folder = folder.as_ref();
        for (id, name) in names.names().iter().enumerate() {
            if name.is_empty() {
                self.add_empty();
                continue;
            }
            let path = folder.join(name.to_string_lossy());
            if path.is_file() {
                self.add_file_as(*name, &path)?;
            } else {
                tracing::warn!(
                    "No file for name list entry {} ({}); leaving it empty",
                    id,
                    path.display()
                );
                self.add_raw(*name, Vec::new(), Timestamp::default());
            }
        }
        Ok(())
    }

    /// Lay out and write the archive, returning it opened
    ///
    /// Layout: header and table padded to one block, each entry padded to its
    /// reserved span, metadata table last, padded to a block.
    pub fn finish(self) -> Result<Container> {
        self.config.validate()?;
        let n = self.entries.len();

        // Offsets
        let table_end = HEADER_SIZE + (n as u64 + 1) * ENTRY_INFO_SIZE;
        let data_start = self.config.align_up(table_end);
        let mut cursor = data_start;
        let mut slots = Vec::with_capacity(n + 1);
        let mut spans = Vec::with_capacity(n);
        let mut records = Vec::with_capacity(n);

        for entry in &self.entries {
            let size = to_u32(entry.data.len() as u64, "entry size")?;
            let span = self.config.fresh_span(entry.data.len() as u64);
            slots.push(EntryInfo::new(to_u32(cursor, "entry offset")?, size));
            spans.push(span);
            records.push(EntryMetadata {
                filename: entry.name,
                last_modified: entry.last_modified,
                filesize: size,
            });
            cursor += span;
        }
        let metadata = MetadataTable::from_parts(records, Vec::new());
        let meta_size = to_u32(metadata.encoded_len(), "metadata size")?;
        slots.push(EntryInfo::new(to_u32(cursor, "metadata offset")?, meta_size));
        let table = EntryTable::from_slots(slots);

        // Write
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| AfsError::io_at(&self.path, e))?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&encode_header(MAGIC, to_u32(n as u64, "entry count")?))?;
        writer.write_all(&encode_entry_table(table.slots()))?;
        write_zeros(&mut writer, data_start - table_end)?;

        for (entry, span) in self.entries.iter().zip(&spans) {
            writer.write_all(&entry.data)?;
            write_zeros(&mut writer, span - entry.data.len() as u64)?;
        }

        let raw_meta = encode_metadata_table(&metadata);
        writer.write_all(&raw_meta)?;
        let meta_len = raw_meta.len() as u64;
        write_zeros(&mut writer, self.config.align_up(meta_len) - meta_len)?;

        let file = writer
            .into_inner()
            .map_err(|e| AfsError::io_at(&self.path, e.into_error()))?;
        file.sync_all()?;

        tracing::debug!(
            "Created {} with {} entries ({} bytes)",
            self.path.display(),
            n,
            cursor + self.config.align_up(meta_len)
        );

        Ok(Container::from_parts(
            self.path,
            file,
            self.config,
            table,
            metadata,
        ))
    }
}

fn write_zeros(writer: &mut impl Write, count: u64) -> Result<()> {
    std::io::copy(&mut std::io::repeat(0).take(count), writer)?;
    Ok(())
}
