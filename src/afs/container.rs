//! AFS Container
//!
//! Owns the open archive file together with its parsed entry table and
//! metadata table. Reads go straight to the file; mutations update the
//! in-memory tables first and then persist only the slots they touched.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};

use crate::config::{Config, SyncStrategy};
use crate::error::{AfsError, Result};
use crate::name::FixedName;
use crate::timestamp::Timestamp;

use super::allocator::EntryAllocator;
use super::builder::AfsBuilder;
use super::codec::{
    decode_entry_table, decode_header, decode_metadata_table, encode_entry_info,
    encode_entry_table, encode_header, encode_metadata_record, encode_metadata_table,
};
use super::rebuild::BatchRebuilder;
use super::{
    to_u32, EntryInfo, EntryMetadata, EntryTable, MetadataTable, ENTRY_INFO_SIZE, HEADER_SIZE,
    MAGIC, METADATA_RECORD_SIZE,
};

/// An open AFS archive
///
/// ## Ownership
/// The container holds the only handle to the archive for its whole lifetime.
/// Mutating calls take `&mut self`; nothing guards against another process
/// writing the same file.
pub struct Container {
    /// Location of the archive on disk
    pub(super) path: PathBuf,
    /// Read/write handle to the archive
    pub(super) file: File,
    /// Layout and durability settings
    pub(super) config: Config,
    /// First four bytes of the file
    pub(super) identifier: [u8; 4],
    /// Offset table, metadata slot last
    pub(super) table: EntryTable,
    /// Per-entry display metadata
    pub(super) metadata: MetadataTable,
    /// False until a metadata table has been written for archives that had none
    pub(super) metadata_on_disk: bool,
}

/// Outcome of a full extraction
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Files written, in entry order
    pub extracted: Vec<PathBuf>,
    /// Entries that could not be written, with the reason
    pub failed: Vec<(usize, AfsError)>,
}

impl ExtractReport {
    /// True if every entry was written
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Container {
    // =========================================================================
    // Open / Create
    // =========================================================================

    /// Open an archive with the default config
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Open and parse an archive
    ///
    /// Reads the header, the full entry table and the metadata table. Entry
    /// offsets are not checked against the file length; a corrupt table
    /// surfaces as I/O errors on later reads.
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(AfsError::InvalidPath(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                tracing::warn!("Cannot open archive {}: {}", path.display(), e);
                AfsError::InvalidPath(path.to_path_buf())
            })?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE {
            return Err(AfsError::Format(format!(
                "{} is too short for an archive header ({} bytes)",
                path.display(),
                file_len
            )));
        }

        // Header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let (identifier, entry_count) = decode_header(&header)?;
        if &identifier != MAGIC {
            tracing::warn!(
                "Unexpected identifier {:?} in {}",
                identifier,
                path.display()
            );
        }

        // Entry table
        let slot_count = entry_count as u64 + 1;
        let table_len = slot_count * ENTRY_INFO_SIZE;
        if HEADER_SIZE + table_len > file_len {
            return Err(AfsError::Format(format!(
                "entry table for {} entries does not fit in {} bytes",
                entry_count, file_len
            )));
        }
        let mut raw_table = vec![0u8; table_len as usize];
        file.read_exact(&mut raw_table)?;
        let mut table = EntryTable::from_slots(decode_entry_table(&raw_table, slot_count as usize)?);

        // Metadata table
        let meta_slot = table.metadata_slot();
        let count = entry_count as usize;
        let (metadata, metadata_on_disk) = if meta_slot.offset == 0 && meta_slot.size == 0 {
            tracing::debug!("{} has no metadata table", path.display());
            let offset = Self::end_of_entries(&table, &config);
            table.set_metadata_slot(EntryInfo::new(to_u32(offset, "metadata offset")?, 0));
            (MetadataTable::empty(count), false)
        } else {
            let meta_end = u64::from(meta_slot.offset) + u64::from(meta_slot.size);
            if meta_end > file_len {
                return Err(AfsError::Format(format!(
                    "metadata table at {:#x} ({} bytes) runs past the end of the file ({} bytes)",
                    meta_slot.offset, meta_slot.size, file_len
                )));
            }
            let mut raw = vec![0u8; meta_slot.size as usize];
            file.seek(SeekFrom::Start(u64::from(meta_slot.offset)))?;
            file.read_exact(&mut raw)?;
            (decode_metadata_table(&raw, count), true)
        };

        tracing::debug!(
            "Opened {} ({} entries, metadata at {:#x})",
            path.display(),
            entry_count,
            table.metadata_slot().offset
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            config,
            identifier,
            table,
            metadata,
            metadata_on_disk,
        })
    }

    /// Create a fresh archive of `entry_count` empty entries, one block each
    pub fn create(path: impl AsRef<Path>, entry_count: usize, config: Config) -> Result<Self> {
        let mut builder = AfsBuilder::with_config(path, config);
        for _ in 0..entry_count {
            builder.add_empty();
        }
        builder.finish()
    }

    /// Create a fresh archive with one empty, named entry per name list entry
    pub fn create_from_name_list(
        path: impl AsRef<Path>,
        names: &crate::afl::NameList,
        config: Config,
    ) -> Result<Self> {
        let mut builder = AfsBuilder::with_config(path, config);
        for name in names.names() {
            builder.add_raw(*name, Vec::new(), Timestamp::default());
        }
        builder.finish()
    }

    pub(super) fn from_parts(
        path: PathBuf,
        file: File,
        config: Config,
        table: EntryTable,
        metadata: MetadataTable,
    ) -> Self {
        Self {
            path,
            file,
            config,
            identifier: *MAGIC,
            table,
            metadata,
            metadata_on_disk: true,
        }
    }

    /// Sync and release the archive
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        tracing::debug!("Closed {}", self.path.display());
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identifier(&self) -> &[u8; 4] {
        &self.identifier
    }

    /// Number of data entries
    pub fn entry_count(&self) -> usize {
        self.table.entry_count()
    }

    pub fn entry_table(&self) -> &EntryTable {
        &self.table
    }

    pub fn entry_info(&self, id: usize) -> Result<EntryInfo> {
        self.table.get(id)
    }

    /// Bytes between this entry's offset and the next one's
    pub fn reserved_space(&self, id: usize) -> Result<u32> {
        self.table.reserved(id)
    }

    pub fn metadata(&self, id: usize) -> Result<EntryMetadata> {
        self.metadata.get(id).copied()
    }

    pub fn metadata_table(&self) -> &MetadataTable {
        &self.metadata
    }

    pub fn last_modified(&self, id: usize) -> Result<Timestamp> {
        Ok(self.metadata.get(id)?.last_modified)
    }

    // =========================================================================
    // Extraction
    // =========================================================================

    /// Read an entry's logical bytes
    pub fn extract_to_buffer(&self, id: usize) -> Result<Bytes> {
        let info = self.table.get(id)?;
        let data = self.read_at(u64::from(info.offset), info.size as usize)?;
        Ok(Bytes::from(data))
    }

    /// Write an entry into `folder`, named after its metadata
    ///
    /// Unnamed entries become `blank_<id>`. An existing file of the same name
    /// is overwritten.
    pub fn extract_to_file(&self, id: usize, folder: impl AsRef<Path>) -> Result<PathBuf> {
        let folder = folder.as_ref();
        let meta = self.metadata.get(id)?;
        if folder.as_os_str().is_empty() || !folder.is_dir() {
            return Err(AfsError::InvalidPath(folder.to_path_buf()));
        }
        let out_path = folder.join(entry_file_name(id, meta));
        let data = self.extract_to_buffer(id)?;
        fs::write(&out_path, &data).map_err(|e| AfsError::io_at(&out_path, e))?;
        tracing::debug!("Extracted entry {} to {}", id, out_path.display());
        Ok(out_path)
    }

    /// Extract every entry into `folder`, creating it if needed
    ///
    /// Name collisions get a counter before the extension: `name(1).ext`.
    /// A failing entry is logged and skipped; the rest are still written.
    pub fn extract_full(&self, folder: impl AsRef<Path>) -> Result<ExtractReport> {
        let folder = folder.as_ref();
        if folder.as_os_str().is_empty() {
            return Err(AfsError::InvalidPath(folder.to_path_buf()));
        }
        fs::create_dir_all(folder).map_err(|e| AfsError::io_at(folder, e))?;

        let mut report = ExtractReport::default();
        for id in 0..self.entry_count() {
            match self.extract_one_unique(id, folder) {
                Ok(path) => report.extracted.push(path),
                Err(e) => {
                    tracing::warn!("Skipping entry {} during extraction: {}", id, e);
                    report.failed.push((id, e));
                }
            }
        }

        tracing::info!(
            "Extracted {} of {} entries to {}",
            report.extracted.len(),
            self.entry_count(),
            folder.display()
        );
        Ok(report)
    }

    fn extract_one_unique(&self, id: usize, folder: &Path) -> Result<PathBuf> {
        let name = entry_file_name(id, self.metadata.get(id)?);
        let out_path = unique_path(folder, &name);
        let data = self.extract_to_buffer(id)?;
        fs::write(&out_path, &data).map_err(|e| AfsError::io_at(&out_path, e))?;
        Ok(out_path)
    }

    // =========================================================================
    // Replacement
    // =========================================================================

    /// Replace one entry's content, growing its reserved space if needed
    ///
    /// Growing shifts every later entry and the metadata table on disk.
    pub fn replace_entry(&mut self, id: usize, data: &[u8]) -> Result<()> {
        EntryAllocator::new(self).replace(id, data)
    }

    /// Replace many entries from files in a single rewrite
    ///
    /// Entries absent from the map are kept. Any unreadable file aborts the
    /// whole batch before the archive is touched.
    pub fn replace_many(&mut self, replacements: &BTreeMap<usize, PathBuf>) -> Result<()> {
        BatchRebuilder::new(self).run(replacements)
    }

    /// Replace every entry whose name matches a file's base name
    ///
    /// Returns the files that were not applied: those matching no entry, and
    /// earlier files displaced by a later one with the same base name.
    pub fn replace_entries_by_name<P: AsRef<Path>>(&mut self, files: &[P]) -> Result<Vec<PathBuf>> {
        let mut replacements = BTreeMap::new();
        let mut unmatched = Vec::new();

        for file in files {
            let file = file.as_ref();
            let id = file
                .file_name()
                .map(|n| n.to_string_lossy())
                .and_then(|name| {
                    self.metadata
                        .iter()
                        .position(|meta| !meta.filename.is_empty() && meta.filename == *name)
                });
            match id {
                Some(id) => {
                    if let Some(displaced) = replacements.insert(id, file.to_path_buf()) {
                        tracing::warn!(
                            "{} and {} both match entry {}; using {}",
                            displaced.display(),
                            file.display(),
                            id,
                            file.display()
                        );
                        unmatched.push(displaced);
                    }
                }
                None => {
                    tracing::warn!("File {} matches no entry", file.display());
                    unmatched.push(file.to_path_buf());
                }
            }
        }

        if replacements.is_empty() {
            tracing::debug!("No entries matched; archive left unchanged");
            return Ok(unmatched);
        }
        self.replace_many(&replacements)?;
        Ok(unmatched)
    }

    // =========================================================================
    // Rename / Metadata
    // =========================================================================

    /// Rename an entry; with `permanent` the record is also written to disk
    pub fn rename_entry(&mut self, id: usize, name: &str, permanent: bool) -> Result<()> {
        let name = FixedName::new(name)?;
        self.metadata.get_mut(id)?.filename = name;
        if permanent {
            self.persist_metadata_record(id)?;
            self.maybe_sync()?;
        }
        Ok(())
    }

    /// Overwrite an entry's metadata; with `permanent` the record is also
    /// written to disk
    pub fn set_metadata(&mut self, id: usize, meta: EntryMetadata, permanent: bool) -> Result<()> {
        *self.metadata.get_mut(id)? = meta;
        if permanent {
            self.persist_metadata_record(id)?;
            self.maybe_sync()?;
        }
        Ok(())
    }

    /// Copy names into the metadata table, index by index
    pub(crate) fn apply_names(&mut self, names: &[FixedName], permanent: bool) -> Result<()> {
        for (id, name) in names.iter().enumerate() {
            self.metadata.get_mut(id)?.filename = *name;
        }
        if permanent {
            self.persist_metadata_table()?;
            self.maybe_sync()?;
        }
        Ok(())
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Write header, entry table and metadata table, then sync
    pub fn save(&mut self) -> Result<()> {
        let count = to_u32(self.entry_count() as u64, "entry count")?;
        self.write_at(0, &encode_header(&self.identifier, count))?;
        self.write_table()?;
        self.persist_metadata_table()?;
        self.file.sync_all()?;
        tracing::debug!("Saved {}", self.path.display());
        Ok(())
    }

    /// Write a complete copy to `path` and continue working on the copy
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let target = path.as_ref();
        if target.as_os_str().is_empty() {
            return Err(AfsError::InvalidPath(target.to_path_buf()));
        }
        let same_file = match (fs::canonicalize(&self.path), fs::canonicalize(target)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same_file {
            self.file.flush()?;
            fs::copy(&self.path, target).map_err(|e| AfsError::io_at(target, e))?;
            self.file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(target)
                .map_err(|e| AfsError::io_at(target, e))?;
            self.path = target.to_path_buf();
        }
        self.save()
    }

    // =========================================================================
    // Internal I/O
    // =========================================================================

    pub(super) fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = &self.file;
        let mut buf = vec![0u8; len];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Everything from `offset` to the end of the file
    pub(super) fn read_tail(&self, offset: u64) -> Result<Vec<u8>> {
        let mut file = &self.file;
        let mut buf = Vec::new();
        file.seek(SeekFrom::Start(offset))?;
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub(super) fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Rewrite the whole entry table
    pub(super) fn write_table(&mut self) -> Result<()> {
        let raw = encode_entry_table(self.table.slots());
        self.write_at(HEADER_SIZE, &raw)
    }

    /// Rewrite one entry table slot (a data entry or the metadata slot)
    pub(super) fn persist_slot(&mut self, index: usize) -> Result<()> {
        let raw = encode_entry_info(self.table.slots()[index]);
        self.write_at(EntryTable::slot_position(index), &raw)
    }

    /// Rewrite one metadata record
    pub(super) fn persist_metadata_record(&mut self, id: usize) -> Result<()> {
        if self.needs_metadata_materialized() {
            return self.persist_metadata_table();
        }
        let mut raw = BytesMut::with_capacity(METADATA_RECORD_SIZE as usize);
        encode_metadata_record(self.metadata.get(id)?, &mut raw);
        let offset = u64::from(self.table.metadata_slot().offset) + id as u64 * METADATA_RECORD_SIZE;
        self.write_at(offset, &raw)
    }

    /// Rewrite the whole metadata table in one write
    pub(super) fn persist_metadata_table(&mut self) -> Result<()> {
        let raw = encode_metadata_table(&self.metadata);
        let slot = self.table.metadata_slot();
        if self.needs_metadata_materialized() {
            let size = to_u32(raw.len() as u64, "metadata size")?;
            self.table.set_metadata_slot(EntryInfo::new(slot.offset, size));
            let index = self.entry_count();
            self.persist_slot(index)?;
            self.metadata_on_disk = true;
        }
        self.write_at(u64::from(slot.offset), &raw)
    }

    /// The on-disk metadata slot cannot hold the records yet
    fn needs_metadata_materialized(&self) -> bool {
        !self.metadata_on_disk
            || u64::from(self.table.metadata_slot().size) < self.metadata.encoded_len()
    }

    pub(super) fn maybe_sync(&mut self) -> Result<()> {
        if self.config.sync_strategy == SyncStrategy::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// First block boundary after the last entry's logical end
    fn end_of_entries(table: &EntryTable, config: &Config) -> u64 {
        let n = table.entry_count();
        if n == 0 {
            return config.align_up(HEADER_SIZE + ENTRY_INFO_SIZE);
        }
        let last = table.slots()[n - 1];
        config.align_up(u64::from(last.offset) + u64::from(last.size))
    }
}

// =============================================================================
// Output Naming
// =============================================================================

/// File name for an extracted entry; never contains a path separator
fn entry_file_name(id: usize, meta: &EntryMetadata) -> String {
    let name = meta.filename.to_string_lossy().replace(['/', '\\'], "_");
    if name.is_empty() || name == "." || name == ".." {
        format!("blank_{}", id)
    } else {
        name
    }
}

/// First free path for `name` in `folder`: `name`, then `stem(1).ext`, ...
fn unique_path(folder: &Path, name: &str) -> PathBuf {
    let mut candidate = folder.join(name);
    let mut n = 1;
    while candidate.exists() {
        let numbered = match name.rfind('.') {
            Some(dot) => format!("{}({}){}", &name[..dot], n, &name[dot..]),
            None => format!("{}({})", name, n),
        };
        candidate = folder.join(numbered);
        n += 1;
    }
    candidate
}
