//! Batch Rebuilder
//!
//! Replaces many entries at once by recomputing the whole layout and writing
//! the data region in one pass, instead of one shift per grown entry.
//!
//! The new archive is fully assembled in memory before anything is written.
//! With [`RebuildStrategy::StagedSwap`] it is written to a sibling file and
//! renamed over the archive; with [`RebuildStrategy::InPlace`] the open file
//! is overwritten directly.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::RebuildStrategy;
use crate::error::{AfsError, Result};
use crate::name::FixedName;
use crate::timestamp::Timestamp;

use super::codec::{encode_entry_table, encode_header, encode_metadata_table};
use super::container::Container;
use super::{to_u32, EntryInfo, EntryTable, MetadataTable, ENTRY_INFO_SIZE, HEADER_SIZE};

/// Fully staged result of a rebuild, not yet on disk
struct StagedLayout {
    table: EntryTable,
    metadata: MetadataTable,
    /// First data byte; everything before it is header, table and padding
    data_start: u64,
    /// Entry data from `data_start` up to the metadata table
    data_region: Vec<u8>,
}

/// Multi-entry replacement with a single rewrite
pub(crate) struct BatchRebuilder<'a> {
    afs: &'a mut Container,
}

impl<'a> BatchRebuilder<'a> {
    pub(crate) fn new(afs: &'a mut Container) -> Self {
        Self { afs }
    }

    /// Replace the mapped entries with the contents of their files
    ///
    /// Steps:
    /// 1. Validate ids, snapshot the current table
    /// 2. Load every replacement file (fail-fast)
    /// 3. Recompute the layout
    /// 4. Assemble the data region
    /// 5. Stamp metadata for replaced entries
    /// 6. Write table, data region and metadata
    pub(crate) fn run(&mut self, replacements: &BTreeMap<usize, PathBuf>) -> Result<()> {
        if replacements.is_empty() {
            tracing::debug!("Empty batch; {} left unchanged", self.afs.path.display());
            return Ok(());
        }
        for &id in replacements.keys() {
            self.afs.table.get(id)?;
        }
        let old = self.afs.table.clone();

        let loaded = Self::load(replacements)?;
        let table = self.plan(&old, &loaded)?;
        let data_region = self.assemble(&old, &table, &loaded)?;
        let metadata = self.stamp_metadata(replacements, &loaded)?;

        let data_start = u64::from(table.slots()[0].offset);
        let mut staged = StagedLayout {
            table,
            metadata,
            data_start,
            data_region,
        };
        let meta_size = to_u32(staged.metadata.encoded_len(), "metadata size")?;
        let meta_offset = staged.table.metadata_slot().offset;
        staged
            .table
            .set_metadata_slot(EntryInfo::new(meta_offset, meta_size));

        match self.afs.config.rebuild_strategy {
            RebuildStrategy::InPlace => self.write_in_place(&staged)?,
            RebuildStrategy::StagedSwap => self.write_staged(&staged)?,
        }

        // Commit only after the bytes are on disk
        self.afs.table = staged.table;
        self.afs.metadata = staged.metadata;
        self.afs.metadata_on_disk = true;

        tracing::info!(
            "Rebuilt {} with {} replaced entries ({} data bytes)",
            self.afs.path.display(),
            loaded.len(),
            staged.data_region.len()
        );
        Ok(())
    }

    /// Read every replacement into memory; any failure aborts the batch
    fn load(replacements: &BTreeMap<usize, PathBuf>) -> Result<BTreeMap<usize, Vec<u8>>> {
        let mut loaded = BTreeMap::new();
        for (&id, path) in replacements {
            let data = fs::read(path).map_err(|e| AfsError::io_at(path, e))?;
            if data.is_empty() {
                return Err(AfsError::InvalidInput(format!(
                    "replacement file {} for entry {} is empty",
                    path.display(),
                    id
                )));
            }
            loaded.insert(id, data);
        }
        Ok(loaded)
    }

    /// New table in one linear pass: replaced entries get an aligned span for
    /// their new size, untouched entries keep their old span
    fn plan(&self, old: &EntryTable, loaded: &BTreeMap<usize, Vec<u8>>) -> Result<EntryTable> {
        let n = old.entry_count();
        let mut cursor = u64::from(old.slots()[0].offset);
        let mut slots = Vec::with_capacity(n + 1);

        for id in 0..n {
            let (size, span) = match loaded.get(&id) {
                Some(data) => {
                    let len = data.len() as u64;
                    (len, self.afs.config.align_up(len))
                }
                None => (u64::from(old.get(id)?.size), u64::from(old.reserved(id)?)),
            };
            slots.push(EntryInfo::new(
                to_u32(cursor, "entry offset")?,
                to_u32(size, "entry size")?,
            ));
            cursor += span;
        }
        slots.push(EntryInfo::new(
            to_u32(cursor, "metadata offset")?,
            old.metadata_slot().size,
        ));

        Ok(EntryTable::from_slots(slots))
    }

    /// Build the new data region: replacement bytes or bytes copied from the
    /// old location, each at its new relative offset
    fn assemble(
        &self,
        old: &EntryTable,
        new: &EntryTable,
        loaded: &BTreeMap<usize, Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let start = u64::from(new.slots()[0].offset);
        let end = u64::from(new.metadata_slot().offset);
        let mut region = vec![0u8; (end - start) as usize];

        for id in 0..new.entry_count() {
            let dest = (u64::from(new.get(id)?.offset) - start) as usize;
            match loaded.get(&id) {
                Some(data) => region[dest..dest + data.len()].copy_from_slice(data),
                None => {
                    let info = old.get(id)?;
                    let bytes = self.afs.read_at(u64::from(info.offset), info.size as usize)?;
                    region[dest..dest + bytes.len()].copy_from_slice(&bytes);
                }
            }
        }
        Ok(region)
    }

    /// Name, wall-clock time and size for every replaced entry
    fn stamp_metadata(
        &self,
        replacements: &BTreeMap<usize, PathBuf>,
        loaded: &BTreeMap<usize, Vec<u8>>,
    ) -> Result<MetadataTable> {
        let mut metadata = self.afs.metadata.clone();
        let now = Timestamp::now();

        for (&id, path) in replacements {
            let meta = metadata.get_mut(id)?;
            if let Some(name) = path.file_name() {
                meta.filename = FixedName::new(&name.to_string_lossy())?;
            }
            meta.last_modified = now;
            meta.filesize = to_u32(loaded[&id].len() as u64, "entry size")?;
        }
        Ok(metadata)
    }

    /// Header bytes up to the first entry, with count and table refreshed
    fn header_region(&self, staged: &StagedLayout) -> Result<Vec<u8>> {
        let table_end = HEADER_SIZE + staged.table.slots().len() as u64 * ENTRY_INFO_SIZE;
        if table_end > staged.data_start {
            return Err(AfsError::Format(format!(
                "entry table ends at {:#x}, past the first entry at {:#x}",
                table_end, staged.data_start
            )));
        }
        let file_len = self.afs.file.metadata()?.len();
        let mut region = self
            .afs
            .read_at(0, staged.data_start.min(file_len) as usize)?;
        region.resize(staged.data_start as usize, 0);

        let count = to_u32(staged.table.entry_count() as u64, "entry count")?;
        region[..HEADER_SIZE as usize].copy_from_slice(&encode_header(&self.afs.identifier, count));
        region[HEADER_SIZE as usize..table_end as usize]
            .copy_from_slice(&encode_entry_table(staged.table.slots()));
        Ok(region)
    }

    /// Metadata table followed by zero padding to the next block boundary
    fn padded_metadata(&self, staged: &StagedLayout) -> Vec<u8> {
        let mut raw = encode_metadata_table(&staged.metadata);
        let padded = self.afs.config.align_up(raw.len() as u64) as usize;
        raw.resize(padded, 0);
        raw
    }

    /// Overwrite the open archive, then trim it
    fn write_in_place(&mut self, staged: &StagedLayout) -> Result<()> {
        let metadata = self.padded_metadata(staged);
        let meta_offset = u64::from(staged.table.metadata_slot().offset);

        self.afs
            .write_at(HEADER_SIZE, &encode_entry_table(staged.table.slots()))?;
        self.afs.write_at(staged.data_start, &staged.data_region)?;
        self.afs.write_at(meta_offset, &metadata)?;
        self.afs.file.set_len(meta_offset + metadata.len() as u64)?;
        self.afs.file.sync_all()?;
        Ok(())
    }

    /// Write the new archive next to the old one and rename it into place
    fn write_staged(&mut self, staged: &StagedLayout) -> Result<()> {
        let header = self.header_region(staged)?;
        let metadata = self.padded_metadata(staged);
        // Swap the file the path resolves to, not a symlink in front of it
        let target =
            fs::canonicalize(&self.afs.path).map_err(|e| AfsError::io_at(&self.afs.path, e))?;
        let permissions = fs::metadata(&target)
            .map_err(|e| AfsError::io_at(&target, e))?
            .permissions();
        let temp_path = staging_path(&target);

        let written = (|| -> Result<File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&header)?;
            writer.write_all(&staged.data_region)?;
            writer.write_all(&metadata)?;
            let file = writer
                .into_inner()
                .map_err(|e| AfsError::io_at(&temp_path, e.into_error()))?;
            file.set_permissions(permissions)?;
            file.sync_all()?;
            Ok(file)
        })();

        let staged_file = match written {
            Ok(file) => file,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_path, &target) {
            let _ = fs::remove_file(&temp_path);
            return Err(AfsError::io_at(&target, e));
        }
        tracing::debug!(
            "Swapped staged archive {} into {}",
            temp_path.display(),
            target.display()
        );

        // The staged handle now refers to the renamed file
        self.afs.file = staged_file;
        Ok(())
    }
}

/// Hidden sibling of `path` used while staging a rebuild
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    path.with_file_name(format!(".{}.rebuild", name))
}
