//! Name list reader/writer

use std::fs;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};

use crate::afs::Container;
use crate::error::{AfsError, Result};
use crate::name::{FixedName, NAME_SIZE};

use super::{HEADER_SIZE, MAGIC, MAX_ENTRIES};

/// Ordered list of entry names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameList {
    /// Backing file, if the list was opened or saved
    path: Option<PathBuf>,
    identifier: [u8; 4],
    unknown1: u32,
    unknown2: i32,
    names: Vec<FixedName>,
}

impl NameList {
    /// Fresh list of `entry_count` empty names, not yet backed by a file
    pub fn new(entry_count: usize) -> Result<Self> {
        check_count(entry_count)?;
        Ok(Self {
            path: None,
            identifier: *MAGIC,
            unknown1: 0,
            unknown2: 0,
            names: vec![FixedName::default(); entry_count],
        })
    }

    /// Fresh list holding the current entry names of an archive
    pub fn from_container(afs: &Container) -> Result<Self> {
        let mut list = Self::new(afs.entry_count())?;
        for (slot, meta) in list.names.iter_mut().zip(afs.metadata_table().iter()) {
            *slot = meta.filename;
        }
        Ok(list)
    }

    /// Read a name list from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(AfsError::InvalidPath(path.to_path_buf()));
        }
        let raw = fs::read(path).map_err(|e| {
            tracing::warn!("Cannot read name list {}: {}", path.display(), e);
            AfsError::InvalidPath(path.to_path_buf())
        })?;

        let mut list = Self::decode(&raw)?;
        list.path = Some(path.to_path_buf());
        tracing::debug!("Opened {} ({} names)", path.display(), list.entry_count());
        Ok(list)
    }

    fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(AfsError::Format(format!(
                "Incomplete name list header: expected {} bytes, got {}",
                HEADER_SIZE,
                raw.len()
            )));
        }
        let mut buf = raw;
        let mut identifier = [0u8; 4];
        buf.copy_to_slice(&mut identifier);
        let unknown1 = buf.get_u32_le();
        let unknown2 = buf.get_i32_le();
        let count = buf.get_u32_le() as usize;

        if buf.remaining() < count * NAME_SIZE {
            return Err(AfsError::Format(format!(
                "name list declares {} names but holds only {} bytes of names",
                count,
                buf.remaining()
            )));
        }
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            let mut name = [0u8; NAME_SIZE];
            buf.copy_to_slice(&mut name);
            names.push(FixedName::from_raw(name));
        }

        Ok(Self {
            path: None,
            identifier,
            unknown1,
            unknown2,
            names,
        })
    }

    /// Serialize header and names
    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.names.len())
            .map_err(|_| AfsError::InvalidInput("too many names".to_string()))?;
        let mut out = BytesMut::with_capacity(HEADER_SIZE + self.names.len() * NAME_SIZE);
        out.put_slice(&self.identifier);
        out.put_u32_le(self.unknown1);
        out.put_i32_le(self.unknown2);
        out.put_u32_le(count);
        for name in &self.names {
            out.put_slice(name.as_raw());
        }
        Ok(out.to_vec())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn entry_count(&self) -> usize {
        self.names.len()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn identifier(&self) -> &[u8; 4] {
        &self.identifier
    }

    pub fn name(&self, id: usize) -> Result<&FixedName> {
        self.names.get(id).ok_or(AfsError::EntryOutOfRange {
            id,
            count: self.names.len(),
        })
    }

    pub fn names(&self) -> &[FixedName] {
        &self.names
    }

    /// Index of the first entry with this name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| *n == name)
    }

    // =========================================================================
    // Mutation / Save
    // =========================================================================

    /// Rename one entry in memory
    pub fn rename(&mut self, id: usize, name: &str) -> Result<()> {
        let count = self.names.len();
        let slot = self
            .names
            .get_mut(id)
            .ok_or(AfsError::EntryOutOfRange { id, count })?;
        *slot = FixedName::new(name)?;
        Ok(())
    }

    /// Write back to the file the list was opened from or last saved to
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| AfsError::InvalidHandle("name list has no backing file".to_string()))?;
        self.write_to(path)
    }

    /// Write to `path` and make it the backing file
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(AfsError::InvalidPath(path.to_path_buf()));
        }
        self.write_to(path)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.encode()?).map_err(|e| AfsError::io_at(path, e))?;
        tracing::debug!("Saved {} ({} names)", path.display(), self.entry_count());
        Ok(())
    }
}

fn check_count(count: usize) -> Result<()> {
    if count > MAX_ENTRIES {
        return Err(AfsError::InvalidInput(format!(
            "a name list holds at most {} entries, got {}",
            MAX_ENTRIES, count
        )));
    }
    Ok(())
}
