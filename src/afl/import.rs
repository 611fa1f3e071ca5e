//! Name list import
//!
//! Copies names into an archive's metadata table by index.

use crate::afs::Container;
use crate::error::{AfsError, Result};

use super::NameList;

/// Outcome of importing a name list
#[derive(Debug)]
pub struct ImportReport {
    /// Number of names copied
    pub applied: usize,
    /// `CountMismatch` when the list and the archive differ in length
    pub warning: Option<AfsError>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.warning.is_none()
    }
}

impl NameList {
    /// Copy names `0..min(list, archive)` into the archive's metadata
    ///
    /// A count difference is not an error: the overlapping range is imported
    /// and the mismatch is reported. With `permanent` the whole metadata
    /// table is written back in one write.
    pub fn import_into(&self, afs: &mut Container, permanent: bool) -> Result<ImportReport> {
        let container = afs.entry_count();
        let name_list = self.entry_count();

        let warning = if container != name_list {
            tracing::warn!(
                "Name list has {} names but archive has {} entries; importing {}",
                name_list,
                container,
                container.min(name_list)
            );
            Some(AfsError::CountMismatch {
                container,
                name_list,
            })
        } else {
            None
        };

        let applied = container.min(name_list);
        afs.apply_names(&self.names()[..applied], permanent)?;

        Ok(ImportReport { applied, warning })
    }
}
