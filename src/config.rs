//! Configuration for afspack
//!
//! Centralized configuration with sensible defaults.

use crate::error::{AfsError, Result};

/// Reserved-space granularity used by the reference format
pub const DEFAULT_BLOCK_SIZE: u32 = 2048;

/// Configuration shared by containers, builders and rebuilds
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Layout Configuration
    // -------------------------------------------------------------------------
    /// Alignment of every entry's reserved space, in bytes.
    /// Must be a non-zero multiple of 16.
    pub block_size: u32,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// When persisted mutations are synced to disk
    pub sync_strategy: SyncStrategy,

    /// How batch rebuilds reach the disk
    pub rebuild_strategy: RebuildStrategy,
}

/// Sync strategy: how often to fsync the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync only on `close()` / `save()`
    OnClose,

    /// fsync after every persisted mutation (safest, slowest)
    EveryWrite,
}

/// Rebuild strategy for multi-entry replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStrategy {
    /// Stage the whole new archive in a sibling temp file and rename it over
    /// the archive as the last step
    StagedSwap,

    /// Rewrite table, data region and metadata directly into the open file
    InPlace,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            sync_strategy: SyncStrategy::OnClose,
            rebuild_strategy: RebuildStrategy::StagedSwap,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the layout constants
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size % 16 != 0 {
            return Err(AfsError::Config(format!(
                "block size must be a non-zero multiple of 16, got {}",
                self.block_size
            )));
        }
        Ok(())
    }

    /// Round `len` up to the next block boundary
    pub fn align_up(&self, len: u64) -> u64 {
        let block = u64::from(self.block_size);
        len.div_ceil(block) * block
    }

    /// Reserved span for a freshly laid out entry: never less than one block
    pub(crate) fn fresh_span(&self, len: u64) -> u64 {
        self.align_up(len).max(u64::from(self.block_size))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the reserved-space block size (in bytes)
    pub fn block_size(mut self, size: u32) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the rebuild strategy
    pub fn rebuild_strategy(mut self, strategy: RebuildStrategy) -> Self {
        self.config.rebuild_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
