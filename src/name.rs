//! Fixed-size entry names
//!
//! Both formats store names in 32-byte buffers. A name that fills the whole
//! buffer has no terminator; shorter names are zero-padded.

use std::fmt;

use crate::error::{AfsError, Result};

/// Size of a name buffer in both AFS metadata and AFL name lists
pub const NAME_SIZE: usize = 0x20;

/// Bounded name: at most 32 bytes, truncated on write, zero-padded on disk
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FixedName {
    buf: [u8; NAME_SIZE],
}

impl FixedName {
    /// Build a name from text, truncating to 32 bytes on a char boundary.
    ///
    /// Empty names are rejected.
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(AfsError::InvalidInput("name must not be empty".to_string()));
        }
        let mut end = name.len().min(NAME_SIZE);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let mut buf = [0u8; NAME_SIZE];
        buf[..end].copy_from_slice(&name.as_bytes()[..end]);
        Ok(Self { buf })
    }

    /// Wrap a raw on-disk buffer as-is
    pub fn from_raw(buf: [u8; NAME_SIZE]) -> Self {
        Self { buf }
    }

    /// Raw on-disk buffer
    pub fn as_raw(&self) -> &[u8; NAME_SIZE] {
        &self.buf
    }

    /// Bytes up to the first NUL
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.buf.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        &self.buf[..len]
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf[0] == 0
    }

    /// Name as text; invalid UTF-8 is replaced
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl fmt::Display for FixedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for FixedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedName({:?})", self.to_string_lossy())
    }
}

impl PartialEq<str> for FixedName {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for FixedName {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
