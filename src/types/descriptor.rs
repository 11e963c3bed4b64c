//! # Class Descriptors
//!
//! A `ClassDescriptor` is the stored form of a schema: the canonical string
//! behind a `u32` little-endian length prefix. The canonical string is the
//! schema's only identity, so the descriptor carries nothing else; reading
//! one back from disk reconstructs the full identity of the class page it
//! lives in.
//!
//! ```text
//! Offset  Size  Description
//! ------  ----  ----------------------------------------
//! 0       4     length: u32 (bytes of canonical string)
//! 4       n     canonical string, UTF-8
//! ```

use std::fmt;

use eyre::Result;
use zerocopy::little_endian::U32;

use super::class::Class;
use crate::error::DbError;
use crate::storage::file::DbFile;
use crate::storage::{Offset, PAGE_SIZE};

/// Length-prefix bytes in front of the canonical string.
pub const DESCRIPTOR_PREFIX_SIZE: usize = std::mem::size_of::<u32>();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    canonical: String,
}

impl ClassDescriptor {
    pub fn new(class: &Class) -> Self {
        Self {
            canonical: class.canonical(),
        }
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Serialized size: length prefix plus string bytes.
    pub fn size(&self) -> usize {
        DESCRIPTOR_PREFIX_SIZE + self.canonical.len()
    }

    /// Writes the length-prefixed canonical string at `offset`.
    pub fn write(&self, file: &DbFile, offset: Offset) -> Result<()> {
        file.write_struct(&U32::new(self.canonical.len() as u32), offset)?;
        file.write_at(
            self.canonical.as_bytes(),
            offset + DESCRIPTOR_PREFIX_SIZE as Offset,
        )
    }

    /// Reads a descriptor back from `offset`. Truncation, an implausible
    /// length, or non-UTF-8 contents fail with `DbError::Structure`.
    pub fn read(file: &DbFile, offset: Offset) -> Result<Self> {
        let length: U32 = file
            .read_struct(offset)
            .map_err(|_| DbError::Structure("truncated class descriptor".to_string()))?;
        let length = length.get() as usize;

        if length > PAGE_SIZE {
            return Err(DbError::Structure(format!(
                "class descriptor length {} exceeds the page size",
                length
            ))
            .into());
        }

        let mut bytes = vec![0u8; length];
        file.read_at(&mut bytes, offset + DESCRIPTOR_PREFIX_SIZE as Offset)
            .map_err(|_| DbError::Structure("truncated class descriptor".to_string()))?;

        let canonical = String::from_utf8(bytes)
            .map_err(|_| DbError::Structure("class descriptor is not valid UTF-8".to_string()))?;

        Ok(Self { canonical })
    }

    /// Structural containment: under the canonical grammar a sub-schema is
    /// contained exactly when its canonical string occurs in this one.
    pub fn contains(&self, other: &ClassDescriptor) -> bool {
        self.canonical.contains(&other.canonical)
    }
}

impl fmt::Display for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}
