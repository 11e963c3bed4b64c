//! # Flat File Store
//!
//! `DbFile` is the byte-level backing store for the database: one flat file
//! accessed with positioned reads and writes at absolute offsets. Everything
//! above it (superblock, pagetable, page lists) is expressed in terms of
//! typed reads and writes against this surface.
//!
//! ## Design
//!
//! Positioned I/O (`pread`/`pwrite`) was chosen over memory mapping because
//! the file must be usable at every size from zero bytes upward (a freshly
//! created database file is empty until the superblock is initialized, and
//! `clear()` truncates back to zero) and because the superblock region in
//! front of the pagetable is not page-aligned. Every operation takes
//! `&self`: positioned I/O carries no seek cursor, so the handle can be
//! shared between the allocator, both page lists, and the database without
//! interior mutability.
//!
//! ## Typed access
//!
//! `read_struct`/`write_struct` move fixed-layout `zerocopy` structs to and
//! from absolute offsets. All on-disk structs in this crate pin their field
//! order with `#[repr(C)]` and use little-endian wrapper fields, so the
//! bytes written here are identical across platforms.
//!
//! ## Short reads
//!
//! A read past the end of the file is an error, not a zero-fill. Truncation
//! is how structural damage usually presents, and callers map these
//! failures to `DbError::Structure`.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Flat byte store over a single file, shared by all storage components.
#[derive(Debug)]
pub struct DbFile {
    file: File,
    path: PathBuf,
}

impl DbFile {
    /// Opens `path` read-write, creating it if it does not exist. The file
    /// contents are left untouched.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> Result<u64> {
        let metadata = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?;
        Ok(metadata.len())
    }

    /// Grows the file by `delta` bytes of zeros.
    pub fn extend(&self, delta: u64) -> Result<()> {
        let size = self.size()?;
        self.file
            .set_len(size + delta)
            .wrap_err_with(|| format!("failed to extend '{}' by {} bytes", self.path.display(), delta))
    }

    /// Truncates the file to zero bytes.
    pub fn clear(&self) -> Result<()> {
        self.file
            .set_len(0)
            .wrap_err_with(|| format!("failed to clear '{}'", self.path.display()))
    }

    /// Reads exactly `buf.len()` bytes at `offset`. A short read is an error.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.file.read_exact_at(buf, offset).wrap_err_with(|| {
            format!(
                "failed to read {} bytes at offset {} from '{}'",
                buf.len(),
                offset,
                self.path.display()
            )
        })
    }

    /// Writes all of `bytes` at `offset`, extending the file if the range
    /// reaches past the current end.
    pub fn write_at(&self, bytes: &[u8], offset: u64) -> Result<()> {
        self.file.write_all_at(bytes, offset).wrap_err_with(|| {
            format!(
                "failed to write {} bytes at offset {} to '{}'",
                bytes.len(),
                offset,
                self.path.display()
            )
        })
    }

    /// Reads a fixed-layout struct at `offset`.
    pub fn read_struct<T: FromBytes>(&self, offset: u64) -> Result<T> {
        let mut buf = vec![0u8; std::mem::size_of::<T>()];
        self.read_at(&mut buf, offset)?;
        T::read_from_bytes(&buf)
            .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", std::any::type_name::<T>(), e))
    }

    /// Writes a fixed-layout struct at `offset`.
    pub fn write_struct<T: IntoBytes + Immutable>(&self, value: &T, offset: u64) -> Result<()> {
        self.write_at(value.as_bytes(), offset)
    }

    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }
}
