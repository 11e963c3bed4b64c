//! # Superblock and Class Header
//!
//! The first 104 bytes of a database file are the magic number and the
//! superblock; the pagetable starts immediately after.
//!
//! ## File Layout
//!
//! ```text
//! Offset  Size  Description
//! ------  ----  ----------------------------------------
//! 0       8     Magic: 0xDEADBEEF (little-endian u64)
//! 8       32    free_list_sentinel: PageHeader
//! 40      8     free_pages_count: u64
//! 48      8     pagetable_origin: u64 (always 104)
//! 56      8     pages_count: u64
//! 64      32    class_list_sentinel: PageHeader
//! 96      8     class_list_count: u64
//! 104           page 0, page 1, ...
//! ```
//!
//! The byte offset of every superblock field is exported as a named
//! constant because the allocator and the page lists write individual
//! fields through to disk without rewriting the whole superblock. Each
//! list's count word sits at `sentinel offset + PAGE_HEADER_SIZE`; this is
//! the sentinel/count convention `PageList` relies on, and the `ClassHeader`
//! layout repeats it for the per-class node-list.
//!
//! ## Class Header Layout (80 bytes, at the start of a class page)
//!
//! ```text
//! Offset  Size  Description
//! ------  ----  ----------------------------------------
//! 0       32    PageHeader (type = ClassHeader)
//! 32      32    node_list_sentinel: PageHeader
//! 64      8     node_pages_count: u64 (the node-list count word)
//! 72      8     nodes: u64
//! 80            serialized class descriptor (first_free points here)
//! ```

use eyre::Result;
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::file::DbFile;
use super::page::{page_address, Offset, PageHeader, PageIndex, PageType};
use super::{CLASS_HEADER_SIZE, PAGE_HEADER_SIZE, SUPERBLOCK_SIZE};
use crate::error::DbError;

/// Magic number at offset 0 of every database file.
pub const MAGIC: u64 = 0xDEADBEEF;
pub const MAGIC_SIZE: usize = std::mem::size_of::<u64>();

pub const FREE_LIST_SENTINEL_OFFSET: Offset = MAGIC_SIZE as Offset;
pub const FREE_PAGES_COUNT_OFFSET: Offset =
    FREE_LIST_SENTINEL_OFFSET + PAGE_HEADER_SIZE as Offset;
pub const PAGETABLE_OFFSET: Offset = FREE_PAGES_COUNT_OFFSET + 8;
pub const PAGES_COUNT_OFFSET: Offset = PAGETABLE_OFFSET + 8;
pub const CLASS_LIST_SENTINEL_OFFSET: Offset = PAGES_COUNT_OFFSET + 8;
pub const CLASS_LIST_COUNT_OFFSET: Offset =
    CLASS_LIST_SENTINEL_OFFSET + PAGE_HEADER_SIZE as Offset;

/// Byte offset of the first page; the pagetable follows the superblock
/// directly.
pub const PAGETABLE_ORIGIN: Offset = (MAGIC_SIZE + SUPERBLOCK_SIZE) as Offset;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Superblock {
    free_list_sentinel: PageHeader,
    free_pages_count: U64,
    pagetable_origin: U64,
    pages_count: U64,
    class_list_sentinel: PageHeader,
    class_list_count: U64,
}

const _: () = assert!(std::mem::size_of::<Superblock>() == SUPERBLOCK_SIZE);
const _: () = assert!(CLASS_LIST_COUNT_OFFSET + 8 == PAGETABLE_ORIGIN);

impl Superblock {
    /// A fresh superblock: self-linked sentinels, zeroed counters.
    pub fn new() -> Self {
        Self {
            free_list_sentinel: PageHeader::sentinel(),
            free_pages_count: U64::new(0),
            pagetable_origin: U64::new(PAGETABLE_ORIGIN),
            pages_count: U64::new(0),
            class_list_sentinel: PageHeader::sentinel(),
            class_list_count: U64::new(0),
        }
    }

    /// Fails with `DbError::Structure` unless the file starts with the
    /// magic number.
    pub fn check_consistency(file: &DbFile) -> Result<()> {
        let magic: U64 = file.read_struct(0).map_err(|_| {
            DbError::Structure(format!(
                "can't open database from this file: {}",
                file.path().display()
            ))
        })?;

        if magic.get() != MAGIC {
            return Err(DbError::Structure(format!(
                "can't open database from this file: {}",
                file.path().display()
            ))
            .into());
        }

        Ok(())
    }

    /// Validates the magic, then reads the superblock.
    pub fn read(file: &DbFile) -> Result<Self> {
        Self::check_consistency(file)?;
        file.read_struct(MAGIC_SIZE as Offset).map_err(|_| {
            DbError::Structure(format!(
                "truncated superblock in '{}'",
                file.path().display()
            ))
            .into()
        })
    }

    /// Initializes the file with the magic and a fresh superblock, leaving
    /// the pagetable empty.
    pub fn init(file: &DbFile) -> Result<Self> {
        let superblock = Self::new();
        file.write_struct(&U64::new(MAGIC), 0)?;
        file.write_struct(&superblock, MAGIC_SIZE as Offset)?;
        Ok(superblock)
    }

    /// Writes the in-memory copy back; the magic must still be present.
    pub fn write(&self, file: &DbFile) -> Result<()> {
        Self::check_consistency(file)?;
        file.write_struct(self, MAGIC_SIZE as Offset)
    }

    pub fn free_list_sentinel(&self) -> &PageHeader {
        &self.free_list_sentinel
    }

    pub fn free_pages_count(&self) -> u64 {
        self.free_pages_count.get()
    }

    pub fn pagetable_origin(&self) -> Offset {
        self.pagetable_origin.get()
    }

    pub fn pages_count(&self) -> u64 {
        self.pages_count.get()
    }

    pub fn class_list_sentinel(&self) -> &PageHeader {
        &self.class_list_sentinel
    }

    pub fn class_list_count(&self) -> u64 {
        self.class_list_count.get()
    }
}

impl Default for Superblock {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ClassHeader {
    page: PageHeader,
    node_list_sentinel: PageHeader,
    node_pages_count: U64,
    nodes: U64,
}

const _: () = assert!(std::mem::size_of::<ClassHeader>() == CLASS_HEADER_SIZE);

/// In-page offset of the node-list sentinel inside a class page.
pub const NODE_LIST_SENTINEL_OFFSET: Offset = PAGE_HEADER_SIZE as Offset;

impl ClassHeader {
    pub fn new(index: PageIndex) -> Self {
        let mut page = PageHeader::new(index);
        page.set_page_type(PageType::ClassHeader);
        Self {
            page,
            node_list_sentinel: PageHeader::sentinel(),
            node_pages_count: U64::new(0),
            nodes: U64::new(0),
        }
    }

    /// Reads the extended header of page `index`.
    pub fn read(file: &DbFile, pagetable_origin: Offset, index: PageIndex) -> Result<Self> {
        file.read_struct(page_address(pagetable_origin, index))
    }

    /// Resets everything except the page's identity and list links: type,
    /// payload size, cursor, node-list sentinel, counters.
    pub fn init(&mut self, size: u16) {
        self.page.set_page_type(PageType::ClassHeader);
        self.page.set_actual_size(size);
        self.page.set_first_free(CLASS_HEADER_SIZE as u16);
        self.node_list_sentinel = PageHeader::sentinel();
        self.node_pages_count = U64::new(0);
        self.nodes = U64::new(0);
    }

    /// Writes the extended header back to its page.
    pub fn write(&self, file: &DbFile, pagetable_origin: Offset) -> Result<()> {
        file.write_struct(self, self.page.address(pagetable_origin))
    }

    pub fn page(&self) -> &PageHeader {
        &self.page
    }

    pub fn node_list_sentinel(&self) -> &PageHeader {
        &self.node_list_sentinel
    }

    pub fn node_pages_count(&self) -> u64 {
        self.node_pages_count.get()
    }

    pub fn nodes(&self) -> u64 {
        self.nodes.get()
    }

    pub fn set_nodes(&mut self, nodes: u64) {
        self.nodes = U64::new(nodes);
    }
}
