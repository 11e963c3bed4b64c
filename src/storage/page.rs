//! # Page Types and Header Layout
//!
//! Every 4KB page in the pagetable begins with a 32-byte header carrying the
//! page's identity, its position in whichever intrusive list it belongs to,
//! and its in-page allocation state.
//!
//! ## Page Header Layout (32 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       8     index        Page index within the pagetable
//! 8       8     prev_index   Previous page in the owning list
//! 16      8     next_index   Next page in the owning list
//! 24      2     first_free   Bump-allocation cursor from page start
//! 26      2     actual_size  Bytes occupied by the payload
//! 28      1     page_type    Empty / Free / Sentinel / ClassHeader / Node
//! 29      3     reserved     Reserved
//! ```
//!
//! ## Index graph, not pointer graph
//!
//! List neighbors are stored as page indices and resolved to byte offsets
//! with [`page_address`]. The reserved index [`DUMMY_INDEX`] (`u64::MAX`)
//! designates a list sentinel: sentinels are degenerate headers embedded in
//! the superblock (or, for per-class node-lists, in a class page) rather
//! than in the pagetable. A header whose `prev_index` and `next_index` both
//! equal its own `index` is detached from every list; a fresh sentinel is
//! self-linked through `DUMMY_INDEX`.
//!
//! ## Zero-Copy Access
//!
//! The header is a `zerocopy` struct with little-endian wrapper fields, so
//! it is read and written as raw bytes at page boundaries with no
//! serialization step and an identical layout on every platform.

use zerocopy::little_endian::{U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::{PAGE_HEADER_SIZE, PAGE_SIZE};

pub type PageIndex = u64;
pub type Offset = u64;

/// Reserved index used by list sentinels and never present in the pagetable.
pub const DUMMY_INDEX: PageIndex = u64::MAX;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Empty = 0x00,
    Free = 0x01,
    Sentinel = 0x02,
    ClassHeader = 0x03,
    Node = 0x04,
    Unknown = 0xFF,
}

impl PageType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => PageType::Empty,
            0x01 => PageType::Free,
            0x02 => PageType::Sentinel,
            0x03 => PageType::ClassHeader,
            0x04 => PageType::Node,
            _ => PageType::Unknown,
        }
    }
}

/// Returns the absolute file offset of page `index`.
pub fn page_address(pagetable_origin: Offset, index: PageIndex) -> Offset {
    pagetable_origin + index * PAGE_SIZE as u64
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    index: U64,
    prev_index: U64,
    next_index: U64,
    first_free: U16,
    actual_size: U16,
    page_type: u8,
    reserved: [u8; 3],
}

const _: () = assert!(std::mem::size_of::<PageHeader>() == PAGE_HEADER_SIZE);

impl PageHeader {
    /// A fresh, detached page: `Empty`, self-linked, cursor just past the
    /// header.
    pub fn new(index: PageIndex) -> Self {
        Self {
            index: U64::new(index),
            prev_index: U64::new(index),
            next_index: U64::new(index),
            first_free: U16::new(PAGE_HEADER_SIZE as u16),
            actual_size: U16::new(0),
            page_type: PageType::Empty as u8,
            reserved: [0; 3],
        }
    }

    /// A list sentinel: `Sentinel`-typed, `DUMMY_INDEX`, self-linked.
    pub fn sentinel() -> Self {
        let mut header = Self::new(DUMMY_INDEX);
        header.page_type = PageType::Sentinel as u8;
        header
    }

    pub fn index(&self) -> PageIndex {
        self.index.get()
    }

    pub fn set_index(&mut self, index: PageIndex) {
        self.index = U64::new(index);
    }

    pub fn prev_index(&self) -> PageIndex {
        self.prev_index.get()
    }

    pub fn set_prev_index(&mut self, index: PageIndex) {
        self.prev_index = U64::new(index);
    }

    pub fn next_index(&self) -> PageIndex {
        self.next_index.get()
    }

    pub fn set_next_index(&mut self, index: PageIndex) {
        self.next_index = U64::new(index);
    }

    pub fn first_free(&self) -> u16 {
        self.first_free.get()
    }

    pub fn set_first_free(&mut self, offset: u16) {
        self.first_free = U16::new(offset);
    }

    pub fn actual_size(&self) -> u16 {
        self.actual_size.get()
    }

    pub fn set_actual_size(&mut self, size: u16) {
        self.actual_size = U16::new(size);
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_byte(self.page_type)
    }

    pub fn set_page_type(&mut self, page_type: PageType) {
        self.page_type = page_type as u8;
    }

    /// True when the page belongs to no list.
    pub fn is_detached(&self) -> bool {
        self.prev_index() == self.index() && self.next_index() == self.index()
    }

    /// Detaches the page by self-linking it.
    pub fn detach(&mut self) {
        let index = self.index();
        self.set_prev_index(index);
        self.set_next_index(index);
    }

    /// Absolute file offset of this page.
    pub fn address(&self, pagetable_origin: Offset) -> Offset {
        page_address(pagetable_origin, self.index())
    }

    /// Remaining bump-allocatable bytes in the page.
    pub fn free_space(&self) -> usize {
        PAGE_SIZE.saturating_sub(self.first_free() as usize)
    }
}
