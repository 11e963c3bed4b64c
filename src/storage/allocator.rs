//! # Page Allocator
//!
//! `PageAllocator` hands out fresh pages by extending the backing file one
//! page at a time, and supports exchanging the physical slots of two pages.
//!
//! ## Allocation
//!
//! The pagetable is append-only: a new page is always the slot immediately
//! past the current end of the file, and `pages_count` only ever grows.
//! Recycling of released pages is the free-list's job, layered above this
//! allocator in `Database`. Before extending, the allocator verifies that
//! the region past `pagetable_origin` is an exact multiple of `PAGE_SIZE`;
//! a torn append from a previous crash surfaces here as
//! `DbError::Structure("Unaligned file")` rather than as silent corruption.
//!
//! `pages_count` is persisted at its fixed superblock offset on every
//! allocation, so a reopened database sees the grown pagetable without
//! relying on the superblock flush at handle drop.
//!
//! ## Swapping
//!
//! `swap_pages` exchanges the physical slots of two pages: each payload
//! moves to the other index and keeps its own list neighborhood. The
//! headers travel with their payloads (index fields swapped, link fields
//! preserved modulo the a/b renaming), direct pagetable neighbors are
//! re-pointed at the new slots, and the two superblock sentinels are
//! patched when they reference either page. This is the groundwork for
//! pagetable compaction.

use std::sync::Arc;

use eyre::Result;
use tracing::{debug, error};
use zerocopy::little_endian::U64;
use zerocopy::FromBytes;

use super::file::DbFile;
use super::headers::{
    CLASS_LIST_SENTINEL_OFFSET, FREE_LIST_SENTINEL_OFFSET, PAGES_COUNT_OFFSET,
};
use super::page::{page_address, Offset, PageHeader, PageIndex, DUMMY_INDEX};
use super::{PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::error::DbError;

#[derive(Debug)]
pub struct PageAllocator {
    file: Arc<DbFile>,
    pagetable_origin: Offset,
    pages_count: u64,
}

impl PageAllocator {
    /// Binds an allocator to the pagetable; `pages_count` is read from its
    /// superblock slot.
    pub fn new(file: Arc<DbFile>, pagetable_origin: Offset) -> Result<Self> {
        let pages_count: U64 = file.read_struct(PAGES_COUNT_OFFSET)?;
        Ok(Self {
            file,
            pagetable_origin,
            pages_count: pages_count.get(),
        })
    }

    pub fn pages_count(&self) -> u64 {
        self.pages_count
    }

    pub fn pagetable_origin(&self) -> Offset {
        self.pagetable_origin
    }

    pub fn file(&self) -> &Arc<DbFile> {
        &self.file
    }

    /// Appends one zeroed page to the file, writes a fresh header into it,
    /// persists the new `pages_count`, and returns the new index.
    pub fn allocate_page(&mut self) -> Result<PageIndex> {
        let file_size = self.file.size()?;
        let aligned = file_size
            .checked_sub(self.pagetable_origin)
            .map(|tail| tail % PAGE_SIZE as u64 == 0)
            .unwrap_or(false);
        if !aligned {
            error!(file_size, "pagetable region is not page-aligned");
            return Err(DbError::Structure("Unaligned file".to_string()).into());
        }

        let new_page_offset = file_size;
        debug!(index = self.pages_count, offset = new_page_offset, "allocating page");

        self.file.extend(PAGE_SIZE as u64)?;
        self.file
            .write_struct(&PageHeader::new(self.pages_count), new_page_offset)?;

        self.pages_count += 1;
        self.file
            .write_struct(&U64::new(self.pages_count), PAGES_COUNT_OFFSET)?;

        Ok(self.pages_count - 1)
    }

    /// Exchanges the physical slots of pages `first` and `second`.
    pub fn swap_pages(&mut self, first: PageIndex, second: PageIndex) -> Result<()> {
        if first >= self.pages_count || second >= self.pages_count {
            return Err(DbError::BadArgument(format!(
                "page index exceeds pages count: {}",
                self.pages_count
            ))
            .into());
        }
        if first == second {
            return Ok(());
        }

        debug!(first, second, "swapping pages");

        let remap = |index: PageIndex| {
            if index == first {
                second
            } else if index == second {
                first
            } else {
                index
            }
        };

        let mut first_data = vec![0u8; PAGE_SIZE];
        let mut second_data = vec![0u8; PAGE_SIZE];
        self.file
            .read_at(&mut first_data, page_address(self.pagetable_origin, first))?;
        self.file
            .read_at(&mut second_data, page_address(self.pagetable_origin, second))?;

        let first_header = parse_header(&first_data)?;
        let second_header = parse_header(&second_data)?;

        let mut neighbors = Vec::new();
        for index in [
            first_header.prev_index(),
            first_header.next_index(),
            second_header.prev_index(),
            second_header.next_index(),
        ] {
            if index != DUMMY_INDEX && index != first && index != second && !neighbors.contains(&index)
            {
                neighbors.push(index);
            }
        }

        rewrite_header(&mut first_data, second, remap, &first_header)?;
        rewrite_header(&mut second_data, first, remap, &second_header)?;

        self.file
            .write_at(&first_data, page_address(self.pagetable_origin, second))?;
        self.file
            .write_at(&second_data, page_address(self.pagetable_origin, first))?;

        for index in neighbors {
            let address = page_address(self.pagetable_origin, index);
            let mut header: PageHeader = self.file.read_struct(address)?;
            header.set_prev_index(remap(header.prev_index()));
            header.set_next_index(remap(header.next_index()));
            self.file.write_struct(&header, address)?;
        }

        // TODO: patch node-list sentinels embedded in class pages once
        // node-page compaction lands; until then only the superblock
        // sentinels are adjusted.
        for sentinel_offset in [FREE_LIST_SENTINEL_OFFSET, CLASS_LIST_SENTINEL_OFFSET] {
            let mut sentinel: PageHeader = self.file.read_struct(sentinel_offset)?;
            let patched_prev = remap(sentinel.prev_index());
            let patched_next = remap(sentinel.next_index());
            if patched_prev != sentinel.prev_index() || patched_next != sentinel.next_index() {
                sentinel.set_prev_index(patched_prev);
                sentinel.set_next_index(patched_next);
                self.file.write_struct(&sentinel, sentinel_offset)?;
            }
        }

        Ok(())
    }
}

fn parse_header(page_data: &[u8]) -> Result<PageHeader> {
    PageHeader::read_from_bytes(&page_data[..PAGE_HEADER_SIZE])
        .map_err(|e| eyre::eyre!("failed to parse PageHeader: {:?}", e))
}

/// Rewrites the header prefix of a relocating page: new index, links kept
/// but renamed through the swap.
fn rewrite_header(
    page_data: &mut [u8],
    new_index: PageIndex,
    remap: impl Fn(PageIndex) -> PageIndex,
    old: &PageHeader,
) -> Result<()> {
    let header = PageHeader::mut_from_bytes(&mut page_data[..PAGE_HEADER_SIZE])
        .map_err(|e| eyre::eyre!("failed to parse PageHeader: {:?}", e))?;
    header.set_index(new_index);
    header.set_prev_index(remap(old.prev_index()));
    header.set_next_index(remap(old.next_index()));
    Ok(())
}
