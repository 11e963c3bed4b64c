//! # Intrusive Page List
//!
//! `PageList` is a doubly-linked ring threaded through page headers and
//! anchored at a sentinel header stored at a fixed byte offset: in the
//! superblock for the free-list and the class-list, or inside a class page
//! for that class's node-list. The list owns no in-memory state: every
//! operation reads the headers it needs from disk and writes every header
//! it changes straight back. One struct, three lists; only the sentinel
//! offset differs.
//!
//! ## Link convention
//!
//! The sentinel is not part of the pagetable, so pages cannot reference it
//! by position; the reserved index `DUMMY_INDEX` stands for "the sentinel"
//! in `prev_index`/`next_index`. The ring for pages `p1..pn`:
//!
//! ```text
//! sentinel.next = p1     p1.prev = DUMMY     p1.next = p2
//! sentinel.prev = pn     pn.prev = p(n-1)    pn.next = DUMMY
//! ```
//!
//! An empty list is the self-linked sentinel (`prev = next = DUMMY`). The
//! element count lives in the word at `sentinel_offset + PAGE_HEADER_SIZE`,
//! which in both the superblock and the class header layouts is exactly the
//! adjacent count field.
//!
//! ## Ordering
//!
//! Insertion and removal happen at the tail, so a list used as a free-list
//! recycles the most recently freed page first. Iteration runs head to
//! tail, i.e. in insertion order.
//!
//! ## Page types
//!
//! The list does not assign page types. A caller pushing onto the free-list
//! types the page `Free` beforehand; the class-list and node-lists type
//! their pages when initializing the headers.

use std::sync::Arc;

use eyre::Result;
use zerocopy::little_endian::U64;

use super::file::DbFile;
use super::page::{page_address, Offset, PageHeader, PageIndex, DUMMY_INDEX};
use super::PAGE_HEADER_SIZE;
use crate::error::DbError;

#[derive(Debug)]
pub struct PageList {
    file: Arc<DbFile>,
    pagetable_origin: Offset,
    sentinel_offset: Offset,
}

impl PageList {
    pub fn new(file: Arc<DbFile>, pagetable_origin: Offset, sentinel_offset: Offset) -> Self {
        Self {
            file,
            pagetable_origin,
            sentinel_offset,
        }
    }

    pub fn sentinel_offset(&self) -> Offset {
        self.sentinel_offset
    }

    fn read_sentinel(&self) -> Result<PageHeader> {
        self.file.read_struct(self.sentinel_offset)
    }

    fn write_sentinel(&self, sentinel: &PageHeader) -> Result<()> {
        self.file.write_struct(sentinel, self.sentinel_offset)
    }

    /// Element count, stored in the word following the sentinel.
    pub fn count(&self) -> Result<u64> {
        let count: U64 = self
            .file
            .read_struct(self.sentinel_offset + PAGE_HEADER_SIZE as Offset)?;
        Ok(count.get())
    }

    fn set_count(&self, count: u64) -> Result<()> {
        self.file.write_struct(
            &U64::new(count),
            self.sentinel_offset + PAGE_HEADER_SIZE as Offset,
        )
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_sentinel()?.next_index() == DUMMY_INDEX)
    }

    /// Reads the header of page `index`. Membership in this list is the
    /// caller's concern.
    pub fn read_page(&self, index: PageIndex) -> Result<PageHeader> {
        self.file
            .read_struct(page_address(self.pagetable_origin, index))
    }

    /// Writes a page header back to its slot.
    pub fn write_page(&self, header: &PageHeader) -> Result<()> {
        self.file
            .write_struct(header, header.address(self.pagetable_origin))
    }

    /// Splices page `index` in as the new tail.
    pub fn push_back(&self, index: PageIndex) -> Result<()> {
        if index == DUMMY_INDEX {
            return Err(DbError::BadArgument("can't push the dummy index".to_string()).into());
        }

        let mut sentinel = self.read_sentinel()?;
        let mut page = self.read_page(index)?;
        page.set_next_index(DUMMY_INDEX);

        if sentinel.next_index() == DUMMY_INDEX {
            page.set_prev_index(DUMMY_INDEX);
            sentinel.set_next_index(index);
        } else {
            let tail = sentinel.prev_index();
            let mut tail_header = self.read_page(tail)?;
            tail_header.set_next_index(index);
            page.set_prev_index(tail);
            self.write_page(&tail_header)?;
        }
        sentinel.set_prev_index(index);

        self.write_page(&page)?;
        self.write_sentinel(&sentinel)?;
        self.set_count(self.count()? + 1)
    }

    /// Detaches and returns the tail. Fails on an empty list.
    pub fn pop_back(&self) -> Result<PageIndex> {
        let mut sentinel = self.read_sentinel()?;
        if sentinel.next_index() == DUMMY_INDEX {
            return Err(DbError::Runtime("pop from an empty page list".to_string()).into());
        }

        let tail = sentinel.prev_index();
        let mut tail_header = self.read_page(tail)?;
        let new_tail = tail_header.prev_index();

        if new_tail == DUMMY_INDEX {
            sentinel.set_prev_index(DUMMY_INDEX);
            sentinel.set_next_index(DUMMY_INDEX);
        } else {
            let mut new_tail_header = self.read_page(new_tail)?;
            new_tail_header.set_next_index(DUMMY_INDEX);
            sentinel.set_prev_index(new_tail);
            self.write_page(&new_tail_header)?;
        }

        tail_header.detach();
        self.write_page(&tail_header)?;
        self.write_sentinel(&sentinel)?;
        self.set_count(self.count()? - 1)?;

        Ok(tail)
    }

    /// Index of the tail. Fails on an empty list.
    pub fn back(&self) -> Result<PageIndex> {
        let sentinel = self.read_sentinel()?;
        if sentinel.next_index() == DUMMY_INDEX {
            return Err(DbError::Runtime("back of an empty page list".to_string()).into());
        }
        Ok(sentinel.prev_index())
    }

    /// Lazy head-to-tail traversal; every yielded header is a fresh on-disk
    /// read. Not restartable across list mutation.
    pub fn iter(&self) -> PageListIter<'_> {
        PageListIter {
            list: self,
            position: Position::BeforeHead,
        }
    }
}

#[derive(Clone, Copy)]
enum Position {
    BeforeHead,
    At(PageIndex),
    Done,
}

pub struct PageListIter<'a> {
    list: &'a PageList,
    position: Position,
}

impl Iterator for PageListIter<'_> {
    type Item = Result<PageHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = match self.position {
            Position::BeforeHead => match self.list.read_sentinel() {
                Ok(sentinel) => sentinel.next_index(),
                Err(e) => {
                    self.position = Position::Done;
                    return Some(Err(e));
                }
            },
            Position::At(index) => index,
            Position::Done => return None,
        };

        if index == DUMMY_INDEX {
            self.position = Position::Done;
            return None;
        }

        match self.list.read_page(index) {
            Ok(header) => {
                self.position = Position::At(header.next_index());
                Some(Ok(header))
            }
            Err(e) => {
                self.position = Position::Done;
                Some(Err(e))
            }
        }
    }
}
