//! # Database Handle
//!
//! `Database` ties the storage layer together: it owns the backing file,
//! keeps the in-memory mirror of the superblock, drives the page allocator
//! and the two superblock rings, and maintains the class registry.
//!
//! ## Open semantics
//!
//! - `Write` wipes the file and initializes a fresh superblock.
//! - `Read` validates the existing superblock and fails otherwise.
//! - `Default` tries `Read` first; if the file is structurally unreadable
//!   it is treated as "not yet a database" and reinitialized in place. Any
//!   other failure still propagates.
//!
//! After the superblock is settled the handle rebuilds `class_map`, the
//! registry from canonical string to page index, by walking the on-disk
//! class-list. The map is a pure cache: the class-list is authoritative,
//! and `print_all_classes` can answer from either side precisely so tests
//! can catch the two disagreeing.
//!
//! ## Allocation policy
//!
//! `allocate_page` pops the most recently freed page off the free-list and
//! only extends the file through the allocator when the free-list is empty.
//! `free_page` types the page `Free` and pushes it back; a page that is
//! already `Free` is a double free and is rejected.
//!
//! ## Node storage
//!
//! Each class page anchors its own intrusive node-list. `add_node` bump
//! allocates into the tail node page while the serialized value fits, and
//! grows the list by one `Node` page otherwise. Nodes are packed
//! back-to-back; the schema drives decoding, so `collect_nodes` walks a
//! page from the header to the bump cursor without any per-node framing.
//!
//! ## Shutdown
//!
//! Dropping the handle flushes the superblock and syncs the file. The
//! lists and the allocator write their superblock fields through on every
//! mutation, so the flush first re-reads that state into the in-memory
//! copy. The copy is a mirror, never a newer truth.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use eyre::Result;
use tracing::{debug, error, info};

use crate::error::DbError;
use crate::storage::{
    page_address, ClassHeader, DbFile, Offset, PageAllocator, PageHeader, PageIndex, PageList,
    PageType, Superblock, CLASS_LIST_SENTINEL_OFFSET, CLASS_PAGE_USABLE_SIZE,
    FREE_LIST_SENTINEL_OFFSET, NODE_LIST_SENTINEL_OFFSET, PAGE_HEADER_SIZE, PAGE_USABLE_SIZE,
};
use crate::types::{Class, ClassDescriptor, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read if possible, reinitialize when the file is not a database.
    Default,
    /// Require an existing, valid database.
    Read,
    /// Wipe the file and start fresh.
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMode {
    /// Answer from the in-memory class map.
    Cache,
    /// Answer by walking the on-disk class-list.
    File,
}

#[derive(Debug)]
pub struct Database {
    file: Arc<DbFile>,
    superblock: Superblock,
    alloc: PageAllocator,
    free_list: PageList,
    class_list: PageList,
    class_map: HashMap<String, PageIndex>,
}

impl Database {
    /// Opens the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        Self::with_file(Arc::new(DbFile::open(path)?), mode)
    }

    /// Builds a handle over an already-open file.
    pub fn with_file(file: Arc<DbFile>, mode: OpenMode) -> Result<Self> {
        let superblock = match mode {
            OpenMode::Read => {
                debug!("open mode: read");
                Superblock::read(&file)?
            }
            OpenMode::Write => {
                debug!("open mode: write");
                file.clear()?;
                Superblock::init(&file)?
            }
            OpenMode::Default => {
                debug!("open mode: default");
                match Superblock::read(&file) {
                    Ok(superblock) => superblock,
                    Err(e)
                        if e.downcast_ref::<DbError>()
                            .is_some_and(DbError::is_recoverable_open_failure) =>
                    {
                        error!(
                            file = %file.path().display(),
                            "can't open the file in read mode, reinitializing"
                        );
                        file.clear()?;
                        Superblock::init(&file)?
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let origin = superblock.pagetable_origin();
        let alloc = PageAllocator::new(Arc::clone(&file), origin)?;
        info!("allocator initialized");

        let free_list = PageList::new(Arc::clone(&file), origin, FREE_LIST_SENTINEL_OFFSET);
        let free_count = free_list.count()?;
        debug!(count = free_count, "free list initialized");

        let class_list = PageList::new(Arc::clone(&file), origin, CLASS_LIST_SENTINEL_OFFSET);
        let class_count = class_list.count()?;
        debug!(count = class_count, "class list initialized");

        let mut database = Self {
            file,
            superblock,
            alloc,
            free_list,
            class_list,
            class_map: HashMap::new(),
        };
        database.initialize_class_map()?;
        Ok(database)
    }

    fn initialize_class_map(&mut self) -> Result<()> {
        info!("initializing class map");
        self.class_map.clear();

        let origin = self.pagetable_origin();
        for header in self.class_list.iter() {
            let header = header?;
            let descriptor = ClassDescriptor::read(
                &self.file,
                header.address(origin) + header.first_free() as Offset,
            )?;
            debug!(index = header.index(), class = %descriptor, "registered class");
            self.class_map
                .insert(descriptor.canonical().to_string(), header.index());
        }
        Ok(())
    }

    pub fn file(&self) -> &Arc<DbFile> {
        &self.file
    }

    pub fn pagetable_origin(&self) -> Offset {
        self.superblock.pagetable_origin()
    }

    pub fn pages_count(&self) -> u64 {
        self.alloc.pages_count()
    }

    pub fn free_pages_count(&self) -> Result<u64> {
        self.free_list.count()
    }

    pub fn class_count(&self) -> Result<u64> {
        self.class_list.count()
    }

    /// Pops the most recently freed page, or extends the file when the
    /// free-list is empty.
    pub fn allocate_page(&mut self) -> Result<PageIndex> {
        if self.free_list.is_empty()? {
            return self.alloc.allocate_page();
        }
        self.free_list.pop_back()
    }

    /// Recycles a page onto the free-list. Freeing a page that is already
    /// `Free` fails with `DbError::Runtime("Double free")`.
    pub fn free_page(&mut self, index: PageIndex) -> Result<()> {
        if index >= self.alloc.pages_count() {
            return Err(DbError::BadArgument(format!(
                "page index exceeds pages count: {}",
                self.alloc.pages_count()
            ))
            .into());
        }

        let mut header = self.free_list.read_page(index)?;
        if header.page_type() == PageType::Free {
            return Err(DbError::Runtime("Double free".to_string()).into());
        }

        header.set_page_type(PageType::Free);
        self.free_list.write_page(&header)?;
        self.free_list.push_back(index)
    }

    /// Registers a schema: one page on the class-list carrying the
    /// serialized descriptor.
    pub fn add_class(&mut self, class: &Class) -> Result<()> {
        let descriptor = ClassDescriptor::new(class);

        if self.class_map.contains_key(descriptor.canonical()) {
            return Err(DbError::Runtime("Class already present in database".to_string()).into());
        }
        if descriptor.size() > CLASS_PAGE_USABLE_SIZE {
            return Err(DbError::NotImplemented("Too complex class".to_string()).into());
        }

        info!("adding class");
        debug!(class = %descriptor, "canonical form");

        let index = self.allocate_page()?;
        debug!(index, "class page allocated");
        self.class_list.push_back(index)?;

        let origin = self.pagetable_origin();
        let mut header = ClassHeader::read(&self.file, origin, index)?;
        header.init(descriptor.size() as u16);
        header.write(&self.file, origin)?;

        descriptor.write(
            &self.file,
            header.page().address(origin) + header.page().first_free() as Offset,
        )?;
        self.class_map
            .insert(descriptor.canonical().to_string(), index);
        Ok(())
    }

    /// Stores one instance of a registered class on the class's node-list.
    pub fn add_node(&mut self, node: &Node) -> Result<()> {
        let canonical = node.class().canonical();
        let class_index = *self
            .class_map
            .get(&canonical)
            .ok_or_else(|| DbError::Runtime("Class not present in database".to_string()))?;

        let size = node.size();
        if size > PAGE_USABLE_SIZE {
            return Err(DbError::NotImplemented("Too complex node".to_string()).into());
        }

        debug!(class = %canonical, size, "adding node");

        let origin = self.pagetable_origin();
        let node_list = self.node_list_of(class_index);

        let index = match self.node_target_page(&node_list, size)? {
            Some(index) => index,
            None => {
                let index = self.allocate_page()?;
                let mut header = PageHeader::new(index);
                header.set_page_type(PageType::Node);
                self.file
                    .write_struct(&header, page_address(origin, index))?;
                node_list.push_back(index)?;
                debug!(index, "node page allocated");
                index
            }
        };

        let address = page_address(origin, index);
        let mut header: PageHeader = self.file.read_struct(address)?;
        node.write(&self.file, address + header.first_free() as Offset)?;
        header.set_first_free(header.first_free() + size as u16);
        header.set_actual_size(header.actual_size() + size as u16);
        self.file.write_struct(&header, address)?;

        let mut class_header = ClassHeader::read(&self.file, origin, class_index)?;
        class_header.set_nodes(class_header.nodes() + 1);
        class_header.write(&self.file, origin)?;
        Ok(())
    }

    /// Reads every stored instance of `class` back, in insertion order.
    pub fn collect_nodes(&self, class: &Arc<Class>) -> Result<Vec<Node>> {
        let canonical = class.canonical();
        let class_index = *self
            .class_map
            .get(&canonical)
            .ok_or_else(|| DbError::Runtime("Class not present in database".to_string()))?;

        let origin = self.pagetable_origin();
        let node_list = self.node_list_of(class_index);

        let mut nodes = Vec::new();
        for header in node_list.iter() {
            let header = header?;
            let base = header.address(origin);
            let mut offset = PAGE_HEADER_SIZE as Offset;
            while offset < header.first_free() as Offset {
                let node = Node::read_new(Arc::clone(class), &self.file, base + offset)?;
                offset += node.size() as Offset;
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Number of nodes stored for `class`.
    pub fn node_count(&self, class: &Class) -> Result<u64> {
        let class_index = *self
            .class_map
            .get(&class.canonical())
            .ok_or_else(|| DbError::Runtime("Class not present in database".to_string()))?;
        let header = ClassHeader::read(&self.file, self.pagetable_origin(), class_index)?;
        Ok(header.nodes())
    }

    /// One line per class, `[<index>] : <canonical>`, answered from the
    /// cache or from disk.
    pub fn print_all_classes(&self, mode: PrintMode) -> Result<String> {
        let mut out = String::new();
        match mode {
            PrintMode::Cache => {
                for (canonical, index) in &self.class_map {
                    out.push_str(&format!("[{}] : {}\n", index, canonical));
                }
            }
            PrintMode::File => {
                let origin = self.pagetable_origin();
                for header in self.class_list.iter() {
                    let header = header?;
                    let descriptor = ClassDescriptor::read(
                        &self.file,
                        header.address(origin) + header.first_free() as Offset,
                    )?;
                    out.push_str(&format!("[{}] : {}\n", header.index(), descriptor));
                }
            }
        }
        Ok(out)
    }

    /// Writes the superblock back and syncs the file. The list and
    /// allocator fields are re-read first: they write through as they
    /// mutate, and the in-memory copy must not travel back in time.
    pub fn flush(&mut self) -> Result<()> {
        self.superblock = Superblock::read(&self.file)?;
        self.superblock.write(&self.file)?;
        self.file.sync()
    }

    fn node_list_of(&self, class_index: PageIndex) -> PageList {
        let origin = self.pagetable_origin();
        PageList::new(
            Arc::clone(&self.file),
            origin,
            page_address(origin, class_index) + NODE_LIST_SENTINEL_OFFSET,
        )
    }

    fn node_target_page(&self, node_list: &PageList, size: usize) -> Result<Option<PageIndex>> {
        if node_list.is_empty()? {
            return Ok(None);
        }
        let tail = node_list.back()?;
        let header = node_list.read_page(tail)?;
        if header.free_space() >= size {
            Ok(Some(tail))
        } else {
            Ok(None)
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        info!("closing database");
        if let Err(e) = self.flush() {
            error!(error = %e, "failed to flush the superblock on close");
        }
    }
}
