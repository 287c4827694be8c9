//! Tracked raw allocations for the basic and buffer suites.

use super::error::SuiteError;
use std::alloc::Layout;
use std::collections::HashMap;
use std::ptr::NonNull;

const BLOCK_ALIGN: usize = 16;

struct Block {
    layout: Layout,
    size: usize,
}

/// Live blocks keyed by address.
///
/// Dropping the table frees every block still live.
#[derive(Default)]
pub(crate) struct BlockTable {
    blocks: HashMap<usize, Block>,
    used: usize,
    limit: Option<usize>,
}

impl BlockTable {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            blocks: HashMap::new(),
            used: 0,
            limit,
        }
    }

    /// Allocate `size` bytes, or `None` when memory (or the configured
    /// ceiling) does not allow it.
    pub(crate) fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if self.limit.is_some_and(|limit| self.used.saturating_add(size) > limit) {
            return None;
        }
        let layout = Layout::from_size_align(size.max(1), BLOCK_ALIGN).ok()?;
        // SAFETY: the layout has a non-zero size.
        let ptr = NonNull::new(unsafe { std::alloc::alloc(layout) })?;
        self.blocks.insert(ptr.as_ptr() as usize, Block { layout, size });
        self.used += size;
        Some(ptr)
    }

    /// Grow or shrink a block, keeping its contents.
    pub(crate) fn reallocate(&mut self, ptr: *mut u8, size: usize) -> Result<NonNull<u8>, SuiteError> {
        let old = self
            .blocks
            .get(&(ptr as usize))
            .ok_or(SuiteError::BadParameter("unknown block"))?;
        if self
            .limit
            .is_some_and(|limit| (self.used - old.size).saturating_add(size) > limit)
        {
            return Err(SuiteError::OutOfMemory);
        }
        let (old_layout, old_size) = (old.layout, old.size);
        let layout = Layout::from_size_align(size.max(1), BLOCK_ALIGN)
            .map_err(|_| SuiteError::OutOfMemory)?;
        // SAFETY: `ptr` was allocated here with `old_layout`; the new size
        // is non-zero and fits the alignment.
        let moved = unsafe { std::alloc::realloc(ptr, old_layout, layout.size()) };
        let moved = NonNull::new(moved).ok_or(SuiteError::OutOfMemory)?;
        self.blocks.remove(&(ptr as usize));
        self.blocks.insert(moved.as_ptr() as usize, Block { layout, size });
        self.used = self.used - old_size + size;
        Ok(moved)
    }

    /// Free a block. Returns `false` for addresses not issued here.
    pub(crate) fn free(&mut self, ptr: *mut u8) -> bool {
        match self.blocks.remove(&(ptr as usize)) {
            Some(block) => {
                // SAFETY: allocated here with this layout and now untracked.
                unsafe { std::alloc::dealloc(ptr, block.layout) };
                self.used -= block.size;
                true
            }
            None => false,
        }
    }

    /// Requested size of a live block.
    pub(crate) fn size_of(&self, ptr: *const u8) -> Option<usize> {
        self.blocks.get(&(ptr as usize)).map(|b| b.size)
    }

    /// Bytes still available to new blocks.
    pub(crate) fn available(&self) -> u64 {
        match self.limit {
            Some(limit) => limit.saturating_sub(self.used) as u64,
            None => system_available_memory(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }
}

impl Drop for BlockTable {
    fn drop(&mut self) {
        if !self.blocks.is_empty() {
            tracing::debug!("freeing {} blocks the plugin left allocated", self.blocks.len());
        }
        for (addr, block) in self.blocks.drain() {
            // SAFETY: every tracked block was allocated with its layout.
            unsafe { std::alloc::dealloc(addr as *mut u8, block.layout) };
        }
    }
}

/// `MemAvailable` from `/proc/meminfo`, in bytes.
fn system_available_memory() -> u64 {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|info| {
            info.lines()
                .find_map(|line| line.strip_prefix("MemAvailable:"))
                .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
        })
        .map(|kib| kib.saturating_mul(1024))
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_and_reuse() {
        let mut table = BlockTable::new(Some(100));
        let a = table.allocate(60).unwrap();
        assert!(table.allocate(60).is_none());
        assert_eq!(table.available(), 40);
        assert_eq!(table.size_of(a.as_ptr()), Some(60));
        assert!(table.free(a.as_ptr()));
        assert!(!table.free(a.as_ptr()));
        assert!(table.allocate(100).is_some());
    }

    #[test]
    fn test_reallocate_keeps_contents() {
        let mut table = BlockTable::new(None);
        let a = table.allocate(4).unwrap();
        unsafe { a.as_ptr().copy_from_nonoverlapping(b"abcd".as_ptr(), 4) };
        let b = table.reallocate(a.as_ptr(), 4096).unwrap();
        assert_eq!(unsafe { std::slice::from_raw_parts(b.as_ptr(), 4) }, b"abcd");
        assert_eq!(table.size_of(b.as_ptr()), Some(4096));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_zero_sized_block() {
        let mut table = BlockTable::new(None);
        let a = table.allocate(0).unwrap();
        assert_eq!(table.size_of(a.as_ptr()), Some(0));
        assert!(table.free(a.as_ptr()));
    }
}
