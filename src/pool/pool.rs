//! Two-tier memory pool over a chain of fixed-capacity blocks
//!
//! # Safety
//!
//! This module implements a single-threaded region pool:
//! - RefCell for the owning containers (runtime borrow checking)
//! - Cell for the scan cursor and handle epoch (no synchronization)
//! - Raw pointers handed to callers stay valid until reset or drop
//!
//! ## Invariants
//!
//! - `current` always indexes a live block; it only moves forward between
//!   resets
//! - Small allocations never overlap (each block's cursor moves forward
//!   monotonically)
//! - Large allocations never come from block memory
//! - Cleanup handlers run at most once per registration, before any block
//!   memory is rewound or released
//! - A failed allocation leaves the pool consistent and reusable
//!
//! ## Memory Management
//!
//! - Blocks and large regions come from `std::alloc` with `Layout`
//! - Large regions are released on targeted free, reset, or drop
//! - Block regions are released only on drop; reset rewinds and retains them
//!
//! ## Not Thread-Safe
//!
//! - Uses Cell/RefCell instead of atomics
//! - No Send/Sync implementations
//! - Callers needing concurrent access must provide external mutual exclusion

use std::alloc::{Layout, alloc, dealloc};
use std::cell::{Cell, RefCell};
use std::ptr::{self, NonNull};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

use super::block::Block;
use super::stats::PoolStats;
use super::{ALIGNMENT, PoolConfig};
use crate::error::{MemoryError, Result};

/// Failed-request count past which the scan cursor stops revisiting a block.
/// Once a block has turned away more requests than this it is close enough to
/// full that rescanning it is wasted work.
const BLOCK_RETIRE_THRESHOLD: u32 = 4;

/// How many of the most recent large records are checked for a reusable
/// tombstone slot before a fresh record is appended.
const LARGE_SLOT_SCAN: usize = 4;

/// Heap region serving one oversized allocation.
///
/// Freed records keep their slot as a tombstone instead of being unlinked, so
/// releasing is O(1) mutation and other records never move.
struct LargeAlloc {
    ptr: Option<NonNull<u8>>,
    size: usize,
}

impl LargeAlloc {
    /// Releases the region and tombstones the record. No-op if already freed.
    fn release(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: Releasing a large region.
            // - ptr was allocated in Pool::alloc_large with this exact layout
            // - take() guarantees this runs once per live region
            unsafe {
                dealloc(
                    ptr.as_ptr(),
                    Layout::from_size_align_unchecked(self.size, ALIGNMENT),
                );
            }
        }
    }
}

/// Registered teardown callback and its inline payload.
struct Cleanup {
    handler: Option<Box<dyn FnOnce(*mut u8)>>,
    data: *mut u8,
}

/// Token for a cleanup registered with [`Pool::add_cleanup`]
///
/// The handle exposes the payload address so the caller can populate it, and
/// is passed back to [`Pool::set_cleanup_handler`] to install the callback.
/// Handles are invalidated by [`Pool::reset`]; installing through a stale
/// handle reports [`MemoryError::StaleHandle`].
#[derive(Debug, Clone)]
pub struct CleanupHandle {
    slot: usize,
    epoch: u64,
    data: *mut u8,
}

impl CleanupHandle {
    /// Address of the payload carved at registration, null when the payload
    /// size was zero. The pool never reads or interprets the payload.
    pub fn data(&self) -> *mut u8 {
        self.data
    }
}

/// Region-based memory pool with two-tier allocation
///
/// Requests up to [`Pool::small_max`] bytes are bump-carved from fixed
/// capacity blocks; anything larger goes straight to the global allocator and
/// is tracked so it can be released individually with [`Pool::free`].
/// [`Pool::reset`] runs registered cleanups, releases large allocations and
/// rewinds every block for reuse without returning block memory.
pub struct Pool {
    blocks: RefCell<Vec<Block>>,
    current: Cell<usize>,
    large: RefCell<Vec<LargeAlloc>>,
    cleanups: RefCell<Vec<Cleanup>>,
    epoch: Cell<u64>,
    small_max: usize,
    config: PoolConfig,
    stats: PoolStats,
}

impl Pool {
    /// Creates a pool with one block of capacity `size` and default tuning.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_config(PoolConfig::default().with_block_size(size))
    }

    /// Creates a pool with the given configuration.
    ///
    /// The initial block is allocated eagerly, so a freshly constructed pool
    /// serves block-tier requests without touching the global allocator.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let first = Block::new(config.block_size)?;
        let small_max = config.max_small_alloc.min(config.block_size);

        let stats = PoolStats::new();
        if config.track_stats {
            stats.record_block(first.capacity());
        }

        Ok(Self {
            blocks: RefCell::new(vec![first]),
            current: Cell::new(0),
            large: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            epoch: Cell::new(0),
            small_max,
            config,
            stats,
        })
    }

    /// Allocates `size` bytes aligned to [`ALIGNMENT`].
    ///
    /// The returned region is owned by the pool and stays valid until
    /// [`Pool::reset`] or drop; it never overlaps another live allocation
    /// from this pool. Requests above [`Pool::small_max`] are served from the
    /// large path.
    #[must_use = "allocated memory must be used"]
    pub fn alloc(&self, size: usize) -> Result<*mut u8> {
        if size <= self.small_max {
            self.alloc_small(size, true)
        } else {
            self.alloc_large(size)
        }
    }

    /// Allocates `size` bytes without alignment padding.
    ///
    /// Packs tighter than [`Pool::alloc`]; meant for byte buffers where
    /// alignment is immaterial.
    #[must_use = "allocated memory must be used"]
    pub fn alloc_unaligned(&self, size: usize) -> Result<*mut u8> {
        if size <= self.small_max {
            self.alloc_small(size, false)
        } else {
            self.alloc_large(size)
        }
    }

    /// Allocates `size` bytes aligned to [`ALIGNMENT`] and zero-filled.
    #[must_use = "allocated memory must be used"]
    pub fn alloc_zeroed(&self, size: usize) -> Result<*mut u8> {
        let ptr = self.alloc(size)?;

        // SAFETY: Zeroing the freshly carved region.
        // - ptr points to at least `size` writable bytes (just allocated)
        // - The region is not yet visible to the caller
        unsafe {
            ptr::write_bytes(ptr, 0, size);
        }

        Ok(ptr)
    }

    /// Releases one large allocation by address.
    ///
    /// Returns `true` when `ptr` matched a live large allocation and its
    /// region was released. Any other address (a block-tier allocation, an
    /// already freed region, a foreign pointer) is a no-op returning `false`;
    /// freeing is advisory and never corrupts the pool.
    pub fn free(&self, ptr: *mut u8) -> bool {
        if ptr.is_null() {
            return false;
        }

        let mut large = self.large.borrow_mut();
        for record in large.iter_mut().rev() {
            if record.ptr.is_some_and(|p| p.as_ptr() == ptr) {
                let size = record.size;
                record.release();
                if self.config.track_stats {
                    self.stats.record_free(size);
                }
                #[cfg(feature = "logging")]
                trace!(size, "released large allocation");
                return true;
            }
        }

        #[cfg(feature = "logging")]
        trace!("free of untracked address ignored");
        false
    }

    /// Registers a cleanup and carves `data_size` bytes for its payload.
    ///
    /// The returned handle exposes the payload address (null when
    /// `data_size` is zero). The cleanup does nothing until a handler is
    /// installed with [`Pool::set_cleanup_handler`]. Handlers run in
    /// most-recently-registered-first order on reset or drop.
    pub fn add_cleanup(&self, data_size: usize) -> Result<CleanupHandle> {
        let data = if data_size == 0 {
            ptr::null_mut()
        } else {
            self.alloc(data_size)?
        };

        let mut cleanups = self.cleanups.borrow_mut();
        let slot = cleanups.len();
        cleanups.push(Cleanup {
            handler: None,
            data,
        });

        Ok(CleanupHandle {
            slot,
            epoch: self.epoch.get(),
            data,
        })
    }

    /// Installs the handler for a registered cleanup.
    ///
    /// The handler receives the payload address and runs at most once, at the
    /// next reset or at drop. It must not unwind and must not re-enter the
    /// pool it is registered on.
    ///
    /// # Errors
    ///
    /// [`MemoryError::StaleHandle`] if the pool was reset after the handle
    /// was issued.
    pub fn set_cleanup_handler<F>(&self, handle: &CleanupHandle, handler: F) -> Result<()>
    where
        F: FnOnce(*mut u8) + 'static,
    {
        if handle.epoch != self.epoch.get() {
            return Err(MemoryError::StaleHandle);
        }

        // Slots are only appended within an epoch, so the index is live.
        self.cleanups.borrow_mut()[handle.slot].handler = Some(Box::new(handler));
        Ok(())
    }

    /// Resets the pool for reuse without returning block memory.
    ///
    /// Runs every installed cleanup handler (most recently registered first,
    /// while block memory is still intact), releases every live large
    /// allocation, rewinds every block and moves the scan cursor back to the
    /// first block. Outstanding allocation pointers and cleanup handles are
    /// invalidated.
    pub fn reset(&mut self) {
        #[cfg(feature = "logging")]
        debug!("resetting pool");

        self.run_cleanups();
        self.release_large();

        let mut blocks = self.blocks.borrow_mut();
        for block in blocks.iter_mut() {
            if self.config.zero_on_reset {
                block.zero();
            }
            block.rewind();
        }
        drop(blocks);

        self.current.set(0);
        self.epoch.set(self.epoch.get() + 1);

        if self.config.track_stats {
            self.stats.record_reset();
        }
    }

    /// Largest request the block tier will serve; anything bigger takes the
    /// large path.
    pub fn small_max(&self) -> usize {
        self.small_max
    }

    /// Number of blocks currently backing the pool.
    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Total capacity of all blocks, in bytes.
    pub fn capacity(&self) -> usize {
        self.blocks.borrow().iter().map(Block::capacity).sum()
    }

    /// Returns reference to statistics.
    ///
    /// Counters stay at zero unless [`PoolConfig::track_stats`] is enabled.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    fn alloc_small(&self, size: usize, aligned: bool) -> Result<*mut u8> {
        let mut blocks = self.blocks.borrow_mut();

        for idx in self.current.get()..blocks.len() {
            if let Some(ptr) = blocks[idx].try_alloc(size, aligned) {
                self.retire_exhausted(&blocks);
                if self.config.track_stats {
                    self.stats.record_small_alloc(size);
                }
                return Ok(ptr);
            }
        }

        // No existing block fits: grow the chain. A fresh block always
        // satisfies the request since its capacity is at least `size`.
        let capacity = self.config.block_size.max(size);
        let mut block = Block::new(capacity)?;
        let ptr = block
            .try_alloc(size, aligned)
            .ok_or_else(|| MemoryError::out_of_memory(size))?;

        #[cfg(feature = "logging")]
        debug!(capacity, blocks = blocks.len() + 1, "grew pool block chain");

        if self.config.track_stats {
            self.stats.record_block(capacity);
            self.stats.record_small_alloc(size);
        }

        blocks.push(block);
        self.retire_exhausted(&blocks);
        Ok(ptr)
    }

    fn alloc_large(&self, size: usize) -> Result<*mut u8> {
        let layout = Layout::from_size_align(size, ALIGNMENT)
            .map_err(|_| MemoryError::out_of_memory(size))?;

        // SAFETY: Allocating a large region via the global allocator.
        // - layout has non-zero size (size > small_max >= 1)
        // - alloc returns null on failure (handled below)
        let raw = unsafe { alloc(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| MemoryError::out_of_memory(size))?;

        #[cfg(feature = "logging")]
        trace!(size, "large allocation");

        let mut large = self.large.borrow_mut();
        let slot = large
            .iter()
            .rev()
            .take(LARGE_SLOT_SCAN)
            .position(|record| record.ptr.is_none())
            .map(|rev_idx| large.len() - 1 - rev_idx);
        match slot {
            Some(idx) => {
                let record = &mut large[idx];
                record.ptr = Some(ptr);
                record.size = size;
            }
            None => large.push(LargeAlloc {
                ptr: Some(ptr),
                size,
            }),
        }

        if self.config.track_stats {
            self.stats.record_large_alloc(size);
        }

        Ok(ptr.as_ptr())
    }

    /// Moves the scan cursor past blocks that have turned away too many
    /// requests, so future scans start later in the chain. Bounds scan cost
    /// amortized over many allocations.
    fn retire_exhausted(&self, blocks: &[Block]) {
        let mut current = self.current.get();
        while current + 1 < blocks.len() && blocks[current].failed() > BLOCK_RETIRE_THRESHOLD {
            current += 1;
        }
        self.current.set(current);
    }

    /// Runs every installed handler, most recently registered first, then
    /// clears the list. Block memory is untouched here so handlers can still
    /// read their payloads.
    fn run_cleanups(&mut self) {
        let mut cleanups = self.cleanups.borrow_mut();
        for record in cleanups.iter_mut().rev() {
            if let Some(handler) = record.handler.take() {
                handler(record.data);
                if self.config.track_stats {
                    self.stats.record_cleanup_run();
                }
            }
        }
        cleanups.clear();
    }

    /// Releases every live large region and clears the list.
    fn release_large(&mut self) {
        let mut large = self.large.borrow_mut();
        for record in large.iter_mut() {
            record.release();
        }
        large.clear();
    }

    #[cfg(test)]
    fn current_block(&self) -> usize {
        self.current.get()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.run_cleanups();
        self.release_large();
        // Block regions are released by each Block's own Drop.
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::utils::is_aligned_ptr;

    #[test]
    fn basic_allocation() {
        let pool = Pool::new(1024).unwrap();
        let ptr = pool.alloc(64).unwrap();
        assert!(!ptr.is_null());
        assert!(is_aligned_ptr(ptr, ALIGNMENT));
    }

    #[test]
    fn allocations_stay_inside_blocks() {
        let pool = Pool::new(256).unwrap();

        let ptrs: Vec<_> = (0..16).map(|_| pool.alloc(48).unwrap()).collect();

        let blocks = pool.blocks.borrow();
        for ptr in ptrs {
            assert!(blocks.iter().any(|b| b.contains(ptr)));
        }
    }

    #[test]
    fn small_allocations_do_not_overlap() {
        let pool = Pool::new(512).unwrap();

        let mut regions = Vec::new();
        for size in [8usize, 24, 3, 64, 1, 40] {
            let ptr = pool.alloc(size).unwrap() as usize;
            regions.push((ptr, ptr + size));
        }

        for (i, &(a_start, a_end)) in regions.iter().enumerate() {
            for &(b_start, b_end) in &regions[i + 1..] {
                assert!(a_end <= b_start || b_end <= a_start);
            }
        }
    }

    #[test]
    fn unaligned_packs_tight() {
        let pool = Pool::new(1024).unwrap();

        let a = pool.alloc_unaligned(3).unwrap();
        let b = pool.alloc_unaligned(3).unwrap();
        assert_eq!(b as usize - a as usize, 3);
    }

    #[test]
    fn zeroed_allocation() {
        let pool = Pool::new(1024).unwrap();

        let ptr = pool.alloc_zeroed(40).unwrap();
        // SAFETY: ptr points to 40 freshly allocated bytes.
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 40) };
        assert!(bytes.iter().all(|&b| b == 0));

        // Zero-size requests are valid too.
        let empty = pool.alloc_zeroed(0).unwrap();
        assert!(!empty.is_null());
    }

    #[test]
    fn oversized_requests_take_large_path() {
        let pool = Pool::with_config(PoolConfig::default().with_stats(true)).unwrap();

        let ptr = pool.alloc(pool.small_max() + 1).unwrap();
        assert_eq!(pool.stats().large_allocations(), 1);
        assert_eq!(pool.block_count(), 1);

        assert!(pool.free(ptr));
        assert!(!pool.free(ptr));
    }

    #[test]
    fn small_max_capped_by_block_capacity() {
        let pool = Pool::new(256).unwrap();
        assert_eq!(pool.small_max(), 256);

        // A request between the block capacity and the page bound must not
        // grow the block chain.
        let _ = pool.alloc(1000).unwrap();
        assert_eq!(pool.block_count(), 1);
    }

    #[test]
    fn block_chain_grows_on_demand() {
        let pool = Pool::new(64).unwrap();

        let _ = pool.alloc(64).unwrap();
        assert_eq!(pool.block_count(), 1);

        let _ = pool.alloc(64).unwrap();
        assert_eq!(pool.block_count(), 2);
    }

    #[test]
    fn scan_cursor_retires_exhausted_blocks() {
        let pool = Pool::new(64).unwrap();

        // Each full-block request fails every existing block before growing
        // the chain, so the first block accumulates failures until the
        // cursor moves past it.
        for _ in 0..8 {
            let _ = pool.alloc(64).unwrap();
        }

        assert!(pool.current_block() >= 1);
    }

    #[test]
    fn free_of_foreign_address_is_noop() {
        let pool = Pool::new(1024).unwrap();
        let live = pool.alloc(64).unwrap();
        // SAFETY: live points to 64 writable pool-owned bytes.
        unsafe { ptr::write_bytes(live, 0x5a, 64) };

        let mut local = 0u64;
        assert!(!pool.free(&raw mut local as *mut u8));
        assert!(!pool.free(live)); // block-tier address, not a large one
        assert!(!pool.free(ptr::null_mut()));

        // SAFETY: live is still a valid pool allocation.
        let bytes = unsafe { std::slice::from_raw_parts(live, 64) };
        assert!(bytes.iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn large_slot_reuse_keeps_list_short() {
        let pool = Pool::new(64).unwrap();
        let big = pool.small_max() + 1;

        for _ in 0..10 {
            let ptr = pool.alloc(big).unwrap();
            assert!(pool.free(ptr));
        }

        // Every allocation after the first reuses the tombstoned slot.
        assert_eq!(pool.large.borrow().len(), 1);
    }

    #[test]
    fn reset_retains_blocks_and_reuses_memory() {
        let mut pool = Pool::new(64).unwrap();

        let first = pool.alloc(64).unwrap();
        let _ = pool.alloc(64).unwrap();
        let blocks_before = pool.block_count();
        assert!(blocks_before >= 2);

        pool.reset();
        assert_eq!(pool.block_count(), blocks_before);
        assert_eq!(pool.current_block(), 0);

        let again = pool.alloc(64).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn reset_releases_large_allocations() {
        let mut pool = Pool::with_config(
            PoolConfig::default()
                .with_block_size(64)
                .with_stats(true),
        )
        .unwrap();

        let big = pool.small_max() + 1;
        let ptr = pool.alloc(big).unwrap();

        pool.reset();
        assert_eq!(pool.stats().large_bytes(), 0);

        // The old address is no longer tracked.
        assert!(!pool.free(ptr));
    }

    #[test]
    fn cleanups_run_reverse_order_on_drop() {
        let order = Rc::new(RefCell::new(Vec::new()));

        {
            let pool = Pool::new(1024).unwrap();
            for id in 0..3u32 {
                let handle = pool.add_cleanup(0).unwrap();
                let order = Rc::clone(&order);
                pool.set_cleanup_handler(&handle, move |_| order.borrow_mut().push(id))
                    .unwrap();
            }
        }

        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn cleanup_payload_reaches_handler() {
        let seen = Rc::new(RefCell::new(None));

        {
            let pool = Pool::new(1024).unwrap();
            let handle = pool.add_cleanup(size_of::<u32>()).unwrap();
            let payload = handle.data() as *mut u32;
            // SAFETY: the payload is a pool-owned, ALIGNMENT-aligned region
            // of at least four bytes.
            unsafe { payload.write(42) };

            let seen = Rc::clone(&seen);
            pool.set_cleanup_handler(&handle, move |data| {
                // SAFETY: handlers run before block memory is released.
                *seen.borrow_mut() = Some(unsafe { *(data as *const u32) });
            })
            .unwrap();
        }

        assert_eq!(*seen.borrow(), Some(42));
    }

    #[test]
    fn reset_runs_cleanups_exactly_once() {
        let runs = Rc::new(RefCell::new(0));

        let mut pool = Pool::new(1024).unwrap();
        let handle = pool.add_cleanup(0).unwrap();
        let counter = Rc::clone(&runs);
        pool.set_cleanup_handler(&handle, move |_| *counter.borrow_mut() += 1)
            .unwrap();

        pool.reset();
        assert_eq!(*runs.borrow(), 1);

        drop(pool);
        assert_eq!(*runs.borrow(), 1);
    }

    #[test]
    fn uninstalled_cleanup_is_skipped() {
        let mut pool = Pool::new(1024).unwrap();
        let _handle = pool.add_cleanup(16).unwrap();
        pool.reset();
        drop(pool);
    }

    #[test]
    fn stale_handle_is_rejected() {
        let mut pool = Pool::new(1024).unwrap();
        let handle = pool.add_cleanup(0).unwrap();
        pool.reset();

        let err = pool.set_cleanup_handler(&handle, |_| {}).unwrap_err();
        assert_eq!(err, MemoryError::StaleHandle);
    }

    #[test]
    fn pool_survives_failed_allocation() {
        let pool = Pool::new(1024).unwrap();

        assert!(pool.alloc(usize::MAX / 2 + 1).is_err());

        let ptr = pool.alloc(64).unwrap();
        assert!(!ptr.is_null());
    }

    #[test]
    fn unused_pool_drops_cleanly() {
        let pool = Pool::new(64).unwrap();
        drop(pool);

        let mut pool = Pool::new(64).unwrap();
        pool.reset();
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(Pool::new(0).is_err());
    }
}
