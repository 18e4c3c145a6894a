//! Statistics tracking for the memory pool

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Statistics for a memory pool
///
/// Counters use relaxed atomics so `Pool` can record through a shared
/// reference; the pool itself stays single-threaded.
#[derive(Debug, Default)]
pub struct PoolStats {
    // Block tier
    small_allocations: AtomicU64,
    small_bytes: AtomicUsize,
    blocks_allocated: AtomicUsize,
    block_bytes: AtomicUsize,

    // Large tier
    large_allocations: AtomicU64,
    large_bytes: AtomicUsize,
    frees: AtomicU64,

    // Lifecycle
    resets: AtomicU64,
    cleanups_run: AtomicU64,
}

impl PoolStats {
    /// Creates a new PoolStats instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Small allocations served from the block tier
    pub fn small_allocations(&self) -> u64 {
        self.small_allocations.load(Ordering::Relaxed)
    }

    /// Bytes requested through the block tier since the last reset
    pub fn small_bytes(&self) -> usize {
        self.small_bytes.load(Ordering::Relaxed)
    }

    /// Blocks created over the pool's lifetime
    pub fn blocks_allocated(&self) -> usize {
        self.blocks_allocated.load(Ordering::Relaxed)
    }

    /// Total capacity of all live blocks
    pub fn block_bytes(&self) -> usize {
        self.block_bytes.load(Ordering::Relaxed)
    }

    /// Allocations routed to the large path
    pub fn large_allocations(&self) -> u64 {
        self.large_allocations.load(Ordering::Relaxed)
    }

    /// Bytes currently held by live large allocations
    pub fn large_bytes(&self) -> usize {
        self.large_bytes.load(Ordering::Relaxed)
    }

    /// Targeted releases of large allocations
    pub fn frees(&self) -> u64 {
        self.frees.load(Ordering::Relaxed)
    }

    /// Times the pool was reset
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    /// Cleanup handlers invoked
    pub fn cleanups_run(&self) -> u64 {
        self.cleanups_run.load(Ordering::Relaxed)
    }

    /// Block-tier utilization ratio (0..1)
    pub fn utilization_ratio(&self) -> f64 {
        let capacity = self.block_bytes() as f64;
        if capacity == 0.0 {
            0.0
        } else {
            self.small_bytes() as f64 / capacity
        }
    }

    // Internal update methods

    pub(crate) fn record_small_alloc(&self, bytes: usize) {
        self.small_allocations.fetch_add(1, Ordering::Relaxed);
        self.small_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_block(&self, bytes: usize) {
        self.blocks_allocated.fetch_add(1, Ordering::Relaxed);
        self.block_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_large_alloc(&self, bytes: usize) {
        self.large_allocations.fetch_add(1, Ordering::Relaxed);
        self.large_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self, bytes: usize) {
        self.frees.fetch_add(1, Ordering::Relaxed);
        self.large_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
        self.small_bytes.store(0, Ordering::Relaxed);
        self.large_bytes.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_cleanup_run(&self) {
        self.cleanups_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Creates a snapshot of current statistics
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            small_allocations: self.small_allocations(),
            small_bytes: self.small_bytes(),
            blocks_allocated: self.blocks_allocated(),
            block_bytes: self.block_bytes(),
            large_allocations: self.large_allocations(),
            large_bytes: self.large_bytes(),
            frees: self.frees(),
            resets: self.resets(),
            cleanups_run: self.cleanups_run(),
            utilization_ratio: self.utilization_ratio(),
        }
    }
}

/// Immutable snapshot of pool statistics
#[derive(Debug, Clone)]
pub struct PoolStatsSnapshot {
    /// Small allocations served from the block tier
    pub small_allocations: u64,
    /// Bytes requested through the block tier since the last reset
    pub small_bytes: usize,
    /// Blocks created over the pool's lifetime
    pub blocks_allocated: usize,
    /// Total capacity of all live blocks
    pub block_bytes: usize,
    /// Allocations routed to the large path
    pub large_allocations: u64,
    /// Bytes currently held by live large allocations
    pub large_bytes: usize,
    /// Targeted releases of large allocations
    pub frees: u64,
    /// Times the pool was reset
    pub resets: u64,
    /// Cleanup handlers invoked
    pub cleanups_run: u64,
    /// Block-tier utilization ratio (0..1)
    pub utilization_ratio: f64,
}

impl std::fmt::Display for PoolStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pool Statistics:")?;
        writeln!(f, "  Block tier:")?;
        writeln!(f, "    Allocations: {}", self.small_allocations)?;
        writeln!(f, "    Bytes requested: {}", self.small_bytes)?;
        writeln!(f, "    Blocks: {}", self.blocks_allocated)?;
        writeln!(f, "    Block capacity: {} bytes", self.block_bytes)?;
        writeln!(f, "    Utilization: {:.1}%", self.utilization_ratio * 100.0)?;
        writeln!(f, "  Large tier:")?;
        writeln!(f, "    Allocations: {}", self.large_allocations)?;
        writeln!(f, "    Live bytes: {}", self.large_bytes)?;
        writeln!(f, "    Frees: {}", self.frees)?;
        writeln!(f, "  Lifecycle:")?;
        writeln!(f, "    Resets: {}", self.resets)?;
        writeln!(f, "    Cleanups run: {}", self.cleanups_run)?;
        Ok(())
    }
}
