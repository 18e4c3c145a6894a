//! Region-based pool allocation
//!
//! This module provides the two-tier memory pool and its supporting types:
//!
//! - [`Pool`]: bump-carves small allocations out of fixed-capacity blocks and
//!   tracks oversized allocations individually
//! - [`PoolConfig`]: construction-time tuning (block size, routing threshold,
//!   statistics, reset zeroing)
//! - [`PoolStats`] / [`PoolStatsSnapshot`]: allocation counters
//! - [`CleanupHandle`]: token for a registered teardown callback
//!
//! Basic usage:
//!
//! ```
//! use pagepool::pool::{Pool, PoolConfig};
//!
//! let pool = Pool::with_config(PoolConfig::default().with_block_size(4096)).unwrap();
//! let ptr = pool.alloc(128).unwrap();
//! assert!(!ptr.is_null());
//! ```

use crate::error::{MemoryError, Result};

mod block;
mod pool;
mod stats;

pub use self::pool::{CleanupHandle, Pool};
pub use self::stats::{PoolStats, PoolStatsSnapshot};

/// Fixed alignment applied to all aligned allocations: the platform word size.
pub const ALIGNMENT: usize = std::mem::size_of::<usize>();

/// One physical page.
const PAGE_SIZE: usize = 4096;

/// Largest request the block tier will ever serve. Anything bigger is routed
/// to the large-allocation path no matter how much block space is free, so a
/// single oversized request cannot starve the arena.
pub const MAX_SMALL_ALLOC: usize = PAGE_SIZE - 1;

/// Default capacity of pool blocks when none is configured.
pub const DEFAULT_BLOCK_SIZE: usize = PAGE_SIZE;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Capacity of the initial block and the minimum capacity of blocks
    /// created on demand
    pub block_size: usize,
    /// Requested upper bound for block-tier routing; the effective bound is
    /// additionally capped by the first block's capacity
    pub max_small_alloc: usize,
    /// Whether to track allocation statistics
    pub track_stats: bool,
    /// Whether to zero block memory on reset (debugging aid for catching
    /// use-after-reset)
    pub zero_on_reset: bool,
}

impl PoolConfig {
    /// Creates new config with default values
    pub fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_small_alloc: MAX_SMALL_ALLOC,
            track_stats: cfg!(debug_assertions),
            zero_on_reset: false,
        }
    }

    /// Production configuration - no stats overhead, no zeroing
    pub fn production() -> Self {
        Self {
            block_size: 16 * 1024,
            max_small_alloc: MAX_SMALL_ALLOC,
            track_stats: false,
            zero_on_reset: false,
        }
    }

    /// Debug configuration - full statistics, zero on reset
    pub fn debug() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_small_alloc: MAX_SMALL_ALLOC,
            track_stats: true,
            zero_on_reset: true,
        }
    }

    /// Sets block capacity
    #[must_use = "builder methods must be chained or built"]
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the requested block-tier routing bound
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_small_alloc(mut self, max: usize) -> Self {
        self.max_small_alloc = max;
        self
    }

    /// Enables/disables statistics tracking
    #[must_use = "builder methods must be chained or built"]
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.track_stats = enabled;
        self
    }

    /// Enables/disables zeroing block memory on reset
    #[must_use = "builder methods must be chained or built"]
    pub fn with_zero_on_reset(mut self, enabled: bool) -> Self {
        self.zero_on_reset = enabled;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(MemoryError::invalid_config(
                "block size must be greater than 0",
            ));
        }

        if self.max_small_alloc == 0 {
            return Err(MemoryError::invalid_config(
                "small-allocation bound must be greater than 0",
            ));
        }

        if self.max_small_alloc > MAX_SMALL_ALLOC {
            return Err(MemoryError::invalid_config(
                "small-allocation bound must not exceed MAX_SMALL_ALLOC",
            ));
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}
