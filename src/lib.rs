//! Region-based memory pool with two-tier allocation and cleanup callbacks
//!
//! A [`Pool`] serves many small, short-lived allocations by bump-carving them
//! out of a chain of pre-reserved blocks. Requests too large for the block
//! tier go straight to the global allocator and are tracked individually so
//! they can be released ahead of the rest of the pool. Cleanup callbacks can
//! be registered against the pool and run in most-recently-registered-first
//! order when the pool is reset or dropped.
//!
//! - Small allocations are reclaimed only in bulk, via [`Pool::reset`] or
//!   drop. `reset` retains block memory, so a recycled pool serves new
//!   allocations without touching the global allocator.
//! - Large allocations can additionally be released one at a time with
//!   [`Pool::free`]; freeing anything else is a documented no-op.
//! - One fixed alignment ([`pool::ALIGNMENT`]) applies to all aligned
//!   allocations; [`Pool::alloc_unaligned`] packs byte buffers tighter.
//!
//! The pool is single-threaded by design: it is neither `Send` nor `Sync`,
//! and callers that need concurrent access must wrap it in external mutual
//! exclusion.
//!
//! # Features
//!
//! - `logging` (default): structured `tracing` events on block growth, large
//!   allocations and resets
//!
//! # Example
//!
//! ```
//! use pagepool::Pool;
//!
//! fn main() -> pagepool::Result<()> {
//!     let pool = Pool::new(1024)?;
//!
//!     let p = pool.alloc(64)?;
//!     assert!(!p.is_null());
//!
//!     let zeroed = pool.alloc_zeroed(40)?;
//!     assert_eq!(unsafe { *zeroed }, 0);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod pool;
pub mod utils;

pub use error::{MemoryError, Result};
pub use pool::{CleanupHandle, Pool, PoolConfig, PoolStats, PoolStatsSnapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
