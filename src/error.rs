//! Error types for pool operations

use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Memory pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The global allocator could not provide backing memory
    #[error("out of memory: requested {requested} bytes")]
    OutOfMemory {
        /// Bytes requested from the global allocator
        requested: usize,
    },

    /// A configuration value failed validation
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What was wrong with the configuration
        message: String,
    },

    /// A cleanup handle was used after the pool it came from was reset
    #[error("cleanup handle predates the last pool reset")]
    StaleHandle,
}

impl MemoryError {
    /// Create an out of memory error
    pub fn out_of_memory(requested: usize) -> Self {
        Self::OutOfMemory { requested }
    }

    /// Create a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = MemoryError::out_of_memory(4096);
        assert_eq!(err.to_string(), "out of memory: requested 4096 bytes");

        let err = MemoryError::invalid_config("block size must be greater than 0");
        assert!(err.to_string().contains("block size"));
    }
}
