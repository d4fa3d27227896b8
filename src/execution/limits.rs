//! Resource Limits Module
//!
//! Provides resource limit enforcement for query execution:
//! - Memory usage limits
//! - Result set size limits
//! - Intermediate result limits
//!
//! ## Design
//!
//! Uses cooperative checking - query execution code should periodically
//! call `check_*` methods to verify limits are not exceeded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Resource limit error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    /// Memory limit exceeded
    #[error("Memory limit exceeded: used {used} bytes, limit {limit} bytes")]
    MemoryLimitExceeded { limit: usize, used: usize },

    /// Result size limit exceeded
    #[error("Result size limit exceeded: {actual} tuples, limit {limit} tuples")]
    ResultSizeLimitExceeded { limit: usize, actual: usize },

    /// Intermediate result size exceeded
    #[error(
        "Intermediate result limit exceeded at '{stage}': {actual} tuples, limit {limit} tuples"
    )]
    IntermediateResultExceeded {
        limit: usize,
        actual: usize,
        stage: String,
    },

    /// Row width (tuple arity) exceeded
    #[error("Row width limit exceeded: {actual} columns, limit {limit} columns")]
    RowWidthExceeded { limit: usize, actual: usize },
}

/// Resource limits configuration
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum memory usage in bytes (None = unlimited)
    pub max_memory_bytes: Option<usize>,

    /// Maximum number of tuples in final result (None = unlimited)
    pub max_result_size: Option<usize>,

    /// Maximum number of tuples in intermediate results (None = unlimited)
    pub max_intermediate_size: Option<usize>,

    /// Maximum row width (number of columns per tuple)
    pub max_row_width: Option<usize>,

    /// Maximum recursion depth for fixpoint iterations
    pub max_recursion_depth: Option<usize>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        ResourceLimits {
            max_memory_bytes: None,
            max_result_size: None,
            max_intermediate_size: None,
            max_row_width: None,
            max_recursion_depth: None,
        }
    }
}

impl ResourceLimits {
    pub fn check_result_size(&self, actual: usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.max_result_size {
            if actual > limit {
                return Err(ResourceError::ResultSizeLimitExceeded { limit, actual });
            }
        }
        Ok(())
    }

    pub fn check_intermediate_size(&self, stage: &str, actual: usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.max_intermediate_size {
            if actual > limit {
                return Err(ResourceError::IntermediateResultExceeded {
                    limit,
                    actual,
                    stage: stage.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn check_row_width(&self, actual: usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.max_row_width {
            if actual > limit {
                return Err(ResourceError::RowWidthExceeded { limit, actual });
            }
        }
        Ok(())
    }
}

/// Shared counter for cooperative memory accounting across the lowering
/// pass. Cloning shares the same underlying counter.
#[derive(Clone)]
pub struct MemoryTracker {
    used: Arc<AtomicUsize>,
    limit: Option<usize>,
}

impl MemoryTracker {
    pub fn new(limit: Option<usize>) -> Self {
        MemoryTracker {
            used: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Records an allocation of `bytes` and checks it against the limit.
    pub fn allocate(&self, bytes: usize) -> Result<(), ResourceError> {
        let used = self.used.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if let Some(limit) = self.limit {
            if used > limit {
                return Err(ResourceError::MemoryLimitExceeded { limit, used });
            }
        }
        Ok(())
    }

    pub fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }
}
