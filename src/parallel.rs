//! Worker pool configuration
//!
//! Batch runs use a dedicated Rayon pool built from a [`ParallelConfig`], never the
//! global one, so several batches can run side by side with different sizes.

use crate::errors::{Result, SubsetError};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Configuration for parallel processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Worker count; `None` means one worker per CPU core
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Worker count the pool will be built with
    pub fn workers(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get)
    }

    /// Build a dedicated thread pool.
    pub fn build_pool(&self) -> Result<ThreadPool> {
        let workers = self.workers();
        if workers == 0 {
            return Err(SubsetError::config("Worker count must be at least 1"));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("nc-subset-worker-{idx}"))
            .build()
            .map_err(|e| {
                SubsetError::ThreadPool(format!(
                    "Failed to initialize thread pool with {workers} threads: {e}"
                ))
            })?;
        debug!(workers, "built worker pool");
        Ok(pool)
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_every_core() {
        assert_eq!(ParallelConfig::default().workers(), num_cpus::get());
        assert_eq!(ParallelConfig::with_threads(3).workers(), 3);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = ParallelConfig::with_threads(0).build_pool().unwrap_err();
        assert!(matches!(err, SubsetError::Configuration(_)));
    }

    #[test]
    fn builds_pool_of_requested_size() {
        let pool = ParallelConfig::with_threads(2).build_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
