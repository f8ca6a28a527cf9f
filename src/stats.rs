//! Batch outcome accounting.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Final tally of a batch. Never changes once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Number of items delivered to the destination.
    pub successful: usize,
    /// Number of items that failed after all attempts.
    pub failed: usize,
    /// Directory the batch wrote into.
    pub destination: PathBuf,
    /// Wall-clock time for the whole batch.
    pub elapsed: Duration,
}

impl BatchResult {
    /// Total number of items processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.successful + self.failed
    }

    /// Returns true if every processed item succeeded.
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Builder for accumulating batch statistics during downloads.
#[derive(Debug)]
pub struct BatchStatsBuilder {
    successful: usize,
    failed: usize,
    destination: PathBuf,
    start_time: Instant,
}

impl BatchStatsBuilder {
    /// Starts timing a batch writing into `destination`.
    #[must_use]
    pub fn new(destination: &Path) -> Self {
        Self {
            successful: 0,
            failed: 0,
            destination: destination.to_path_buf(),
            start_time: Instant::now(),
        }
    }

    /// Records a delivered item.
    pub const fn add_success(&mut self) {
        self.successful += 1;
    }

    /// Records a failed item.
    pub const fn add_failure(&mut self) {
        self.failed += 1;
    }

    /// Records an item outcome.
    pub const fn record(&mut self, succeeded: bool) {
        if succeeded {
            self.add_success();
        } else {
            self.add_failure();
        }
    }

    /// Builds the final batch result.
    #[must_use]
    pub fn build(self) -> BatchResult {
        BatchResult {
            successful: self.successful,
            failed: self.failed,
            destination: self.destination,
            elapsed: self.start_time.elapsed(),
        }
    }
}
