//! Retry controller: one attempt per planned [`AttemptSpec`], in order.
//!
//! ```text
//! Pending -> Attempting(0) -> Succeeded
//!                          -> Attempting(1) -> ... -> Exhausted
//! ```
//!
//! The controller only tracks state; the caller performs each attempt and
//! reports back with [`RetryController::record_success`] or
//! [`RetryController::record_failure`].

use std::fmt;

use crate::request::AttemptSpec;

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The extractor could not be started.
    Launch,
    /// The extractor ran and exited unsuccessfully.
    Exit(Option<i32>),
}

/// One failed attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// Zero-based attempt index.
    pub attempt: usize,
    pub spec: AttemptSpec,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt {} ({}): {}", self.attempt + 1, self.spec, self.message)
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    /// Attempt `i` (zero-based) is in flight.
    Attempting(usize),
    /// Attempt `i` succeeded.
    Succeeded(usize),
    /// Every planned attempt failed.
    Exhausted,
}

/// Walks an ordered list of attempt variants.
#[derive(Debug, Clone)]
pub struct RetryController {
    specs: Vec<AttemptSpec>,
    state: AttemptState,
    failures: Vec<AttemptFailure>,
}

impl RetryController {
    #[must_use]
    pub const fn new(specs: Vec<AttemptSpec>) -> Self {
        Self {
            specs,
            state: AttemptState::Pending,
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> AttemptState {
        self.state
    }

    /// Starts the next attempt, returning its index and spec.
    ///
    /// Returns `None` once the controller has succeeded or is exhausted,
    /// and also if the in-flight attempt has not been recorded yet.
    pub fn next_attempt(&mut self) -> Option<(usize, AttemptSpec)> {
        let index = match self.state {
            AttemptState::Pending => 0,
            AttemptState::Attempting(i) if self.failures.len() > i => i + 1,
            _ => return None,
        };
        match self.specs.get(index) {
            Some(spec) => {
                self.state = AttemptState::Attempting(index);
                Some((index, spec.clone()))
            }
            None => {
                self.state = AttemptState::Exhausted;
                None
            }
        }
    }

    /// Records that the in-flight attempt succeeded.
    pub fn record_success(&mut self) {
        if let AttemptState::Attempting(i) = self.state {
            self.state = AttemptState::Succeeded(i);
        }
    }

    /// Records that the in-flight attempt failed.
    ///
    /// Moves to `Exhausted` when no spec remains.
    pub fn record_failure(&mut self, kind: FailureKind, message: impl Into<String>) {
        let AttemptState::Attempting(i) = self.state else {
            return;
        };
        self.failures.push(AttemptFailure {
            attempt: i,
            spec: self.specs[i].clone(),
            kind,
            message: message.into(),
        });
        if i + 1 >= self.specs.len() {
            self.state = AttemptState::Exhausted;
        }
    }

    /// Number of attempts started so far.
    #[must_use]
    pub const fn attempts_made(&self) -> usize {
        match self.state {
            AttemptState::Pending => 0,
            AttemptState::Attempting(i) | AttemptState::Succeeded(i) => i + 1,
            AttemptState::Exhausted => self.failures.len(),
        }
    }

    /// The most recent failure, which is what gets reported to the user.
    #[must_use]
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        self.failures.last()
    }

    /// Every failure so far, oldest first.
    #[must_use]
    pub fn failures(&self) -> &[AttemptFailure] {
        &self.failures
    }

    #[must_use]
    pub fn into_failures(self) -> Vec<AttemptFailure> {
        self.failures
    }
}
