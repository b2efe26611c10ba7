//! Visitor error types

use tt_remote::{JobError, RemoteError};
use tt_split::SplitError;
use tt_vary::VaryError;

/// Errors surfaced by visitor operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VisitorError {
    /// Split configuration inconsistent with the request
    #[error(transparent)]
    Split(#[from] SplitError),

    /// Malformed vary declaration
    #[error(transparent)]
    Vary(#[from] VaryError),

    /// Remote authority failure that could not be degraded or deferred
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Deferred job could not be enqueued
    #[error(transparent)]
    Job(#[from] JobError),
}

impl VisitorError {
    /// Whether retrying the operation later may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_transient())
    }

    /// Whether the caller's code or configuration is at fault
    #[inline]
    #[must_use]
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::Split(_) | Self::Vary(_))
    }
}
