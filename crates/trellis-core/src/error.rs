//! Error types for Trellis core.

use std::fmt;

/// The main error type for Trellis core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrellisError {
    /// Dispatch-related error.
    Dispatch(DispatchError),
}

impl fmt::Display for TrellisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatch(err) => write!(f, "Dispatch error: {err}"),
        }
    }
}

impl std::error::Error for TrellisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Dispatch(err) => Some(err),
        }
    }
}

/// Dispatch-queue errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher's queue is gone; the task cannot be delivered.
    Closed,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Dispatcher queue is closed"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<DispatchError> for TrellisError {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err)
    }
}

/// A specialized Result type for Trellis core operations.
pub type Result<T> = std::result::Result<T, TrellisError>;
