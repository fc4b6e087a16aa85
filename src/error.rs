//! Error types shared across the crate

use thiserror::Error;

/// A collaborator could not be reached or failed to answer
///
/// Store and question source implementations return this for transport
/// failures. The engine aborts the current event when it sees one and
/// never retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{collaborator} unavailable: {reason}")]
pub struct StoreError {
    /// Which collaborator failed, e.g. `identity store`
    pub collaborator: &'static str,
    /// Human readable cause
    pub reason: String,
}

impl StoreError {
    /// Creates a store error for the named collaborator
    pub fn new(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self {
            collaborator,
            reason: reason.into(),
        }
    }
}

/// Errors that abort the handling of an event
#[derive(Error, Debug, derive_more::From)]
pub enum Error {
    /// A store or the question source failed; no state was written
    #[error(transparent)]
    Store(StoreError),
    /// The engine options did not pass validation
    #[error("invalid options: {0}")]
    Options(garde::Report),
}
