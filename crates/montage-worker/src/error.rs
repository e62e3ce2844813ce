//! Worker error types.
//!
//! Errors that carry a user-safe message (`Validation`, `Generation`,
//! `Assembly`) are constructed at the call site with the exact text that may
//! land on the job record. Everything else is internal: it is logged in full
//! and surfaces to the user as [`GENERIC_FAILURE_MESSAGE`].

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// The non-leaking fallback message for unexpected errors.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Missing or malformed payload content. Message is user-safe.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Generation provider failure. Message is user-safe.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Final assembly failure. Message is user-safe.
    #[error("Assembly failed: {0}")]
    Assembly(String),

    #[error("Queue error: {0}")]
    Queue(#[from] montage_queue::QueueError),

    #[error("Media error: {0}")]
    Media(#[from] montage_media::MediaError),

    #[error("Provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    /// The message written to the job record. Never includes internal
    /// exception detail.
    pub fn user_message(&self) -> &str {
        match self {
            WorkerError::Validation(m) | WorkerError::Generation(m) | WorkerError::Assembly(m) => m,
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }
}
