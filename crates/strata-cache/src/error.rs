//! Error types for cache operations.

use std::sync::Arc;

use thiserror::Error;

pub use strata_core::CodecError;

/// Boxed error returned by user-supplied loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by cache operations.
///
/// Cloneable so one outcome can be handed to every waiter of a shared
/// in-flight load. Losing the distributed load lock is not an error; it
/// surfaces as an absent result.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Key or value codec failure. Fatal to the single operation.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// I/O failure talking to the remote store. Surfaced unmodified, never
    /// retried at this layer.
    #[error("remote store error: {0}")]
    Store(String),

    /// The loader itself failed. The distributed lock is released before
    /// this reaches the caller.
    #[error("loader failed: {0}")]
    Loader(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The operation is not available on this cache variant.
    #[error("{cache} does not support {operation}")]
    Unsupported {
        cache: &'static str,
        operation: &'static str,
    },
}

impl CacheError {
    pub(crate) fn store(err: impl std::fmt::Display) -> Self {
        CacheError::Store(err.to_string())
    }

    pub(crate) fn loader(err: BoxError) -> Self {
        CacheError::Loader(Arc::from(err))
    }
}
