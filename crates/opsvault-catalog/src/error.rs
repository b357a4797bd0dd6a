//! Catalog error types

use crate::asset::AssetId;

/// Errors raised by the preservation catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Asset content exceeds the configured size ceiling. The asset is
    /// skipped entirely, never stored partially.
    #[error("content too large: {path} is {size} bytes (ceiling {ceiling})")]
    ContentTooLarge { path: String, size: u64, ceiling: u64 },

    /// No asset with the given id exists.
    #[error("asset not found: {0}")]
    AssetNotFound(AssetId),

    /// A stored row could not be decoded into a domain type.
    #[error("corrupt catalog row: {0}")]
    Corrupt(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem error during a preservation scan.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Whether the error is local to one asset and the surrounding
    /// operation may continue.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CatalogError::ContentTooLarge { .. }
                | CatalogError::AssetNotFound(_)
                | CatalogError::Io(_)
        )
    }
}
