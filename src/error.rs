//! Error types for the pricing engine and its stores.

use std::path::PathBuf;

use crate::models::{CalculationId, CustomerId};

/// Boxed cause carried by [`LaskuriError::Storage`].
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// All errors that can occur when pricing customers or managing stored data.
#[derive(Debug, thiserror::Error)]
pub enum LaskuriError {
    /// JSON serialization or deserialization failed outside a store call.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A storage backend operation failed (I/O, parse, permissions).
    #[error("failed to {operation}: {cause}")]
    Storage {
        /// Human-readable name of the failing operation, e.g. `load customers`.
        operation: &'static str,
        /// Underlying cause.
        cause: BoxError,
    },

    /// An update targeted a customer that is not in the collection.
    #[error("customer with ID {0} not found")]
    CustomerNotFound(CustomerId),

    /// An update targeted a saved calculation that is not in the collection.
    #[error("calculation with ID {0} not found")]
    CalculationNotFound(CalculationId),

    /// The requested storage directory does not exist.
    #[error("the selected directory does not exist: {}", .0.display())]
    InvalidStoragePath(PathBuf),

    /// Input rejected by the opt-in validation layer.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A builder was used without a required component.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LaskuriError {
    /// Wraps any error as a storage failure for the named operation.
    #[inline]
    pub fn storage<E>(operation: &'static str, cause: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Storage {
            operation,
            cause: cause.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, LaskuriError>;
