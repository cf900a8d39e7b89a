use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use monito_core::ValidationError;

use crate::units::Basis;

/// Failures from converting a price to its per-base-unit form.
///
/// Scoring and analysis absorb these; only direct callers of
/// [`crate::units::normalize`] see them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("{field} must be greater than zero, got {value}")]
    InvalidQuantity { field: &'static str, value: Decimal },

    #[error("{field} {value} is too large to convert to base units")]
    Overflow { field: &'static str, value: Decimal },

    #[error("{0}")]
    MissingQuantity(&'static str),

    #[error("cannot compare a {left} price with a {right} price")]
    IncompatibleUnit { left: Basis, right: Basis },
}

/// Errors surfaced by a [`crate::store::CatalogStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("match not found: {0}")]
    MatchNotFound(Uuid),

    #[error("invalid merge: {0}")]
    InvalidMerge(String),
}
