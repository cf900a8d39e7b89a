//! Shared domain types and configuration for the Monito price catalog.
//!
//! Everything here is plain data: supplier records as they arrive from the
//! standardizer, the catalog entities owned by the store, and the settings
//! that tune matching and price comparison. Behaviour lives in
//! `monito-engine`.

pub mod app_config;
pub mod brands;
pub mod catalog;
pub mod config;
pub mod records;
pub mod units;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use brands::{fold_key, load_brand_aliases, BrandAliases, BrandAliasesFile};
pub use catalog::{
    canonical_pair, MasterProduct, MatchType, NewMasterProduct, PriceHistoryEntry, PriceObservation,
    ProductMatch, ProductStatus, SupplierPrice,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use records::{ProductRecord, DEFAULT_CURRENCY};
pub use units::{Dimension, Pack, Unit};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read brand aliases file {path}: {source}")]
    AliasesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse brand aliases file: {0}")]
    AliasesFileParse(#[source] serde_yaml::Error),

    #[error("config validation failed: {0}")]
    Validation(String),
}

/// A malformed record rejected at the standardizer boundary.
///
/// Raised for a single record only; batch callers report it and move on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("price must be greater than zero, got {0}")]
    NonPositivePrice(rust_decimal::Decimal),

    #[error("size must be greater than zero, got {0}")]
    NonPositiveSize(rust_decimal::Decimal),

    #[error("size {size} {unit} is too large to compare")]
    SizeOutOfRange {
        size: rust_decimal::Decimal,
        unit: units::Unit,
    },

    #[error("size and unit must both be present or both absent")]
    SizeUnitMismatch,

    #[error("confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),

    #[error("{field} must be non-empty")]
    EmptyField { field: &'static str },

    #[error("unknown unit: {0:?}")]
    UnknownUnit(String),
}
