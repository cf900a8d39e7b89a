//! Product matching and price normalization for the Monito catalog.
//!
//! Incoming supplier records are matched against master products in two
//! tiers, committed through [`IngestPipeline`], and compared per base unit by
//! [`PriceComparisonEngine`]. Storage sits behind the [`CatalogStore`] port.

pub mod catalog;
pub mod error;
pub mod ingest;
pub mod matching;
pub mod memory;
pub mod pricing;
pub mod similarity;
pub mod store;
pub mod text;
pub mod units;

pub use catalog::{CatalogFilter, CatalogRow, CatalogStats, UnifiedCatalogManager};
pub use error::{EngineError, NormalizeError, StoreError};
pub use ingest::{
    CommittedRecord, IngestPipeline, IngestReport, IngestedRow, RejectedRow, RowOutcome,
    UnreadableRow,
};
pub use matching::{
    confidence_level, ConfidenceLevel, MatchDecision, MatchOutcome, MatchingConfig,
    MatchingEngine, ScanStats,
};
pub use memory::InMemoryCatalogStore;
pub use pricing::{
    deal_confidence, PriceAnalysis, PriceComparisonEngine, PriceTrend, PricedOffer,
    PricingConfig, Recommendation, RequiredProduct,
};
pub use similarity::{SimilarityBreakdown, SimilarityScorer};
pub use store::{CatalogStore, ProductFilter, ProductUpsert, ReviewDecision};
pub use text::{fold_brand, fold_name, record_fingerprint};
pub use units::{compare, normalize, Basis, NormalizedPrice};
