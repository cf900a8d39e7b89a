//! The storage port the engines read candidates from and commit decisions to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use monito_core::{
    MasterProduct, NewMasterProduct, PriceHistoryEntry, PriceObservation, ProductMatch,
    ProductStatus, SupplierPrice,
};

use crate::error::StoreError;

/// Filters for listing master products. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<String>,
    /// Compared against the folded, alias-canonicalized brand.
    pub normalized_brand: Option<String>,
    pub status: Option<ProductStatus>,
}

impl ProductFilter {
    #[must_use]
    pub fn active() -> Self {
        Self {
            status: Some(ProductStatus::Active),
            ..Self::default()
        }
    }
}

/// What [`CatalogStore::upsert_master_product`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductUpsert {
    Created(Uuid),
    /// A non-merged product already held the match key.
    Existing(Uuid),
}

impl ProductUpsert {
    #[must_use]
    pub fn product_id(self) -> Uuid {
        match self {
            ProductUpsert::Created(id) | ProductUpsert::Existing(id) => id,
        }
    }
}

/// Review decisions a human can record on a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Confirms the match; the match type is unchanged.
    Approved,
    /// Disconfirms the match; the row becomes `rejected`.
    Rejected,
}

/// Catalog persistence.
///
/// Implementations own durability and uniqueness: at most one non-merged
/// master product per `(normalized_name, normalized_brand, category, pack)`
/// (see [`NewMasterProduct::same_key_as`]), one
/// supplier price per `(product_id, supplier_name, price_date)` and one match
/// row per unordered pair.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Active products in `category`, optionally narrowed to one folded brand.
    async fn get_candidates(
        &self,
        category: &str,
        normalized_brand: Option<&str>,
    ) -> Result<Vec<MasterProduct>, StoreError>;

    /// Active products whose folded name and folded brand equal the given key.
    /// A `None` brand only matches products without a brand.
    async fn get_candidates_by_exact_key(
        &self,
        normalized_brand: Option<&str>,
        normalized_name: &str,
    ) -> Result<Vec<MasterProduct>, StoreError>;

    async fn get_master_product(&self, product_id: Uuid)
        -> Result<Option<MasterProduct>, StoreError>;

    async fn list_master_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<MasterProduct>, StoreError>;

    /// Creates a product, or reports the existing non-merged product with
    /// the same match key.
    async fn upsert_master_product(
        &self,
        product: &NewMasterProduct,
    ) -> Result<ProductUpsert, StoreError>;

    /// Marks `source` merged into `target` and moves its supplier prices to
    /// `target` where `target` has no row for the same supplier and day.
    async fn mark_merged(&self, source: Uuid, target: Uuid) -> Result<(), StoreError>;

    /// Inserts or overwrites the supplier's price for the observation's day.
    /// Returns the supplier's latest price before this write, if any.
    async fn upsert_supplier_price(
        &self,
        product_id: Uuid,
        supplier_name: &str,
        observation: &PriceObservation,
    ) -> Result<Option<Decimal>, StoreError>;

    /// Every stored price row for the product, newest day first.
    async fn get_supplier_prices(&self, product_id: Uuid)
        -> Result<Vec<SupplierPrice>, StoreError>;

    async fn append_price_history(&self, entry: &PriceHistoryEntry) -> Result<(), StoreError>;

    async fn get_price_history(
        &self,
        product_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError>;

    /// Records a match, returning the id of the row for that pair.
    ///
    /// If a row already exists for the pair and a reviewer has touched it,
    /// it is returned untouched. Otherwise the score and type are refreshed.
    async fn record_match(&self, record: &ProductMatch) -> Result<Uuid, StoreError>;

    async fn get_match(&self, match_id: Uuid) -> Result<Option<ProductMatch>, StoreError>;

    /// Unreviewed, non-rejected matches scoring at least `min_score`, best first.
    async fn list_unreviewed_matches(&self, min_score: f64)
        -> Result<Vec<ProductMatch>, StoreError>;

    /// Marks the match reviewed, and rejected if so decided.
    async fn set_match_review(
        &self,
        match_id: Uuid,
        decision: ReviewDecision,
    ) -> Result<ProductMatch, StoreError>;

    /// Ids paired with `id` by a rejected match.
    async fn rejected_partners(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError>;
}
