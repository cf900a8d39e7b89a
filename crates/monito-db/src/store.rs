//! [`CatalogStore`] backed by Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use monito_core::{
    MasterProduct, NewMasterProduct, PriceHistoryEntry, PriceObservation, ProductMatch,
    SupplierPrice,
};
use monito_engine::{CatalogStore, ProductFilter, ProductUpsert, ReviewDecision, StoreError};

use crate::{matches, prices, products};

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn get_candidates(
        &self,
        category: &str,
        normalized_brand: Option<&str>,
    ) -> Result<Vec<MasterProduct>, StoreError> {
        Ok(products::get_candidates(&self.pool, category, normalized_brand).await?)
    }

    async fn get_candidates_by_exact_key(
        &self,
        normalized_brand: Option<&str>,
        normalized_name: &str,
    ) -> Result<Vec<MasterProduct>, StoreError> {
        Ok(
            products::get_candidates_by_exact_key(&self.pool, normalized_brand, normalized_name)
                .await?,
        )
    }

    async fn get_master_product(
        &self,
        product_id: Uuid,
    ) -> Result<Option<MasterProduct>, StoreError> {
        Ok(products::get_master_product(&self.pool, product_id).await?)
    }

    async fn list_master_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<MasterProduct>, StoreError> {
        Ok(products::list_master_products(&self.pool, filter).await?)
    }

    async fn upsert_master_product(
        &self,
        product: &NewMasterProduct,
    ) -> Result<ProductUpsert, StoreError> {
        Ok(products::upsert_master_product(&self.pool, product).await?)
    }

    async fn mark_merged(&self, source: Uuid, target: Uuid) -> Result<(), StoreError> {
        Ok(products::mark_merged(&self.pool, source, target).await?)
    }

    async fn upsert_supplier_price(
        &self,
        product_id: Uuid,
        supplier_name: &str,
        observation: &PriceObservation,
    ) -> Result<Option<Decimal>, StoreError> {
        Ok(prices::upsert_supplier_price(&self.pool, product_id, supplier_name, observation).await?)
    }

    async fn get_supplier_prices(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<SupplierPrice>, StoreError> {
        Ok(prices::get_supplier_prices(&self.pool, product_id).await?)
    }

    async fn append_price_history(&self, entry: &PriceHistoryEntry) -> Result<(), StoreError> {
        Ok(prices::append_price_history(&self.pool, entry).await?)
    }

    async fn get_price_history(
        &self,
        product_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        Ok(prices::get_price_history(&self.pool, product_id, since).await?)
    }

    async fn record_match(&self, record: &ProductMatch) -> Result<Uuid, StoreError> {
        Ok(matches::record_match(&self.pool, record).await?)
    }

    async fn get_match(&self, match_id: Uuid) -> Result<Option<ProductMatch>, StoreError> {
        Ok(matches::get_match(&self.pool, match_id).await?)
    }

    async fn list_unreviewed_matches(
        &self,
        min_score: f64,
    ) -> Result<Vec<ProductMatch>, StoreError> {
        Ok(matches::list_unreviewed_matches(&self.pool, min_score).await?)
    }

    async fn set_match_review(
        &self,
        match_id: Uuid,
        decision: ReviewDecision,
    ) -> Result<ProductMatch, StoreError> {
        Ok(matches::set_match_review(&self.pool, match_id, decision).await?)
    }

    async fn rejected_partners(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(matches::rejected_partners(&self.pool, id).await?)
    }
}
