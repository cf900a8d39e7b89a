//! In-process [`CatalogStore`] for tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use monito_core::{
    MasterProduct, MatchType, NewMasterProduct, PriceHistoryEntry, PriceObservation,
    ProductMatch, ProductStatus, SupplierPrice,
};

use crate::error::StoreError;
use crate::store::{CatalogStore, ProductFilter, ProductUpsert, ReviewDecision};

type PriceKey = (Uuid, String, NaiveDate);

#[derive(Debug, Default)]
struct State {
    products: HashMap<Uuid, MasterProduct>,
    prices: HashMap<PriceKey, SupplierPrice>,
    history: Vec<PriceHistoryEntry>,
    matches: HashMap<Uuid, ProductMatch>,
}

/// A [`CatalogStore`] held entirely in memory behind one lock.
///
/// All uniqueness rules of the Postgres store hold here too, so engine tests
/// exercise the same semantics.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    state: RwLock<State>,
}

impl InMemoryCatalogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed product, bypassing the match-key check.
    pub async fn insert_product(&self, product: MasterProduct) {
        self.state
            .write()
            .await
            .products
            .insert(product.product_id, product);
    }

    pub async fn product_count(&self) -> usize {
        self.state.read().await.products.len()
    }

    pub async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }

    pub async fn all_matches(&self) -> Vec<ProductMatch> {
        self.state.read().await.matches.values().cloned().collect()
    }
}

fn same_brand(stored: Option<&String>, wanted: Option<&str>) -> bool {
    stored.map(String::as_str) == wanted
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get_candidates(
        &self,
        category: &str,
        normalized_brand: Option<&str>,
    ) -> Result<Vec<MasterProduct>, StoreError> {
        let state = self.state.read().await;
        let mut out: Vec<MasterProduct> = state
            .products
            .values()
            .filter(|p| p.is_active() && p.category == category)
            .filter(|p| {
                normalized_brand.is_none_or(|b| same_brand(p.normalized_brand.as_ref(), Some(b)))
            })
            .cloned()
            .collect();
        out.sort_by_key(|p| p.product_id);
        Ok(out)
    }

    async fn get_candidates_by_exact_key(
        &self,
        normalized_brand: Option<&str>,
        normalized_name: &str,
    ) -> Result<Vec<MasterProduct>, StoreError> {
        let state = self.state.read().await;
        let mut out: Vec<MasterProduct> = state
            .products
            .values()
            .filter(|p| {
                p.is_active()
                    && p.normalized_name == normalized_name
                    && same_brand(p.normalized_brand.as_ref(), normalized_brand)
            })
            .cloned()
            .collect();
        out.sort_by_key(|p| p.product_id);
        Ok(out)
    }

    async fn get_master_product(
        &self,
        product_id: Uuid,
    ) -> Result<Option<MasterProduct>, StoreError> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn list_master_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<MasterProduct>, StoreError> {
        let state = self.state.read().await;
        let mut out: Vec<MasterProduct> = state
            .products
            .values()
            .filter(|p| filter.category.as_ref().is_none_or(|c| &p.category == c))
            .filter(|p| {
                filter
                    .normalized_brand
                    .as_deref()
                    .is_none_or(|b| same_brand(p.normalized_brand.as_ref(), Some(b)))
            })
            .filter(|p| filter.status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.standard_name
                .cmp(&b.standard_name)
                .then(a.product_id.cmp(&b.product_id))
        });
        Ok(out)
    }

    async fn upsert_master_product(
        &self,
        product: &NewMasterProduct,
    ) -> Result<ProductUpsert, StoreError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.products.values().find(|p| product.same_key_as(p)) {
            return Ok(ProductUpsert::Existing(existing.product_id));
        }

        let now = Utc::now();
        let product_id = Uuid::new_v4();
        state.products.insert(
            product_id,
            MasterProduct {
                product_id,
                standard_name: product.standard_name.clone(),
                normalized_name: product.normalized_name.clone(),
                brand: product.brand.clone(),
                normalized_brand: product.normalized_brand.clone(),
                category: product.category.clone(),
                size: product.size,
                unit: product.unit,
                status: ProductStatus::Active,
                merged_into: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(ProductUpsert::Created(product_id))
    }

    async fn mark_merged(&self, source: Uuid, target: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(&target) {
            return Err(StoreError::NotFound(format!("master product {target}")));
        }
        let now = Utc::now();
        let product = state
            .products
            .get_mut(&source)
            .ok_or_else(|| StoreError::NotFound(format!("master product {source}")))?;
        product.status = ProductStatus::Merged;
        product.merged_into = Some(target);
        product.updated_at = now;

        let movable: Vec<PriceKey> = state
            .prices
            .keys()
            .filter(|(id, supplier, day)| {
                *id == source
                    && !state
                        .prices
                        .contains_key(&(target, supplier.clone(), *day))
            })
            .cloned()
            .collect();
        for key in movable {
            if let Some(mut row) = state.prices.remove(&key) {
                row.product_id = target;
                state.prices.insert((target, key.1, key.2), row);
            }
        }
        Ok(())
    }

    async fn upsert_supplier_price(
        &self,
        product_id: Uuid,
        supplier_name: &str,
        observation: &PriceObservation,
    ) -> Result<Option<Decimal>, StoreError> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::NotFound(format!("master product {product_id}")))?;
        if observation.seen_at > product.updated_at {
            product.updated_at = observation.seen_at;
        }

        let previous = state
            .prices
            .values()
            .filter(|p| p.product_id == product_id && p.supplier_name == supplier_name)
            .max_by_key(|p| (p.price_date, p.last_seen))
            .map(|p| p.price);

        state.prices.insert(
            (product_id, supplier_name.to_string(), observation.price_date),
            SupplierPrice {
                product_id,
                supplier_name: supplier_name.to_string(),
                original_name: observation.original_name.clone(),
                price: observation.price,
                currency: observation.currency.clone(),
                size: observation.size,
                unit: observation.unit,
                price_date: observation.price_date,
                confidence_score: observation.confidence_score,
                last_seen: observation.seen_at,
            },
        );
        Ok(previous)
    }

    async fn get_supplier_prices(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<SupplierPrice>, StoreError> {
        let state = self.state.read().await;
        let mut out: Vec<SupplierPrice> = state
            .prices
            .values()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.price_date
                .cmp(&a.price_date)
                .then_with(|| a.supplier_name.cmp(&b.supplier_name))
        });
        Ok(out)
    }

    async fn append_price_history(&self, entry: &PriceHistoryEntry) -> Result<(), StoreError> {
        self.state.write().await.history.push(entry.clone());
        Ok(())
    }

    async fn get_price_history(
        &self,
        product_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.product_id == product_id && h.change_date >= since)
            .cloned()
            .collect())
    }

    async fn record_match(&self, record: &ProductMatch) -> Result<Uuid, StoreError> {
        let mut state = self.state.write().await;
        let existing = state
            .matches
            .values_mut()
            .find(|m| m.pair() == record.pair());
        match existing {
            Some(row) if row.is_human_decision() => Ok(row.match_id),
            Some(row) => {
                row.similarity_score = record.similarity_score;
                row.match_type = record.match_type;
                row.reviewed |= record.reviewed;
                Ok(row.match_id)
            }
            None => {
                state.matches.insert(record.match_id, record.clone());
                Ok(record.match_id)
            }
        }
    }

    async fn get_match(&self, match_id: Uuid) -> Result<Option<ProductMatch>, StoreError> {
        Ok(self.state.read().await.matches.get(&match_id).cloned())
    }

    async fn list_unreviewed_matches(
        &self,
        min_score: f64,
    ) -> Result<Vec<ProductMatch>, StoreError> {
        let state = self.state.read().await;
        let mut out: Vec<ProductMatch> = state
            .matches
            .values()
            .filter(|m| {
                !m.reviewed
                    && m.match_type != MatchType::Rejected
                    && m.similarity_score >= min_score
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.similarity_score
                .total_cmp(&a.similarity_score)
                .then_with(|| a.match_id.cmp(&b.match_id))
        });
        Ok(out)
    }

    async fn set_match_review(
        &self,
        match_id: Uuid,
        decision: ReviewDecision,
    ) -> Result<ProductMatch, StoreError> {
        let mut state = self.state.write().await;
        let row = state
            .matches
            .get_mut(&match_id)
            .ok_or_else(|| StoreError::NotFound(format!("product match {match_id}")))?;
        row.reviewed = true;
        if decision == ReviewDecision::Rejected {
            row.match_type = MatchType::Rejected;
        }
        Ok(row.clone())
    }

    async fn rejected_partners(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .matches
            .values()
            .filter(|m| m.match_type == MatchType::Rejected)
            .filter_map(|m| m.partner_of(id))
            .collect())
    }
}
