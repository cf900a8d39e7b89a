//! The unified catalog view: master products joined with their current best deal.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use monito_core::{MasterProduct, ProductStatus, Unit};

use crate::error::EngineError;
use crate::matching::NameQuery;
use crate::pricing::{deal_confidence, PriceAnalysis, PriceComparisonEngine, PriceTrend};
use crate::similarity::name_similarity;
use crate::store::ProductFilter;
use crate::text::{fold_brand, fold_name};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub category: Option<String>,
    /// Raw brand; folded and alias-canonicalized before filtering.
    pub brand: Option<String>,
}

/// A master product with its current best offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRow {
    pub product_id: Uuid,
    pub standard_name: String,
    pub brand: Option<String>,
    pub category: String,
    pub size: Option<Decimal>,
    pub unit: Option<Unit>,
    pub best_price: Decimal,
    pub currency: String,
    pub best_supplier: String,
    pub alternative_suppliers_count: usize,
    pub savings_vs_worst: f64,
    pub trend: PriceTrend,
    pub deal_confidence: f64,
    pub last_updated: DateTime<Utc>,
    #[serde(skip)]
    suppliers: Vec<String>,
}

impl CatalogRow {
    fn new(product: MasterProduct, analysis: &PriceAnalysis) -> Self {
        let last_updated = analysis
            .competitive_suppliers
            .iter()
            .chain([&analysis.best, &analysis.worst])
            .map(|o| o.offer.last_seen)
            .max()
            .unwrap_or(product.updated_at);

        Self {
            product_id: product.product_id,
            standard_name: product.standard_name,
            brand: product.brand,
            category: product.category,
            size: product.size,
            unit: product.unit,
            best_price: analysis.best.offer.price,
            currency: analysis.best.offer.currency.clone(),
            best_supplier: analysis.best.offer.supplier_name.clone(),
            alternative_suppliers_count: analysis.supplier_count.saturating_sub(1),
            savings_vs_worst: analysis.savings_pct,
            trend: analysis.trend,
            deal_confidence: deal_confidence(analysis),
            last_updated,
            suppliers: analysis.suppliers.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total_products: usize,
    pub total_suppliers: usize,
    pub categories_count: usize,
    pub average_savings: f64,
    pub max_savings: f64,
    pub products_with_multiple_suppliers: usize,
}

/// Read-only composition of the catalog and the price engine.
#[derive(Debug, Clone)]
pub struct UnifiedCatalogManager {
    pricing: PriceComparisonEngine,
}

impl UnifiedCatalogManager {
    #[must_use]
    pub fn new(pricing: PriceComparisonEngine) -> Self {
        Self { pricing }
    }

    /// Active products with current prices, best savings first.
    ///
    /// Products without current price data are left out.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn get_catalog(&self, filter: &CatalogFilter) -> Result<Vec<CatalogRow>, EngineError> {
        self.get_catalog_at(filter, Utc::now()).await
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn get_catalog_at(
        &self,
        filter: &CatalogFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<CatalogRow>, EngineError> {
        let matcher = self.pricing.matcher();
        let products = self
            .pricing
            .store()
            .list_master_products(&ProductFilter {
                category: filter.category.clone(),
                normalized_brand: fold_brand(filter.brand.as_deref(), matcher.scorer().aliases()),
                status: Some(ProductStatus::Active),
            })
            .await?;

        let mut rows = Vec::with_capacity(products.len());
        let mut unpriced = 0usize;
        for product in products {
            match self.pricing.analyze_at(product.product_id, now).await? {
                Some(analysis) => rows.push(CatalogRow::new(product, &analysis)),
                None => unpriced += 1,
            }
        }

        rows.sort_by(|a, b| {
            b.savings_vs_worst
                .total_cmp(&a.savings_vs_worst)
                .then_with(|| a.standard_name.cmp(&b.standard_name))
        });
        tracing::debug!(rows = rows.len(), unpriced, "built catalog view");
        Ok(rows)
    }

    /// Rows saving at least `min_savings_pct`, best savings then confidence first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn top_deals(
        &self,
        min_savings_pct: f64,
        limit: usize,
    ) -> Result<Vec<CatalogRow>, EngineError> {
        self.top_deals_at(min_savings_pct, limit, Utc::now()).await
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn top_deals_at(
        &self,
        min_savings_pct: f64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<CatalogRow>, EngineError> {
        let mut rows: Vec<CatalogRow> = self
            .get_catalog_at(&CatalogFilter::default(), now)
            .await?
            .into_iter()
            .filter(|r| r.savings_vs_worst >= min_savings_pct)
            .collect();
        rows.sort_by(|a, b| {
            b.savings_vs_worst
                .total_cmp(&a.savings_vs_worst)
                .then_with(|| b.deal_confidence.total_cmp(&a.deal_confidence))
                .then_with(|| a.standard_name.cmp(&b.standard_name))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    /// Summary figures over the current catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn stats(&self) -> Result<CatalogStats, EngineError> {
        self.stats_at(Utc::now()).await
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<CatalogStats, EngineError> {
        let rows = self.get_catalog_at(&CatalogFilter::default(), now).await?;
        Ok(catalog_stats(&rows))
    }

    /// Rows whose name contains `term` or is close to it, closest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn search(
        &self,
        term: &str,
        category: Option<&str>,
    ) -> Result<Vec<CatalogRow>, EngineError> {
        self.search_at(term, category, Utc::now()).await
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn search_at(
        &self,
        term: &str,
        category: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<CatalogRow>, EngineError> {
        let folded = fold_name(term);
        if folded.is_empty() {
            return Ok(Vec::new());
        }

        let matcher = self.pricing.matcher();
        let scorer = matcher.scorer();
        let threshold = matcher.config().fuzzy_threshold;
        let query = scorer.features(&NameQuery(term));

        let filter = CatalogFilter {
            category: category.map(str::to_string),
            brand: None,
        };
        let mut hits: Vec<(CatalogRow, f64)> = self
            .get_catalog_at(&filter, now)
            .await?
            .into_iter()
            .filter_map(|row| {
                let features = scorer.features(&NameQuery(&row.standard_name));
                let similarity = name_similarity(&query, &features);
                (features.name.contains(&folded) || similarity >= threshold)
                    .then_some((row, similarity))
            })
            .collect();

        hits.sort_by(|(ra, sa), (rb, sb)| {
            sb.total_cmp(sa)
                .then_with(|| ra.standard_name.cmp(&rb.standard_name))
        });
        Ok(hits.into_iter().map(|(row, _)| row).collect())
    }
}

fn catalog_stats(rows: &[CatalogRow]) -> CatalogStats {
    if rows.is_empty() {
        return CatalogStats::default();
    }
    let suppliers: HashSet<&str> = rows
        .iter()
        .flat_map(|r| r.suppliers.iter().map(String::as_str))
        .collect();
    let categories: HashSet<&str> = rows.iter().map(|r| r.category.as_str()).collect();
    let savings_sum: f64 = rows.iter().map(|r| r.savings_vs_worst).sum();

    #[allow(clippy::cast_precision_loss)]
    let average_savings = savings_sum / rows.len() as f64;

    CatalogStats {
        total_products: rows.len(),
        total_suppliers: suppliers.len(),
        categories_count: categories.len(),
        average_savings,
        max_savings: rows
            .iter()
            .map(|r| r.savings_vs_worst)
            .fold(0.0, f64::max),
        products_with_multiple_suppliers: rows
            .iter()
            .filter(|r| r.alternative_suppliers_count > 0)
            .count(),
    }
}
