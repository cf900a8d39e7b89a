//! Best-price analysis and procurement recommendations.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use monito_core::{AppConfig, SupplierPrice};

use crate::error::EngineError;
use crate::matching::MatchingEngine;
use crate::store::CatalogStore;
use crate::units::{normalize, Basis, NormalizedPrice};

/// Average history change (percent) above which prices count as rising.
const TREND_UP_PCT: f64 = 5.0;
/// Average history change (percent) below which prices count as falling.
const TREND_DOWN_PCT: f64 = -5.0;
/// Offers listed as competitive in an analysis.
const COMPETITIVE_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    /// Prices last seen longer ago than this are not current.
    pub freshness_days: u32,
    /// History window used to derive the trend.
    pub trend_window_days: u32,
    /// How long a recommendation stays valid.
    pub recommendation_ttl_days: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            freshness_days: 30,
            trend_window_days: 90,
            recommendation_ttl_days: 7,
        }
    }
}

impl PricingConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            freshness_days: config.freshness_days,
            trend_window_days: config.trend_window_days,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Increasing,
    Decreasing,
    Stable,
}

impl std::fmt::Display for PriceTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceTrend::Increasing => write!(f, "increasing"),
            PriceTrend::Decreasing => write!(f, "decreasing"),
            PriceTrend::Stable => write!(f, "stable"),
        }
    }
}

/// A supplier price with its per-base-unit value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedOffer {
    pub offer: SupplierPrice,
    pub normalized: NormalizedPrice,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAnalysis {
    pub product_id: Uuid,
    pub basis: Basis,
    pub best: PricedOffer,
    pub worst: PricedOffer,
    /// `(worst - best) / worst * 100` on normalized prices; 0 with one supplier.
    pub savings_pct: f64,
    pub supplier_count: usize,
    pub trend: PriceTrend,
    pub average_normalized: Decimal,
    pub median_normalized: Decimal,
    /// Cheapest offers first, at most three.
    pub competitive_suppliers: Vec<PricedOffer>,
    /// Every supplier counted, cheapest first.
    pub suppliers: Vec<String>,
}

/// One line of a purchase request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredProduct {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
}

fn default_quantity() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub product_id: Uuid,
    pub product_name: String,
    pub supplier_name: String,
    pub unit_price: Decimal,
    pub currency: String,
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub alternatives: Vec<PricedOffer>,
    pub potential_savings_pct: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PriceComparisonEngine {
    store: Arc<dyn CatalogStore>,
    matcher: MatchingEngine,
    config: PricingConfig,
}

impl PriceComparisonEngine {
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>, matcher: MatchingEngine, config: PricingConfig) -> Self {
        Self {
            store,
            matcher,
            config,
        }
    }

    pub(crate) fn store(&self) -> &dyn CatalogStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn matcher(&self) -> &MatchingEngine {
        &self.matcher
    }

    #[must_use]
    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Current best/worst prices for a product, or `None` without fresh data.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if prices or history cannot be read.
    pub async fn analyze(&self, product_id: Uuid) -> Result<Option<PriceAnalysis>, EngineError> {
        self.analyze_at(product_id, Utc::now()).await
    }

    /// [`analyze`](Self::analyze) as of `now`.
    ///
    /// Uses each supplier's latest row. Offers on a different basis than the
    /// product's majority basis are left out.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if prices or history cannot be read.
    pub async fn analyze_at(
        &self,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<PriceAnalysis>, EngineError> {
        let rows = self.store.get_supplier_prices(product_id).await?;
        let cutoff = now - Duration::days(i64::from(self.config.freshness_days));

        let mut latest: HashMap<&str, &SupplierPrice> = HashMap::new();
        for row in &rows {
            latest
                .entry(row.supplier_name.as_str())
                .and_modify(|cur| {
                    if (row.price_date, row.last_seen) > (cur.price_date, cur.last_seen) {
                        *cur = row;
                    }
                })
                .or_insert(row);
        }

        let mut offers: Vec<PricedOffer> = latest
            .into_values()
            .filter(|row| row.last_seen >= cutoff)
            .filter_map(|row| match normalize(row.price, row.size, row.unit) {
                Ok(normalized) => Some(PricedOffer {
                    offer: row.clone(),
                    normalized,
                }),
                Err(e) => {
                    tracing::warn!(
                        product_id = %product_id,
                        supplier = %row.supplier_name,
                        error = %e,
                        "skipping price that cannot be normalized"
                    );
                    None
                }
            })
            .collect();

        let Some(basis) = majority_basis(&offers) else {
            return Ok(None);
        };
        let before = offers.len();
        offers.retain(|o| o.normalized.basis == basis);
        if offers.len() < before {
            tracing::warn!(
                product_id = %product_id,
                basis = %basis,
                excluded = before - offers.len(),
                "excluded prices on a minority unit basis"
            );
        }

        offers.sort_by(|a, b| {
            a.normalized
                .value
                .cmp(&b.normalized.value)
                .then_with(|| a.offer.supplier_name.cmp(&b.offer.supplier_name))
        });

        let (Some(best), Some(worst)) = (offers.first().cloned(), offers.last().cloned()) else {
            return Ok(None);
        };

        let supplier_count = offers.len();
        let savings_pct = if supplier_count > 1 {
            savings_percentage(best.normalized.value, worst.normalized.value)
        } else {
            0.0
        };

        let values: Vec<Decimal> = offers.iter().map(|o| o.normalized.value).collect();
        let suppliers = offers.iter().map(|o| o.offer.supplier_name.clone()).collect();
        let trend = self.price_trend_at(product_id, now).await?;

        Ok(Some(PriceAnalysis {
            product_id,
            basis,
            best,
            worst,
            savings_pct,
            supplier_count,
            trend,
            average_normalized: average(&values),
            median_normalized: median(&values),
            competitive_suppliers: offers.into_iter().take(COMPETITIVE_LIMIT).collect(),
            suppliers,
        }))
    }

    /// Trend from the average change in the trailing history window.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if history cannot be read.
    pub async fn price_trend_at(
        &self,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PriceTrend, EngineError> {
        let since = now - Duration::days(i64::from(self.config.trend_window_days));
        let history = self.store.get_price_history(product_id, since).await?;
        let changes: Vec<f64> = history
            .iter()
            .filter_map(|h| h.change_percentage)
            .filter_map(|c| c.to_f64())
            .collect();
        if changes.is_empty() {
            return Ok(PriceTrend::Stable);
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = changes.iter().sum::<f64>() / changes.len() as f64;
        Ok(if avg > TREND_UP_PCT {
            PriceTrend::Increasing
        } else if avg < TREND_DOWN_PCT {
            PriceTrend::Decreasing
        } else {
            PriceTrend::Stable
        })
    }

    /// Best current supplier for each required product that can be found.
    /// Products with no match or no current price are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn generate_recommendations(
        &self,
        required: &[RequiredProduct],
    ) -> Result<Vec<Recommendation>, EngineError> {
        self.generate_recommendations_at(required, None, Utc::now())
            .await
    }

    /// Like [`generate_recommendations`](Self::generate_recommendations), but
    /// keeps the running total within `budget`. When the best offer does not
    /// fit, the cheapest competitive offer that does is taken; otherwise the
    /// item is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn generate_recommendations_with_budget(
        &self,
        required: &[RequiredProduct],
        budget: Decimal,
    ) -> Result<Vec<Recommendation>, EngineError> {
        self.generate_recommendations_at(required, Some(budget), Utc::now())
            .await
    }

    /// Recommendation generation as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn generate_recommendations_at(
        &self,
        required: &[RequiredProduct],
        budget: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, EngineError> {
        let mut out = Vec::with_capacity(required.len());
        let mut spent = Decimal::ZERO;

        for item in required {
            let Some((product, _)) = self.matcher.lookup_by_name(&item.name).await? else {
                tracing::warn!(name = %item.name, "no catalog product for required item");
                continue;
            };
            let Some(analysis) = self.analyze_at(product.product_id, now).await? else {
                tracing::warn!(
                    name = %item.name,
                    product_id = %product.product_id,
                    "no current prices for required item"
                );
                continue;
            };

            let Some(best_cost) = analysis.best.offer.price.checked_mul(item.quantity) else {
                tracing::warn!(
                    name = %item.name,
                    quantity = %item.quantity,
                    "cost of required item is out of range"
                );
                continue;
            };
            let chosen = match budget {
                Some(limit) if spent.checked_add(best_cost).is_none_or(|t| t > limit) => {
                    let remaining = limit.saturating_sub(spent);
                    let affordable = analysis.competitive_suppliers.iter().find(|o| {
                        o.offer
                            .price
                            .checked_mul(item.quantity)
                            .is_some_and(|cost| cost <= remaining)
                    });
                    if let Some(offer) = affordable {
                        offer.clone()
                    } else {
                        tracing::warn!(
                            name = %item.name,
                            remaining = %remaining,
                            "required item exceeds remaining budget"
                        );
                        continue;
                    }
                }
                _ => analysis.best.clone(),
            };

            let Some((total_cost, new_spent)) = chosen
                .offer
                .price
                .checked_mul(item.quantity)
                .and_then(|cost| Some((cost, spent.checked_add(cost)?)))
            else {
                tracing::warn!(name = %item.name, "running total is out of range");
                continue;
            };
            spent = new_spent;

            let alternatives = analysis
                .competitive_suppliers
                .iter()
                .filter(|o| o.offer.supplier_name != chosen.offer.supplier_name)
                .take(COMPETITIVE_LIMIT)
                .cloned()
                .collect();

            out.push(Recommendation {
                product_id: product.product_id,
                product_name: product.standard_name.clone(),
                supplier_name: chosen.offer.supplier_name.clone(),
                unit_price: chosen.offer.price,
                currency: chosen.offer.currency.clone(),
                quantity: item.quantity,
                total_cost,
                alternatives,
                potential_savings_pct: analysis.savings_pct,
                confidence: deal_confidence(&analysis),
                reasoning: recommendation_reasoning(&analysis),
                expires_at: now + Duration::days(i64::from(self.config.recommendation_ttl_days)),
            });
        }

        tracing::info!(
            requested = required.len(),
            recommended = out.len(),
            total = %spent,
            "generated procurement recommendations"
        );
        Ok(out)
    }
}

impl std::fmt::Debug for PriceComparisonEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceComparisonEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Confidence in a deal from supplier count, plausibility of the savings
/// and the price trend. Always within `[0, 1]`.
#[must_use]
pub fn deal_confidence(analysis: &PriceAnalysis) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let supplier_factor = (analysis.supplier_count as f64 / 5.0).min(1.0);

    let savings = analysis.savings_pct;
    let savings_factor = if savings <= 50.0 {
        savings / 50.0
    } else {
        // savings this large usually mean a unit or data error
        (1.0 - (savings - 50.0) / 100.0).max(0.5)
    };

    let trend_factor = match analysis.trend {
        PriceTrend::Stable | PriceTrend::Decreasing => 1.0,
        PriceTrend::Increasing => 0.7,
    };

    (supplier_factor * 0.3 + savings_factor * 0.4 + trend_factor * 0.3).clamp(0.0, 1.0)
}

fn recommendation_reasoning(analysis: &PriceAnalysis) -> String {
    let mut reasons = Vec::new();
    if analysis.savings_pct > 0.0 {
        reasons.push(format!(
            "saves {:.1}% versus the most expensive offer",
            analysis.savings_pct
        ));
    }
    if analysis.supplier_count > 3 {
        reasons.push(format!("{} suppliers compared", analysis.supplier_count));
    }
    reasons.push(
        match analysis.trend {
            PriceTrend::Decreasing => "prices are falling",
            PriceTrend::Stable => "prices are stable",
            PriceTrend::Increasing => "prices are rising; buy soon",
        }
        .to_string(),
    );
    reasons.join("; ")
}

fn majority_basis(offers: &[PricedOffer]) -> Option<Basis> {
    let mut counts: HashMap<Basis, usize> = HashMap::new();
    for o in offers {
        *counts.entry(o.normalized.basis).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(ba, ca), (bb, cb)| ca.cmp(cb).then_with(|| bb.as_str().cmp(ba.as_str())))
        .map(|(basis, _)| basis)
}

fn savings_percentage(best: Decimal, worst: Decimal) -> f64 {
    (worst - best)
        .checked_div(worst)
        .map(|r| r * Decimal::ONE_HUNDRED)
        .and_then(|pct| pct.to_f64())
        .unwrap_or(0.0)
        .max(0.0)
}

fn average(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let n = Decimal::from(values.len());
    match values.iter().try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v)) {
        Some(sum) => sum / n,
        None => values
            .iter()
            .map(|v| *v / n)
            .fold(Decimal::ZERO, Decimal::saturating_add),
    }
}

/// Median of values already sorted ascending.
fn median(sorted: &[Decimal]) -> Decimal {
    let n = sorted.len();
    if n == 0 {
        return Decimal::ZERO;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        let (low, high) = (sorted[n / 2 - 1], sorted[n / 2]);
        low + (high - low) / Decimal::TWO
    }
}

#[cfg(test)]
#[path = "pricing_test.rs"]
mod tests;
