//! Weighted similarity between two product descriptions.
//!
//! `total = 0.5 * name + 0.3 * brand + 0.2 * size`, always within `[0, 1]`
//! and independent of argument order.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use monito_core::{BrandAliases, MasterProduct, ProductRecord, Unit};

use crate::error::NormalizeError;
use crate::text::{fold_brand, fold_name, token_sorted};
use crate::units::{quantity, relative_difference};

const NAME_WEIGHT: f64 = 5.0;
const BRAND_WEIGHT: f64 = 3.0;
const SIZE_WEIGHT: f64 = 2.0;
const WEIGHT_SUM: f64 = NAME_WEIGHT + BRAND_WEIGHT + SIZE_WEIGHT;

/// Credit when one brand contains the other.
const PARTIAL_BRAND: f64 = 0.5;
/// Credit when either brand is unknown.
const NEUTRAL_BRAND: f64 = 0.5;

/// Size difference treated as the same pack.
pub const SIZE_TOLERANCE: f64 = 0.10;
/// Size difference at which the size score reaches zero.
pub const SIZE_CUTOFF: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityBreakdown {
    pub name: f64,
    pub brand: f64,
    pub size: f64,
    pub total: f64,
}

/// Anything that can be described by a name, brand and pack size.
pub trait Describe {
    fn name(&self) -> &str;
    fn brand(&self) -> Option<&str>;
    fn size(&self) -> Option<Decimal>;
    fn unit(&self) -> Option<Unit>;
}

impl Describe for ProductRecord {
    fn name(&self) -> &str {
        &self.standardized_name
    }
    fn brand(&self) -> Option<&str> {
        ProductRecord::brand(self)
    }
    fn size(&self) -> Option<Decimal> {
        self.size
    }
    fn unit(&self) -> Option<Unit> {
        self.unit
    }
}

impl Describe for MasterProduct {
    fn name(&self) -> &str {
        &self.standard_name
    }
    fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }
    fn size(&self) -> Option<Decimal> {
        self.size
    }
    fn unit(&self) -> Option<Unit> {
        self.unit
    }
}

/// Pre-folded view of a product, computed once and scored many times.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    pub name: String,
    sorted_name: String,
    pub brand: Option<String>,
    pub size: Option<Decimal>,
    pub unit: Option<Unit>,
}

#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    aliases: Arc<BrandAliases>,
}

impl SimilarityScorer {
    #[must_use]
    pub fn new(aliases: Arc<BrandAliases>) -> Self {
        Self { aliases }
    }

    #[must_use]
    pub fn aliases(&self) -> &BrandAliases {
        &self.aliases
    }

    #[must_use]
    pub fn features<D: Describe + ?Sized>(&self, item: &D) -> Features {
        let name = fold_name(item.name());
        let sorted_name = token_sorted(&name);
        Features {
            name,
            sorted_name,
            brand: fold_brand(item.brand(), &self.aliases),
            size: item.size(),
            unit: item.unit(),
        }
    }

    /// Scores two items. Pure: same inputs, same result.
    #[must_use]
    pub fn score<A, B>(&self, a: &A, b: &B) -> SimilarityBreakdown
    where
        A: Describe + ?Sized,
        B: Describe + ?Sized,
    {
        score_features(&self.features(a), &self.features(b))
    }
}

/// Scores two pre-folded products.
#[must_use]
pub fn score_features(a: &Features, b: &Features) -> SimilarityBreakdown {
    let name = name_similarity(a, b);
    let brand = brand_similarity(a.brand.as_deref(), b.brand.as_deref());
    let size = size_similarity(a, b);
    let total = ((NAME_WEIGHT * name + BRAND_WEIGHT * brand + SIZE_WEIGHT * size) / WEIGHT_SUM)
        .clamp(0.0, 1.0);
    SimilarityBreakdown {
        name,
        brand,
        size,
        total,
    }
}

/// Larger of the plain and token-sorted normalized Levenshtein ratios.
pub fn name_similarity(a: &Features, b: &Features) -> f64 {
    let plain = strsim::normalized_levenshtein(&a.name, &b.name);
    let sorted = strsim::normalized_levenshtein(&a.sorted_name, &b.sorted_name);
    plain.max(sorted).clamp(0.0, 1.0)
}

fn brand_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a == b => 1.0,
        (Some(a), Some(b)) if a.contains(b) || b.contains(a) => PARTIAL_BRAND,
        (Some(_), Some(_)) => 0.0,
        _ => NEUTRAL_BRAND,
    }
}

/// Full credit within the tolerance band, linear decay to zero at the cutoff.
/// Missing or incompatible sizes carry no signal.
fn size_similarity(a: &Features, b: &Features) -> f64 {
    match size_difference(a, b) {
        Ok(Some(diff)) => size_score_for(diff),
        Ok(None) => 0.0,
        Err(e) => {
            tracing::debug!(error = %e, "size not comparable; scoring as no signal");
            0.0
        }
    }
}

/// Relative pack-size difference, or `None` when either side has no size.
///
/// # Errors
///
/// Returns [`NormalizeError`] when the sizes cannot be compared.
pub fn size_difference(a: &Features, b: &Features) -> Result<Option<f64>, NormalizeError> {
    if a.size.is_none() || a.unit.is_none() || b.size.is_none() || b.unit.is_none() {
        return Ok(None);
    }
    let qa = quantity(a.size, a.unit)?;
    let qb = quantity(b.size, b.unit)?;
    let diff = relative_difference(qa, qb)?;
    Ok(Some(diff.to_f64().unwrap_or(1.0)))
}

fn size_score_for(diff: f64) -> f64 {
    if diff <= SIZE_TOLERANCE {
        1.0
    } else if diff >= SIZE_CUTOFF {
        0.0
    } else {
        1.0 - (diff - SIZE_TOLERANCE) / (SIZE_CUTOFF - SIZE_TOLERANCE)
    }
}
