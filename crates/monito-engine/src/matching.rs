//! Tiered matching of incoming records against the master catalog.
//!
//! Exact tier first (same folded name and brand, pack size within 2%), then
//! the fuzzy tier over same-category candidates. Every match leaves an audit
//! row; matches below the auto-merge threshold are flagged for review.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use monito_core::{
    AppConfig, MasterProduct, MatchType, ProductMatch, ProductRecord, ProductStatus, Unit,
};

use crate::error::EngineError;
use crate::similarity::{
    name_similarity, score_features, size_difference, Describe, Features, SimilarityBreakdown,
    SimilarityScorer,
};
use crate::store::{CatalogStore, ProductFilter, ReviewDecision};
use crate::text::record_fingerprint;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    /// Minimum total similarity for a fuzzy match.
    pub fuzzy_threshold: f64,
    /// Matches scoring below this are flagged `needs_review`.
    pub auto_merge_threshold: f64,
    /// Relative pack-size tolerance for the exact tier.
    pub exact_size_tolerance: f64,
    /// Fuzzy scores this close count as tied.
    pub tie_epsilon: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.8,
            auto_merge_threshold: 0.95,
            exact_size_tolerance: 0.02,
            tie_epsilon: 0.01,
        }
    }
}

impl MatchingConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            fuzzy_threshold: config.fuzzy_threshold,
            auto_merge_threshold: config.auto_merge_threshold,
            ..Self::default()
        }
    }
}

/// Display bucket for a match score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::VeryLow => "very_low",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn confidence_level(score: f64) -> ConfidenceLevel {
    if score >= 0.95 {
        ConfidenceLevel::High
    } else if score >= 0.85 {
        ConfidenceLevel::Medium
    } else if score >= 0.75 {
        ConfidenceLevel::Low
    } else {
        ConfidenceLevel::VeryLow
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDecision {
    pub product_id: Uuid,
    /// Id of the audit row written for this decision.
    pub match_id: Uuid,
    pub match_type: MatchType,
    pub score: f64,
    pub needs_review: bool,
    pub confidence: ConfidenceLevel,
    pub breakdown: SimilarityBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched(MatchDecision),
    NewProduct,
}

impl MatchOutcome {
    #[must_use]
    pub fn decision(&self) -> Option<&MatchDecision> {
        match self {
            MatchOutcome::Matched(d) => Some(d),
            MatchOutcome::NewProduct => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub products_processed: usize,
    pub matches_recorded: usize,
    pub errors: usize,
}

/// A scored candidate.
#[derive(Debug, Clone)]
struct Scored {
    product: MasterProduct,
    breakdown: SimilarityBreakdown,
    size_diff: Option<f64>,
}

/// A bare name scored against catalog products.
pub(crate) struct NameQuery<'a>(pub(crate) &'a str);

impl Describe for NameQuery<'_> {
    fn name(&self) -> &str {
        self.0
    }
    fn brand(&self) -> Option<&str> {
        None
    }
    fn size(&self) -> Option<Decimal> {
        None
    }
    fn unit(&self) -> Option<Unit> {
        None
    }
}

#[derive(Clone)]
pub struct MatchingEngine {
    store: Arc<dyn CatalogStore>,
    scorer: SimilarityScorer,
    config: MatchingConfig,
}

impl MatchingEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn CatalogStore>,
        scorer: SimilarityScorer,
        config: MatchingConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    #[must_use]
    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    #[must_use]
    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Decides whether `record` is an existing master product or a new one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a malformed record and
    /// [`EngineError::Store`] when the catalog cannot be read or the audit
    /// row cannot be written.
    pub async fn find_matches(&self, record: &ProductRecord) -> Result<MatchOutcome, EngineError> {
        self.find_matches_at(record, Utc::now()).await
    }

    /// [`find_matches`](Self::find_matches) with an explicit audit timestamp.
    ///
    /// # Errors
    ///
    /// See [`find_matches`](Self::find_matches).
    pub async fn find_matches_at(
        &self,
        record: &ProductRecord,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, EngineError> {
        record.validate()?;

        let features = self.scorer.features(record);
        let fingerprint = record_fingerprint(record, self.scorer.aliases());
        let rejected: HashSet<Uuid> = self
            .store
            .rejected_partners(fingerprint)
            .await?
            .into_iter()
            .collect();

        if let Some((best, ambiguous)) = self.exact_tier(&features, &rejected).await? {
            let score = if ambiguous { best.breakdown.total } else { 1.0 };
            if ambiguous {
                tracing::warn!(
                    name = %record.standardized_name,
                    product_id = %best.product.product_id,
                    score,
                    "multiple exact-tier candidates; picked highest score"
                );
            }
            let decision = self
                .commit(fingerprint, &best, MatchType::Exact, score, ambiguous, now)
                .await?;
            return Ok(MatchOutcome::Matched(decision));
        }

        if let Some(best) = self.fuzzy_tier(record, &features, &rejected).await? {
            let score = best.breakdown.total;
            let decision = self
                .commit(fingerprint, &best, MatchType::Fuzzy, score, false, now)
                .await?;
            return Ok(MatchOutcome::Matched(decision));
        }

        tracing::info!(
            name = %record.standardized_name,
            category = %record.category,
            "no match; new product"
        );
        Ok(MatchOutcome::NewProduct)
    }

    /// Audits a record whose product creation found `product_id` already
    /// holding the same match key, so the record lands on that product.
    ///
    /// The decision is typed `exact` since the keys are identical. It is
    /// flagged for review when it scores below the auto-merge threshold,
    /// when the product is not active, or when a reviewer already rejected
    /// the pair.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ProductNotFound`] if the product vanished and
    /// [`EngineError::Store`] if the audit row cannot be written.
    pub async fn attach_to_key_holder(
        &self,
        record: &ProductRecord,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<MatchDecision, EngineError> {
        let product = self
            .store
            .get_master_product(product_id)
            .await?
            .ok_or(EngineError::ProductNotFound(product_id))?;
        let fingerprint = record_fingerprint(record, self.scorer.aliases());
        let rejected = self
            .store
            .rejected_partners(fingerprint)
            .await?
            .contains(&product_id);
        if rejected {
            tracing::warn!(
                name = %record.standardized_name,
                product_id = %product_id,
                "record shares its key with a product a reviewer rejected for it"
            );
        }

        let features = self.scorer.features(record);
        let candidate = self.scorer.features(&product);
        let scored = Scored {
            breakdown: score_features(&features, &candidate),
            size_diff: size_difference(&features, &candidate).ok().flatten(),
            product,
        };
        let force_review = rejected || !scored.product.is_active();
        self.commit(
            fingerprint,
            &scored,
            MatchType::Exact,
            scored.breakdown.total,
            force_review,
            now,
        )
        .await
    }

    /// Exact-key candidates within the size tolerance. The flag is `true`
    /// when more than one qualified.
    async fn exact_tier(
        &self,
        features: &Features,
        rejected: &HashSet<Uuid>,
    ) -> Result<Option<(Scored, bool)>, EngineError> {
        let candidates = self
            .store
            .get_candidates_by_exact_key(features.brand.as_deref(), &features.name)
            .await?;

        let qualified: Vec<Scored> = candidates
            .into_iter()
            .filter(|p| !rejected.contains(&p.product_id))
            .filter_map(|p| {
                let candidate = self.scorer.features(&p);
                let size_diff = match (features.size, candidate.size) {
                    (None, None) if features.unit == candidate.unit => None,
                    _ => Some(size_difference(features, &candidate).ok().flatten()?),
                };
                if size_diff.is_some_and(|d| d > self.config.exact_size_tolerance) {
                    return None;
                }
                Some(Scored {
                    breakdown: score_features(features, &candidate),
                    product: p,
                    size_diff,
                })
            })
            .collect();

        let ambiguous = qualified.len() > 1;
        Ok(self.select_best(qualified).map(|best| (best, ambiguous)))
    }

    async fn fuzzy_tier(
        &self,
        record: &ProductRecord,
        features: &Features,
        rejected: &HashSet<Uuid>,
    ) -> Result<Option<Scored>, EngineError> {
        let candidates = self.store.get_candidates(&record.category, None).await?;
        let total = candidates.len();

        let qualified: Vec<Scored> = candidates
            .into_iter()
            .filter(|p| !rejected.contains(&p.product_id))
            .filter_map(|p| {
                let candidate = self.scorer.features(&p);
                let breakdown = score_features(features, &candidate);
                tracing::debug!(
                    product_id = %p.product_id,
                    name = breakdown.name,
                    brand = breakdown.brand,
                    size = breakdown.size,
                    total = breakdown.total,
                    "scored fuzzy candidate"
                );
                (breakdown.total >= self.config.fuzzy_threshold).then(|| Scored {
                    size_diff: size_difference(features, &candidate).ok().flatten(),
                    breakdown,
                    product: p,
                })
            })
            .collect();

        tracing::debug!(
            category = %record.category,
            candidates = total,
            qualified = qualified.len(),
            rejected = rejected.len(),
            "fuzzy tier evaluated"
        );
        Ok(self.select_best(qualified))
    }

    /// Highest total wins; totals within the tie epsilon prefer the smaller
    /// size difference, then the most recently updated product.
    fn select_best(&self, scored: Vec<Scored>) -> Option<Scored> {
        let top = scored
            .iter()
            .map(|s| s.breakdown.total)
            .fold(f64::NEG_INFINITY, f64::max);
        scored
            .into_iter()
            .filter(|s| top - s.breakdown.total <= self.config.tie_epsilon)
            .min_by(|a, b| {
                let a_diff = a.size_diff.unwrap_or(f64::INFINITY);
                let b_diff = b.size_diff.unwrap_or(f64::INFINITY);
                a_diff
                    .total_cmp(&b_diff)
                    .then_with(|| b.product.updated_at.cmp(&a.product.updated_at))
                    .then_with(|| b.breakdown.total.total_cmp(&a.breakdown.total))
                    .then_with(|| a.product.product_id.cmp(&b.product.product_id))
            })
    }

    async fn commit(
        &self,
        fingerprint: Uuid,
        best: &Scored,
        match_type: MatchType,
        score: f64,
        force_review: bool,
        now: DateTime<Utc>,
    ) -> Result<MatchDecision, EngineError> {
        let product_id = best.product.product_id;
        let needs_review = force_review || score < self.config.auto_merge_threshold;
        let match_id = self
            .store
            .record_match(&ProductMatch::new(
                fingerprint,
                product_id,
                score,
                match_type,
                now,
            ))
            .await?;

        tracing::info!(
            product_id = %product_id,
            match_id = %match_id,
            match_type = %match_type,
            score,
            needs_review,
            "matched record to master product"
        );

        Ok(MatchDecision {
            product_id,
            match_id,
            match_type,
            score,
            needs_review,
            confidence: confidence_level(score),
            breakdown: best.breakdown,
        })
    }

    /// Unreviewed matches at or above `min_confidence`, best first. Read only.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the matches cannot be read.
    pub async fn suggest_merges(
        &self,
        min_confidence: f64,
    ) -> Result<Vec<ProductMatch>, EngineError> {
        Ok(self.store.list_unreviewed_matches(min_confidence).await?)
    }

    /// Marks a match reviewed without changing its type.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MatchNotFound`] for an unknown id.
    pub async fn approve_match(&self, match_id: Uuid) -> Result<ProductMatch, EngineError> {
        self.review(match_id, ReviewDecision::Approved).await
    }

    /// Marks a match rejected. The pair is never proposed as fuzzy again.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MatchNotFound`] for an unknown id.
    pub async fn reject_match(&self, match_id: Uuid) -> Result<ProductMatch, EngineError> {
        self.review(match_id, ReviewDecision::Rejected).await
    }

    async fn review(
        &self,
        match_id: Uuid,
        decision: ReviewDecision,
    ) -> Result<ProductMatch, EngineError> {
        if self.store.get_match(match_id).await?.is_none() {
            return Err(EngineError::MatchNotFound(match_id));
        }
        let updated = self.store.set_match_review(match_id, decision).await?;
        tracing::info!(
            match_id = %match_id,
            match_type = %updated.match_type,
            ?decision,
            "match reviewed"
        );
        Ok(updated)
    }

    /// Scores every active product against its same-category peers and
    /// records fuzzy matches between master products.
    ///
    /// Failures on one product are counted and logged; the pass continues.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] only if the product list cannot be read.
    pub async fn scan_duplicates(&self) -> Result<ScanStats, EngineError> {
        self.scan_duplicates_at(Utc::now()).await
    }

    /// [`scan_duplicates`](Self::scan_duplicates) with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// See [`scan_duplicates`](Self::scan_duplicates).
    pub async fn scan_duplicates_at(&self, now: DateTime<Utc>) -> Result<ScanStats, EngineError> {
        let products = self
            .store
            .list_master_products(&ProductFilter::active())
            .await?;

        let mut by_category: HashMap<&str, Vec<(&MasterProduct, Features)>> = HashMap::new();
        for p in &products {
            by_category
                .entry(p.category.as_str())
                .or_default()
                .push((p, self.scorer.features(p)));
        }

        let mut stats = ScanStats::default();
        for group in by_category.values() {
            for (i, (product, features)) in group.iter().enumerate() {
                stats.products_processed += 1;
                let rejected: HashSet<Uuid> =
                    match self.store.rejected_partners(product.product_id).await {
                        Ok(ids) => ids.into_iter().collect(),
                        Err(e) => {
                            tracing::warn!(
                                product_id = %product.product_id,
                                error = %e,
                                "duplicate scan: could not load rejections"
                            );
                            stats.errors += 1;
                            continue;
                        }
                    };

                for (peer, peer_features) in &group[i + 1..] {
                    if rejected.contains(&peer.product_id) {
                        continue;
                    }
                    let breakdown = score_features(features, peer_features);
                    if breakdown.total < self.config.fuzzy_threshold {
                        continue;
                    }
                    let record = ProductMatch::new(
                        product.product_id,
                        peer.product_id,
                        breakdown.total,
                        MatchType::Fuzzy,
                        now,
                    );
                    match self.store.record_match(&record).await {
                        Ok(_) => stats.matches_recorded += 1,
                        Err(e) => {
                            tracing::warn!(
                                product_id = %product.product_id,
                                peer_id = %peer.product_id,
                                error = %e,
                                "duplicate scan: could not record match"
                            );
                            stats.errors += 1;
                        }
                    }
                }
            }
        }

        tracing::info!(
            products = stats.products_processed,
            matches = stats.matches_recorded,
            errors = stats.errors,
            "duplicate scan complete"
        );
        Ok(stats)
    }

    /// Consolidates `source` into `target` and records a manual match for
    /// the pair. Returns the target product.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidMerge`] when merging a product into
    /// itself, merging an already merged product, or merging into a product
    /// that is not active; [`EngineError::ProductNotFound`] for unknown ids.
    pub async fn merge_products(
        &self,
        source: Uuid,
        target: Uuid,
    ) -> Result<MasterProduct, EngineError> {
        self.merge_products_at(source, target, Utc::now()).await
    }

    /// [`merge_products`](Self::merge_products) with an explicit audit
    /// timestamp.
    ///
    /// # Errors
    ///
    /// See [`merge_products`](Self::merge_products).
    pub async fn merge_products_at(
        &self,
        source: Uuid,
        target: Uuid,
        now: DateTime<Utc>,
    ) -> Result<MasterProduct, EngineError> {
        if source == target {
            return Err(EngineError::InvalidMerge(
                "cannot merge a product into itself".to_string(),
            ));
        }
        let source_product = self
            .store
            .get_master_product(source)
            .await?
            .ok_or(EngineError::ProductNotFound(source))?;
        let target_product = self
            .store
            .get_master_product(target)
            .await?
            .ok_or(EngineError::ProductNotFound(target))?;

        if source_product.status == ProductStatus::Merged {
            return Err(EngineError::InvalidMerge(format!(
                "source {source} is {}",
                source_product.status
            )));
        }
        if !target_product.is_active() {
            return Err(EngineError::InvalidMerge(format!(
                "target {target} is {}",
                target_product.status
            )));
        }

        let score = self.scorer.score(&source_product, &target_product).total;
        self.store.mark_merged(source, target).await?;

        let mut audit = ProductMatch::new(source, target, score, MatchType::Manual, now);
        audit.reviewed = true;
        self.store.record_match(&audit).await?;

        tracing::info!(
            source = %source,
            target = %target,
            score,
            "merged master products"
        );
        Ok(target_product)
    }

    /// Best active product for a free-text name, with its name similarity.
    ///
    /// Products whose folded name contains every query word rank first;
    /// otherwise the name similarity must reach the fuzzy threshold.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog cannot be read.
    pub async fn lookup_by_name(
        &self,
        name: &str,
    ) -> Result<Option<(MasterProduct, f64)>, EngineError> {
        let query = self.scorer.features(&NameQuery(name));
        if query.name.is_empty() {
            return Ok(None);
        }
        let query_tokens: Vec<&str> = query.name.split_whitespace().collect();

        let products = self
            .store
            .list_master_products(&ProductFilter::active())
            .await?;

        let best = products
            .into_iter()
            .filter_map(|p| {
                let features = self.scorer.features(&p);
                let similarity = name_similarity(&query, &features);
                let covers = {
                    let tokens: HashSet<&str> = features.name.split_whitespace().collect();
                    query_tokens.iter().all(|t| tokens.contains(t))
                };
                (covers || similarity >= self.config.fuzzy_threshold)
                    .then_some((p, covers, similarity))
            })
            .max_by(|(pa, ca, sa), (pb, cb, sb)| {
                ca.cmp(cb)
                    .then_with(|| sa.total_cmp(sb))
                    .then_with(|| pb.product_id.cmp(&pa.product_id))
            });

        Ok(best.map(|(p, _, similarity)| (p, similarity)))
    }
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "matching_test.rs"]
mod tests;
