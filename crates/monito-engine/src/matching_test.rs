use chrono::Duration;

use monito_core::{BrandAliases, NewMasterProduct};

use crate::memory::InMemoryCatalogStore;
use crate::text::{fold_brand, fold_name};

use super::*;

fn setup() -> (Arc<InMemoryCatalogStore>, MatchingEngine) {
    let store = Arc::new(InMemoryCatalogStore::new());
    let scorer = SimilarityScorer::new(Arc::new(BrandAliases::builtin()));
    let engine = MatchingEngine::new(store.clone(), scorer, MatchingConfig::default());
    (store, engine)
}

fn record(name: &str, brand: Option<&str>, size: Option<i64>, unit: Option<Unit>) -> ProductRecord {
    ProductRecord {
        original_name: name.to_string(),
        standardized_name: name.to_string(),
        brand: brand.map(str::to_string),
        size: size.map(Decimal::from),
        unit,
        price: Decimal::from(15_000),
        currency: "IDR".to_string(),
        category: "beverages".to_string(),
        confidence: 0.9,
    }
}

fn coca_cola() -> ProductRecord {
    record("Coca Cola 330ml", Some("COCA COLA"), Some(330), Some(Unit::Ml))
}

async fn create(store: &InMemoryCatalogStore, r: &ProductRecord) -> Uuid {
    let aliases = BrandAliases::builtin();
    store
        .upsert_master_product(&NewMasterProduct {
            standard_name: r.standardized_name.clone(),
            normalized_name: fold_name(&r.standardized_name),
            brand: r.brand.clone(),
            normalized_brand: fold_brand(r.brand(), &aliases),
            category: r.category.clone(),
            size: r.size,
            unit: r.unit,
        })
        .await
        .unwrap()
        .product_id()
}

fn master(r: &ProductRecord, updated_at: DateTime<Utc>) -> MasterProduct {
    let aliases = BrandAliases::builtin();
    MasterProduct {
        product_id: Uuid::new_v4(),
        standard_name: r.standardized_name.clone(),
        normalized_name: fold_name(&r.standardized_name),
        brand: r.brand.clone(),
        normalized_brand: fold_brand(r.brand(), &aliases),
        category: r.category.clone(),
        size: r.size,
        unit: r.unit,
        status: ProductStatus::Active,
        merged_into: None,
        created_at: updated_at,
        updated_at,
    }
}

fn matched(outcome: &MatchOutcome) -> &MatchDecision {
    outcome
        .decision()
        .unwrap_or_else(|| panic!("expected a match, got {outcome:?}"))
}

// ---------------------------------------------------------------------------
// Exact tier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spelling_variant_matches_exactly() {
    let (store, engine) = setup();
    let id = create(&store, &coca_cola()).await;

    let variant = record("COCA COLA 330 ML", Some("Coca-Cola"), Some(330), Some(Unit::Ml));
    let outcome = engine.find_matches(&variant).await.unwrap();

    let d = matched(&outcome);
    assert_eq!(d.product_id, id);
    assert_eq!(d.match_type, MatchType::Exact);
    assert!((d.score - 1.0).abs() < f64::EPSILON);
    assert!(!d.needs_review);
    assert_eq!(d.confidence, ConfidenceLevel::High);
}

#[tokio::test]
async fn resubmitting_a_record_matches_the_product_it_created() {
    let (store, engine) = setup();
    let r = coca_cola();
    assert_eq!(engine.find_matches(&r).await.unwrap(), MatchOutcome::NewProduct);
    let id = create(&store, &r).await;

    let outcome = engine.find_matches(&r).await.unwrap();
    let d = matched(&outcome);
    assert_eq!(d.product_id, id);
    assert_eq!(d.match_type, MatchType::Exact);
    assert_eq!(store.product_count().await, 1);
}

#[tokio::test]
async fn exact_tier_allows_two_percent_size_drift() {
    let (store, engine) = setup();
    let id = create(&store, &coca_cola()).await;

    let mut drifted = coca_cola();
    drifted.size = Some(Decimal::from(335));
    let d = engine.find_matches(&drifted).await.unwrap();
    assert_eq!(matched(&d).product_id, id);
    assert_eq!(matched(&d).match_type, MatchType::Exact);

    let mut resized = coca_cola();
    resized.size = Some(Decimal::from(390));
    let d = engine.find_matches(&resized).await.unwrap();
    assert_ne!(
        d.decision().map(|d| d.match_type),
        Some(MatchType::Exact),
        "18% larger pack must not be an exact match"
    );
}

#[tokio::test]
async fn ambiguous_exact_tier_picks_best_and_flags_review() {
    let (store, engine) = setup();
    let now = Utc::now();
    let first = master(&coca_cola(), now - Duration::days(2));
    let mut second = master(&coca_cola(), now);
    second.size = Some(Decimal::from(332));
    store.insert_product(first.clone()).await;
    store.insert_product(second).await;

    let outcome = engine.find_matches(&coca_cola()).await.unwrap();
    let d = matched(&outcome);
    assert_eq!(d.match_type, MatchType::Exact);
    assert_eq!(d.product_id, first.product_id, "identical size wins the tie");
    assert!(d.needs_review);
}

#[tokio::test]
async fn oversized_stored_pack_gives_no_size_signal() {
    let (store, engine) = setup();
    let mut huge = master(&coca_cola(), Utc::now());
    huge.size = Some(Decimal::from_i128_with_scale(10_i128.pow(26), 0));
    huge.unit = Some(Unit::L);
    store.insert_product(huge.clone()).await;

    let breakdown = engine.scorer().score(&coca_cola(), &huge);
    assert!(breakdown.size.abs() < f64::EPSILON);

    let outcome = engine.find_matches(&coca_cola()).await.unwrap();
    if let Some(d) = outcome.decision() {
        assert_eq!(d.match_type, MatchType::Fuzzy);
        assert!(d.needs_review);
    }
}

// ---------------------------------------------------------------------------
// Fuzzy tier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn near_duplicate_matches_fuzzy_and_needs_review() {
    let (store, engine) = setup();
    let mut existing = record(
        "Indomie Mie Goreng Spesial 85g",
        Some("Indomie"),
        Some(85),
        Some(Unit::G),
    );
    existing.category = "instant food".to_string();
    let id = create(&store, &existing).await;

    let mut incoming = record(
        "Indomie Goreng Special 85g",
        Some("INDOMIE"),
        Some(85),
        Some(Unit::G),
    );
    incoming.category = "instant food".to_string();
    let outcome = engine.find_matches(&incoming).await.unwrap();

    let d = matched(&outcome);
    assert_eq!(d.product_id, id);
    assert_eq!(d.match_type, MatchType::Fuzzy);
    assert!(d.score >= 0.8 && d.score < 0.95, "score {}", d.score);
    assert!(d.needs_review);

    let audit = store.get_match(d.match_id).await.unwrap().unwrap();
    assert_eq!(audit.match_type, MatchType::Fuzzy);
    assert!(audit.partner_of(id).is_some());
    assert!((audit.similarity_score - d.score).abs() < f64::EPSILON);
}

#[tokio::test]
async fn every_match_below_auto_merge_has_an_audit_row() {
    let (store, engine) = setup();
    create(
        &store,
        &record("Sabun Mandi Lifebuoy Merah 85g", Some("Lifebuoy"), Some(85), Some(Unit::G)),
    )
    .await;
    create(
        &store,
        &record("Minyak Goreng Bimoli Klasik 2L", Some("Bimoli"), Some(2), Some(Unit::L)),
    )
    .await;

    let incoming = [
        record("Sabun Mandi Lifebuoy 85g", Some("Lifebuoy"), Some(85), Some(Unit::G)),
        record("Minyak Goreng Bimoli 2L", Some("Bimoli"), Some(2), Some(Unit::L)),
        record("Minyak Goreng Bimoli 2L Pouch", Some("Bimoli"), Some(2), Some(Unit::L)),
    ];
    for r in &incoming {
        if let MatchOutcome::Matched(d) = engine.find_matches(r).await.unwrap() {
            if d.score < 0.95 {
                assert!(d.needs_review, "{d:?}");
            }
            assert!(store.get_match(d.match_id).await.unwrap().is_some());
        }
    }
}

#[tokio::test]
async fn different_brand_is_a_new_product() {
    let (store, engine) = setup();
    create(&store, &coca_cola()).await;

    let pepsi = record("Pepsi 330ml", Some("PEPSI"), Some(330), Some(Unit::Ml));
    let breakdown = engine.scorer().score(&coca_cola(), &pepsi);
    assert!(breakdown.total < 0.8, "{breakdown:?}");
    assert_eq!(engine.find_matches(&pepsi).await.unwrap(), MatchOutcome::NewProduct);
}

#[tokio::test]
async fn fuzzy_tier_only_considers_same_category() {
    let (store, engine) = setup();
    let mut existing = record("Sabun Mandi Lifebuoy Merah 85g", Some("Lifebuoy"), Some(85), Some(Unit::G));
    existing.category = "toiletries".to_string();
    create(&store, &existing).await;

    let incoming = record("Sabun Mandi Lifebuoy 85g", Some("Lifebuoy"), Some(85), Some(Unit::G));
    assert_eq!(engine.find_matches(&incoming).await.unwrap(), MatchOutcome::NewProduct);
}

#[tokio::test]
async fn fuzzy_tie_prefers_smaller_size_difference() {
    let (store, engine) = setup();
    let now = Utc::now();
    let near = master(
        &record("Gula Pasir Putih Lokal", Some("Gulaku"), Some(1000), Some(Unit::G)),
        now - Duration::days(5),
    );
    let far = master(
        &record("Gula Pasir Putih Lokal", Some("Gulaku"), Some(1080), Some(Unit::G)),
        now,
    );
    store.insert_product(near.clone()).await;
    store.insert_product(far).await;

    let incoming = record("Gula Pasir Putih", Some("Gulaku"), Some(1000), Some(Unit::G));
    let outcome = engine.find_matches(&incoming).await.unwrap();
    let d = matched(&outcome);
    assert_eq!(d.match_type, MatchType::Fuzzy);
    assert_eq!(d.product_id, near.product_id);
}

#[tokio::test]
async fn fuzzy_tie_then_prefers_most_recently_updated() {
    let (store, engine) = setup();
    let now = Utc::now();
    let base = record("Gula Pasir Putih Lokal", Some("Gulaku"), Some(1000), Some(Unit::G));
    let stale = master(&base, now - Duration::days(30));
    let fresh = master(&base, now);
    store.insert_product(stale).await;
    store.insert_product(fresh.clone()).await;

    let incoming = record("Gula Pasir Putih", Some("Gulaku"), Some(1000), Some(Unit::G));
    let outcome = engine.find_matches(&incoming).await.unwrap();
    assert_eq!(matched(&outcome).product_id, fresh.product_id);
}

#[tokio::test]
async fn incompatible_units_do_not_abort_matching() {
    let (store, engine) = setup();
    create(&store, &record("Aqua Botol", Some("Aqua"), Some(600), Some(Unit::Ml))).await;
    create(&store, &record("Aqua Botol Kecil", Some("Aqua"), Some(12), Some(Unit::Pcs))).await;

    let incoming = record("Aqua Botol", Some("Aqua"), Some(600), Some(Unit::G));
    let outcome = engine.find_matches(&incoming).await;
    assert!(outcome.is_ok(), "{outcome:?}");
}

// ---------------------------------------------------------------------------
// Review workflow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_fuzzy_pair_is_not_proposed_again() {
    let (store, engine) = setup();
    let existing = record("Sabun Mandi Lifebuoy Merah 85g", Some("Lifebuoy"), Some(85), Some(Unit::G));
    create(&store, &existing).await;
    let incoming = record("Sabun Mandi Lifebuoy 85g", Some("Lifebuoy"), Some(85), Some(Unit::G));

    let first = engine.find_matches(&incoming).await.unwrap();
    let match_id = matched(&first).match_id;
    let rejected = engine.reject_match(match_id).await.unwrap();
    assert_eq!(rejected.match_type, MatchType::Rejected);
    assert!(rejected.reviewed);

    let second = engine.find_matches(&incoming).await.unwrap();
    assert_eq!(second, MatchOutcome::NewProduct);
    let stored = store.get_match(match_id).await.unwrap().unwrap();
    assert_eq!(stored.match_type, MatchType::Rejected);
}

#[tokio::test]
async fn changed_record_may_match_again_after_rejection() {
    let (store, engine) = setup();
    let id = create(&store, &coca_cola()).await;

    let mut drifted = coca_cola();
    drifted.size = Some(Decimal::from(335));
    let first = engine.find_matches(&drifted).await.unwrap();
    engine.reject_match(matched(&first).match_id).await.unwrap();
    assert_eq!(engine.find_matches(&drifted).await.unwrap(), MatchOutcome::NewProduct);

    let outcome = engine.find_matches(&coca_cola()).await.unwrap();
    let d = matched(&outcome);
    assert_eq!(d.product_id, id);
    assert_eq!(d.match_type, MatchType::Exact);
}

#[tokio::test]
async fn suggest_merges_lists_unreviewed_above_floor() {
    let (store, engine) = setup();
    create(&store, &record("Sabun Mandi Lifebuoy Merah 85g", Some("Lifebuoy"), Some(85), Some(Unit::G))).await;
    let incoming = record("Sabun Mandi Lifebuoy 85g", Some("Lifebuoy"), Some(85), Some(Unit::G));
    let d = engine.find_matches(&incoming).await.unwrap();
    let match_id = matched(&d).match_id;

    let suggestions = engine.suggest_merges(0.85).await.unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].match_id, match_id);
    assert!(engine.suggest_merges(0.99).await.unwrap().is_empty());

    let approved = engine.approve_match(match_id).await.unwrap();
    assert!(approved.reviewed);
    assert_eq!(approved.match_type, MatchType::Fuzzy);
    assert!(engine.suggest_merges(0.0).await.unwrap().is_empty());
}

#[tokio::test]
async fn reviewing_unknown_match_fails() {
    let (_store, engine) = setup();
    let missing = Uuid::new_v4();
    assert!(matches!(
        engine.reject_match(missing).await,
        Err(EngineError::MatchNotFound(id)) if id == missing
    ));
    assert!(matches!(
        engine.approve_match(missing).await,
        Err(EngineError::MatchNotFound(_))
    ));
}

#[tokio::test]
async fn invalid_record_is_rejected_before_matching() {
    let (_store, engine) = setup();
    let mut bad = coca_cola();
    bad.price = Decimal::ZERO;
    assert!(matches!(
        engine.find_matches(&bad).await,
        Err(EngineError::Validation(_))
    ));
}

// ---------------------------------------------------------------------------
// Batch scan, merge, lookup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scan_duplicates_records_pairs_within_category() {
    let (store, engine) = setup();
    create(&store, &record("Sabun Mandi Lifebuoy Merah 85g", Some("Lifebuoy"), Some(85), Some(Unit::G))).await;
    create(&store, &record("Sabun Mandi Lifebuoy 85g", Some("Lifebuoy"), Some(85), Some(Unit::G))).await;
    let mut other = record("Sabun Mandi Lifebuoy 85g", Some("Lifebuoy"), Some(85), Some(Unit::G));
    other.category = "toiletries".to_string();
    create(&store, &other).await;

    let stats = engine.scan_duplicates().await.unwrap();
    assert_eq!(stats.products_processed, 3);
    assert_eq!(stats.matches_recorded, 1);
    assert_eq!(stats.errors, 0);

    let suggestion = engine.suggest_merges(0.8).await.unwrap().remove(0);
    engine.reject_match(suggestion.match_id).await.unwrap();
    let rescan = engine.scan_duplicates().await.unwrap();
    assert_eq!(rescan.matches_recorded, 0);
}

#[tokio::test]
async fn merge_products_marks_source_and_audits() {
    let (store, engine) = setup();
    let source = create(&store, &record("Sabun Mandi Lifebuoy 85g", Some("Lifebuoy"), Some(85), Some(Unit::G))).await;
    let target = create(&store, &record("Sabun Mandi Lifebuoy Merah 85g", Some("Lifebuoy"), Some(85), Some(Unit::G))).await;

    let at = DateTime::parse_from_rfc3339("2026-03-10T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let merged_into = engine.merge_products_at(source, target, at).await.unwrap();
    assert_eq!(merged_into.product_id, target);

    let old = store.get_master_product(source).await.unwrap().unwrap();
    assert_eq!(old.status, ProductStatus::Merged);
    assert_eq!(old.merged_into, Some(target));

    let audit = store
        .all_matches()
        .await
        .into_iter()
        .find(|m| m.partner_of(source) == Some(target))
        .unwrap();
    assert_eq!(audit.match_type, MatchType::Manual);
    assert!(audit.reviewed);
    assert_eq!(audit.created_at, at);

    assert!(matches!(
        engine.merge_products(source, target).await,
        Err(EngineError::InvalidMerge(_))
    ));
}

#[tokio::test]
async fn merge_rejects_self_and_inactive_targets() {
    let (store, engine) = setup();
    let a = create(&store, &coca_cola()).await;
    let b = create(&store, &record("Pepsi 330ml", Some("PEPSI"), Some(330), Some(Unit::Ml))).await;
    let c = create(&store, &record("Sprite 330ml", Some("Sprite"), Some(330), Some(Unit::Ml))).await;

    assert!(matches!(
        engine.merge_products(a, a).await,
        Err(EngineError::InvalidMerge(_))
    ));
    engine.merge_products(b, c).await.unwrap();
    assert!(matches!(
        engine.merge_products(a, b).await,
        Err(EngineError::InvalidMerge(_))
    ));
    assert!(matches!(
        engine.merge_products(a, Uuid::new_v4()).await,
        Err(EngineError::ProductNotFound(_))
    ));
}

#[tokio::test]
async fn lookup_by_name_prefers_products_covering_the_query() {
    let (store, engine) = setup();
    let coke = create(&store, &coca_cola()).await;
    create(&store, &record("Pepsi 330ml", Some("PEPSI"), Some(330), Some(Unit::Ml))).await;

    let (found, _) = engine.lookup_by_name("coca-cola").await.unwrap().unwrap();
    assert_eq!(found.product_id, coke);
    assert!(engine.lookup_by_name("fanta").await.unwrap().is_none());
    assert!(engine.lookup_by_name("  ").await.unwrap().is_none());
}

#[test]
fn confidence_levels_follow_thresholds() {
    assert_eq!(confidence_level(0.97), ConfidenceLevel::High);
    assert_eq!(confidence_level(0.95), ConfidenceLevel::High);
    assert_eq!(confidence_level(0.9), ConfidenceLevel::Medium);
    assert_eq!(confidence_level(0.8), ConfidenceLevel::Low);
    assert_eq!(confidence_level(0.5), ConfidenceLevel::VeryLow);
}

#[tokio::test]
async fn find_matches_runs_concurrently() {
    let (store, engine) = setup();
    create(&store, &coca_cola()).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.find_matches(&coca_cola()).await
        }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(matched(&outcome).match_type, MatchType::Exact);
    }
    assert_eq!(store.all_matches().await.len(), 1);
}
