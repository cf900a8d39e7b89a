use monito_core::{BrandAliases, NewMasterProduct, PriceHistoryEntry, PriceObservation, Unit};

use crate::matching::MatchingConfig;
use crate::memory::InMemoryCatalogStore;
use crate::similarity::SimilarityScorer;
use crate::text::{fold_brand, fold_name};

use super::*;

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-10T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn setup() -> (Arc<InMemoryCatalogStore>, PriceComparisonEngine) {
    let store = Arc::new(InMemoryCatalogStore::new());
    let scorer = SimilarityScorer::new(Arc::new(BrandAliases::builtin()));
    let matcher = MatchingEngine::new(store.clone(), scorer, MatchingConfig::default());
    let engine = PriceComparisonEngine::new(store.clone(), matcher, PricingConfig::default());
    (store, engine)
}

async fn product(
    store: &InMemoryCatalogStore,
    name: &str,
    brand: Option<&str>,
    category: &str,
    size: i64,
    unit: Unit,
) -> Uuid {
    let aliases = BrandAliases::builtin();
    store
        .upsert_master_product(&NewMasterProduct {
            standard_name: name.to_string(),
            normalized_name: fold_name(name),
            brand: brand.map(str::to_string),
            normalized_brand: fold_brand(brand, &aliases),
            category: category.to_string(),
            size: Some(Decimal::from(size)),
            unit: Some(unit),
        })
        .await
        .unwrap()
        .product_id()
}

async fn offer(
    store: &InMemoryCatalogStore,
    id: Uuid,
    supplier: &str,
    price: i64,
    size: i64,
    unit: Unit,
    seen_at: DateTime<Utc>,
) {
    store
        .upsert_supplier_price(
            id,
            supplier,
            &PriceObservation {
                original_name: format!("{supplier} listing"),
                price: Decimal::from(price),
                currency: "IDR".to_string(),
                size: Some(Decimal::from(size)),
                unit: Some(unit),
                price_date: seen_at.date_naive(),
                confidence_score: 0.9,
                seen_at,
            },
        )
        .await
        .unwrap();
}

async fn coca_cola_with_three_suppliers(store: &InMemoryCatalogStore) -> Uuid {
    let id = product(store, "Coca Cola 330ml", Some("Coca-Cola"), "beverages", 330, Unit::Ml).await;
    let t = now() - Duration::days(1);
    offer(store, id, "Supplier A", 15_000, 330, Unit::Ml, t).await;
    offer(store, id, "Supplier B", 14_000, 330, Unit::Ml, t).await;
    offer(store, id, "Supplier C", 13_500, 330, Unit::Ml, t).await;
    id
}

async fn sugar_in_two_packs(store: &InMemoryCatalogStore) -> Uuid {
    let id = product(store, "Gula Pasir 1kg", Some("Gulaku"), "groceries", 1, Unit::Kg).await;
    let t = now() - Duration::days(2);
    offer(store, id, "Supplier A", 5_000, 500, Unit::G, t).await;
    offer(store, id, "Supplier B", 9_000, 1, Unit::Kg, t).await;
    id
}

fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-6
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[tokio::test]
async fn best_price_compares_per_gram_not_per_pack() {
    let (store, engine) = setup();
    let id = sugar_in_two_packs(&store).await;

    let a = engine.analyze_at(id, now()).await.unwrap().unwrap();
    assert_eq!(a.basis, Basis::PerGram);
    assert_eq!(a.best.offer.supplier_name, "Supplier B");
    assert_eq!(a.worst.offer.supplier_name, "Supplier A");
    assert_eq!(a.best.normalized.value, Decimal::from(9));
    assert!(approx(a.savings_pct, 10.0), "savings {}", a.savings_pct);
}

#[tokio::test]
async fn three_suppliers_yield_ten_percent_savings() {
    let (store, engine) = setup();
    let id = coca_cola_with_three_suppliers(&store).await;

    let a = engine.analyze_at(id, now()).await.unwrap().unwrap();
    assert_eq!(a.best.offer.supplier_name, "Supplier C");
    assert_eq!(a.best.offer.price, Decimal::from(13_500));
    assert_eq!(a.worst.offer.price, Decimal::from(15_000));
    assert_eq!(a.supplier_count, 3);
    assert!(approx(a.savings_pct, 10.0), "savings {}", a.savings_pct);
    assert_eq!(a.trend, PriceTrend::Stable);
    assert_eq!(a.competitive_suppliers.len(), 3);
    assert_eq!(a.median_normalized, a.competitive_suppliers[1].normalized.value);
    assert!(a.best.normalized.value <= a.average_normalized);
    assert!(a.average_normalized <= a.worst.normalized.value);
}

#[tokio::test]
async fn single_supplier_has_zero_savings() {
    let (store, engine) = setup();
    let id = product(&store, "Aqua 600ml", Some("Aqua"), "beverages", 600, Unit::Ml).await;
    offer(&store, id, "Supplier A", 3_500, 600, Unit::Ml, now()).await;

    let a = engine.analyze_at(id, now()).await.unwrap().unwrap();
    assert_eq!(a.supplier_count, 1);
    assert!(approx(a.savings_pct, 0.0));
    assert_eq!(a.best, a.worst);
}

#[tokio::test]
async fn stale_prices_are_not_current() {
    let (store, engine) = setup();
    let id = product(&store, "Aqua 600ml", Some("Aqua"), "beverages", 600, Unit::Ml).await;
    offer(&store, id, "Supplier A", 3_500, 600, Unit::Ml, now() - Duration::days(40)).await;

    assert!(engine.analyze_at(id, now()).await.unwrap().is_none());

    offer(&store, id, "Supplier B", 3_900, 600, Unit::Ml, now() - Duration::days(3)).await;
    let a = engine.analyze_at(id, now()).await.unwrap().unwrap();
    assert_eq!(a.supplier_count, 1);
    assert_eq!(a.best.offer.supplier_name, "Supplier B");
}

#[tokio::test]
async fn product_without_prices_has_no_analysis() {
    let (store, engine) = setup();
    let id = product(&store, "Aqua 600ml", Some("Aqua"), "beverages", 600, Unit::Ml).await;
    assert!(engine.analyze_at(id, now()).await.unwrap().is_none());
}

#[tokio::test]
async fn only_latest_row_per_supplier_counts() {
    let (store, engine) = setup();
    let id = product(&store, "Aqua 600ml", Some("Aqua"), "beverages", 600, Unit::Ml).await;
    offer(&store, id, "Supplier A", 2_000, 600, Unit::Ml, now() - Duration::days(5)).await;
    offer(&store, id, "Supplier A", 3_600, 600, Unit::Ml, now() - Duration::days(1)).await;
    offer(&store, id, "Supplier B", 3_000, 600, Unit::Ml, now() - Duration::days(1)).await;

    let a = engine.analyze_at(id, now()).await.unwrap().unwrap();
    assert_eq!(a.supplier_count, 2);
    assert_eq!(a.best.offer.supplier_name, "Supplier B");
    assert_eq!(a.worst.offer.price, Decimal::from(3_600));
}

#[tokio::test]
async fn minority_basis_offers_are_excluded() {
    let (store, engine) = setup();
    let id = sugar_in_two_packs(&store).await;
    offer(&store, id, "Supplier C", 1_000, 1, Unit::Pcs, now()).await;

    let a = engine.analyze_at(id, now()).await.unwrap().unwrap();
    assert_eq!(a.basis, Basis::PerGram);
    assert_eq!(a.supplier_count, 2);
    assert!(a
        .competitive_suppliers
        .iter()
        .all(|o| o.offer.supplier_name != "Supplier C"));
}

#[tokio::test]
async fn savings_are_never_negative() {
    let (store, engine) = setup();
    let id = product(&store, "Aqua 600ml", Some("Aqua"), "beverages", 600, Unit::Ml).await;
    offer(&store, id, "Supplier A", 3_000, 600, Unit::Ml, now()).await;
    offer(&store, id, "Supplier B", 3_000, 600, Unit::Ml, now()).await;

    let a = engine.analyze_at(id, now()).await.unwrap().unwrap();
    assert!(a.savings_pct >= 0.0);
    assert!(approx(a.savings_pct, 0.0));
}

// ---------------------------------------------------------------------------
// Trend and confidence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rising_history_marks_trend_increasing() {
    let (store, engine) = setup();
    let id = coca_cola_with_three_suppliers(&store).await;
    for (days_ago, old, new) in [(20, 12_000, 13_500), (10, 13_500, 15_000)] {
        store
            .append_price_history(&PriceHistoryEntry::new(
                id,
                "Supplier A",
                Some(Decimal::from(old)),
                Decimal::from(new),
                now() - Duration::days(days_ago),
            ))
            .await
            .unwrap();
    }

    assert_eq!(
        engine.price_trend_at(id, now()).await.unwrap(),
        PriceTrend::Increasing
    );
}

#[tokio::test]
async fn history_outside_window_is_ignored() {
    let (store, engine) = setup();
    let id = coca_cola_with_three_suppliers(&store).await;
    store
        .append_price_history(&PriceHistoryEntry::new(
            id,
            "Supplier A",
            Some(Decimal::from(20_000)),
            Decimal::from(15_000),
            now() - Duration::days(120),
        ))
        .await
        .unwrap();

    assert_eq!(
        engine.price_trend_at(id, now()).await.unwrap(),
        PriceTrend::Stable
    );
}

#[tokio::test]
async fn deal_confidence_weighs_suppliers_savings_and_trend() {
    let (store, engine) = setup();
    let id = coca_cola_with_three_suppliers(&store).await;
    let mut a = engine.analyze_at(id, now()).await.unwrap().unwrap();

    // 3/5 * 0.3 + 10/50 * 0.4 + 1.0 * 0.3
    assert!(approx(deal_confidence(&a), 0.56), "{}", deal_confidence(&a));

    a.trend = PriceTrend::Increasing;
    assert!(approx(deal_confidence(&a), 0.47));

    a.supplier_count = 8;
    a.savings_pct = 50.0;
    a.trend = PriceTrend::Stable;
    assert!(approx(deal_confidence(&a), 1.0));

    a.savings_pct = 90.0;
    assert!(deal_confidence(&a) < 1.0);
    assert!(deal_confidence(&a) >= 0.0);
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recommendation_picks_cheapest_supplier() {
    let (store, engine) = setup();
    let id = coca_cola_with_three_suppliers(&store).await;

    let required = vec![RequiredProduct {
        name: "coca cola".to_string(),
        quantity: Decimal::from(2),
    }];
    let recs = engine
        .generate_recommendations_at(&required, None, now())
        .await
        .unwrap();

    assert_eq!(recs.len(), 1);
    let r = &recs[0];
    assert_eq!(r.product_id, id);
    assert_eq!(r.supplier_name, "Supplier C");
    assert_eq!(r.total_cost, Decimal::from(27_000));
    assert_eq!(r.alternatives.len(), 2);
    assert_eq!(r.expires_at, now() + Duration::days(7));
    assert!(r.reasoning.contains("saves 10.0%"), "{}", r.reasoning);
    assert!(r.reasoning.contains("prices are stable"));
    assert!((0.0..=1.0).contains(&r.confidence));
}

#[tokio::test]
async fn unknown_items_are_skipped() {
    let (store, engine) = setup();
    coca_cola_with_three_suppliers(&store).await;

    let required = vec![
        RequiredProduct {
            name: "minyak goreng".to_string(),
            quantity: Decimal::ONE,
        },
        RequiredProduct {
            name: "coca cola 330ml".to_string(),
            quantity: Decimal::ONE,
        },
    ];
    let recs = engine
        .generate_recommendations_at(&required, None, now())
        .await
        .unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].supplier_name, "Supplier C");
}

#[tokio::test]
async fn budget_falls_back_to_an_affordable_pack() {
    let (store, engine) = setup();
    sugar_in_two_packs(&store).await;

    let required = vec![RequiredProduct {
        name: "gula pasir".to_string(),
        quantity: Decimal::ONE,
    }];
    let recs = engine
        .generate_recommendations_at(&required, Some(Decimal::from(6_000)), now())
        .await
        .unwrap();

    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].supplier_name, "Supplier A");
    assert_eq!(recs[0].total_cost, Decimal::from(5_000));
    assert!(recs[0]
        .alternatives
        .iter()
        .all(|o| o.offer.supplier_name != "Supplier A"));
}

#[tokio::test]
async fn items_beyond_budget_are_dropped() {
    let (store, engine) = setup();
    coca_cola_with_three_suppliers(&store).await;
    let aqua = product(&store, "Aqua 600ml", Some("Aqua"), "beverages", 600, Unit::Ml).await;
    offer(&store, aqua, "Supplier A", 3_000, 600, Unit::Ml, now()).await;

    let required = vec![
        RequiredProduct {
            name: "coca cola".to_string(),
            quantity: Decimal::from(2),
        },
        RequiredProduct {
            name: "aqua".to_string(),
            quantity: Decimal::ONE,
        },
    ];
    let recs = engine
        .generate_recommendations_at(&required, Some(Decimal::from(27_500)), now())
        .await
        .unwrap();

    assert_eq!(recs.len(), 1);
    let spent: Decimal = recs.iter().map(|r| r.total_cost).sum();
    assert!(spent <= Decimal::from(27_500));
}

#[test]
fn required_product_quantity_defaults_to_one() {
    let item: RequiredProduct = serde_json::from_str(r#"{"name":"aqua"}"#).unwrap();
    assert_eq!(item.quantity, Decimal::ONE);
}

#[test]
fn median_of_even_count_averages_middle_pair() {
    let values = [1, 2, 4, 10].map(Decimal::from);
    assert_eq!(median(&values), Decimal::from(3));
    assert_eq!(average(&values), Decimal::new(425, 2));
}


#[test]
fn average_and_median_survive_values_near_the_limit() {
    let values = [Decimal::ONE, Decimal::MAX, Decimal::MAX];
    let avg = average(&values);
    assert!(avg > Decimal::from_i128_with_scale(5 * 10_i128.pow(28), 0));
    assert!(median(&values[1..]) > Decimal::ZERO);
}

#[tokio::test]
async fn item_with_out_of_range_cost_is_skipped() {
    let (store, engine) = setup();
    coca_cola_with_three_suppliers(&store).await;
    let aqua = product(&store, "Aqua 600ml", Some("Aqua"), "beverages", 600, Unit::Ml).await;
    offer(&store, aqua, "Supplier A", 3_000, 600, Unit::Ml, now()).await;

    let required = vec![
        RequiredProduct {
            name: "coca cola".to_string(),
            quantity: Decimal::MAX,
        },
        RequiredProduct {
            name: "aqua".to_string(),
            quantity: Decimal::ONE,
        },
    ];
    let recs = engine
        .generate_recommendations_at(&required, Some(Decimal::from(10_000)), now())
        .await
        .unwrap();

    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].product_id, aqua);
    assert_eq!(recs[0].total_cost, Decimal::from(3_000));
}
