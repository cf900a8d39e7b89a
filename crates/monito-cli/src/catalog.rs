//! Read-side commands: `catalog`, `analyze`, `deals`, `stats`, `recommend`.

use std::path::Path;

use anyhow::Context;
use rust_decimal::Decimal;
use uuid::Uuid;

use monito_engine::{CatalogFilter, CatalogRow, PricedOffer, RequiredProduct};

use crate::{print_json, truncate, Services};

pub(crate) async fn run_catalog(
    services: &Services,
    category: Option<&str>,
    brand: Option<&str>,
    search: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let rows = match search {
        Some(term) => services.catalog.search(term, category).await?,
        None => {
            let filter = CatalogFilter {
                category: category.map(str::to_string),
                brand: brand.map(str::to_string),
            };
            services.catalog.get_catalog(&filter).await?
        }
    };

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("no priced products found");
        return Ok(());
    }
    print_rows(&rows);
    Ok(())
}

pub(crate) async fn run_deals(
    services: &Services,
    min_savings: f64,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let rows = services.catalog.top_deals(min_savings, limit).await?;
    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("no deals with at least {min_savings:.1}% savings");
        return Ok(());
    }
    print_rows(&rows);
    Ok(())
}

fn print_rows(rows: &[CatalogRow]) {
    println!(
        "{:<36} {:<32} {:<14} {:>12} {:<18} {:>5} {:>8} {:<10} {:>5}",
        "ID", "NAME", "CATEGORY", "BEST PRICE", "SUPPLIER", "ALTS", "SAVINGS", "TREND", "CONF"
    );
    println!("{}", "-".repeat(150));
    for row in rows {
        println!(
            "{:<36} {:<32} {:<14} {:>12} {:<18} {:>5} {:>7.1}% {:<10} {:>5.2}",
            row.product_id,
            truncate(&row.standard_name, 29),
            truncate(&row.category, 11),
            row.best_price,
            truncate(&row.best_supplier, 15),
            row.alternative_suppliers_count,
            row.savings_vs_worst,
            row.trend,
            row.deal_confidence,
        );
    }
    println!();
    println!("{} product(s)", rows.len());
}

pub(crate) async fn run_analyze(
    services: &Services,
    product_id: Uuid,
    json: bool,
) -> anyhow::Result<()> {
    let product = services
        .matcher
        .store()
        .get_master_product(product_id)
        .await?
        .with_context(|| format!("master product {product_id} not found"))?;
    let analysis = services.pricing.analyze(product_id).await?;

    if json {
        return print_json(&serde_json::json!({
            "product": product,
            "analysis": analysis,
        }));
    }

    println!("{} ({})", product.standard_name, product.product_id);
    println!(
        "  brand: {}   category: {}   status: {}",
        product.brand.as_deref().unwrap_or("-"),
        product.category,
        product.status
    );
    let Some(analysis) = analysis else {
        println!("  no current prices");
        return Ok(());
    };

    println!(
        "  {} supplier(s), basis {}, trend {}, savings {:.1}%",
        analysis.supplier_count, analysis.basis, analysis.trend, analysis.savings_pct
    );
    println!(
        "  normalized average {}   median {}",
        analysis.average_normalized.round_sf(6).unwrap_or_default(),
        analysis.median_normalized.round_sf(6).unwrap_or_default()
    );
    println!();
    println!(
        "{:<8} {:<20} {:>12} {:<5} {:>14} {:<12}",
        "RANK", "SUPPLIER", "PRICE", "CUR", "NORMALIZED", "DATE"
    );
    println!("{}", "-".repeat(76));
    for (rank, offer) in analysis.competitive_suppliers.iter().enumerate() {
        print_offer(&format!("#{}", rank + 1), offer);
    }
    if analysis.supplier_count > analysis.competitive_suppliers.len() {
        print_offer("worst", &analysis.worst);
    }
    Ok(())
}

fn print_offer(label: &str, offer: &PricedOffer) {
    println!(
        "{:<8} {:<20} {:>12} {:<5} {:>14} {:<12}",
        label,
        truncate(&offer.offer.supplier_name, 17),
        offer.offer.price,
        offer.offer.currency,
        offer.normalized.storage_value(),
        offer.offer.price_date,
    );
}

pub(crate) async fn run_stats(services: &Services, json: bool) -> anyhow::Result<()> {
    let stats = services.catalog.stats().await?;
    if json {
        return print_json(&stats);
    }
    println!("{:<34} {:>10}", "priced products", stats.total_products);
    println!("{:<34} {:>10}", "suppliers", stats.total_suppliers);
    println!("{:<34} {:>10}", "categories", stats.categories_count);
    println!(
        "{:<34} {:>10}",
        "products with 2+ suppliers", stats.products_with_multiple_suppliers
    );
    println!("{:<34} {:>9.1}%", "average savings", stats.average_savings);
    println!("{:<34} {:>9.1}%", "max savings", stats.max_savings);
    Ok(())
}

/// Reads a JSON array of `{ "name", "quantity" }` objects from `path`.
pub(crate) fn read_shopping_list(path: &Path) -> anyhow::Result<Vec<RequiredProduct>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of required products", path.display()))
}

pub(crate) async fn run_recommend(
    services: &Services,
    file: &Path,
    budget: Option<Decimal>,
    json: bool,
) -> anyhow::Result<()> {
    let required = read_shopping_list(file)?;
    let recommendations = match budget {
        Some(budget) => {
            services
                .pricing
                .generate_recommendations_with_budget(&required, budget)
                .await?
        }
        None => services.pricing.generate_recommendations(&required).await?,
    };

    if json {
        return print_json(&recommendations);
    }

    println!(
        "{:<32} {:<18} {:>12} {:>8} {:>14} {:>8}  {}",
        "PRODUCT", "SUPPLIER", "UNIT PRICE", "QTY", "TOTAL", "CONF", "REASONING"
    );
    println!("{}", "-".repeat(140));
    let mut total = Decimal::ZERO;
    for rec in &recommendations {
        total += rec.total_cost;
        println!(
            "{:<32} {:<18} {:>12} {:>8} {:>14} {:>8.2}  {}",
            truncate(&rec.product_name, 29),
            truncate(&rec.supplier_name, 15),
            rec.unit_price,
            rec.quantity,
            rec.total_cost,
            rec.confidence,
            rec.reasoning,
        );
    }
    println!();
    println!(
        "{} of {} item(s) recommended, total {}",
        recommendations.len(),
        required.len(),
        total
    );
    if let Some(budget) = budget {
        println!("budget {budget}, remaining {}", budget - total);
    }
    Ok(())
}
