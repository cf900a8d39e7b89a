//! Match review commands and manual merges.

use uuid::Uuid;

use monito_core::ProductMatch;

use crate::{print_json, Services};

pub(crate) async fn run_suggest(
    services: &Services,
    min_confidence: f64,
    json: bool,
) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&min_confidence) {
        anyhow::bail!("--min-confidence must be between 0 and 1, got {min_confidence}");
    }
    let suggestions = services.matcher.suggest_merges(min_confidence).await?;
    if json {
        return print_json(&suggestions);
    }
    if suggestions.is_empty() {
        println!("no unreviewed matches at or above {min_confidence:.2}");
        return Ok(());
    }

    println!(
        "{:<36} {:<36} {:<36} {:>6} {:<8}",
        "MATCH", "PRODUCT A", "PRODUCT B", "SCORE", "TYPE"
    );
    println!("{}", "-".repeat(126));
    for m in &suggestions {
        print_match(m);
    }
    println!();
    println!("{} suggestion(s)", suggestions.len());
    Ok(())
}

fn print_match(m: &ProductMatch) {
    println!(
        "{:<36} {:<36} {:<36} {:>6.3} {:<8}",
        m.match_id, m.product_a_id, m.product_b_id, m.similarity_score, m.match_type
    );
}

pub(crate) async fn run_approve(services: &Services, id: Uuid, json: bool) -> anyhow::Result<()> {
    let updated = services.matcher.approve_match(id).await?;
    if json {
        return print_json(&updated);
    }
    println!("approved match {id}");
    print_match(&updated);
    Ok(())
}

pub(crate) async fn run_reject(services: &Services, id: Uuid, json: bool) -> anyhow::Result<()> {
    let updated = services.matcher.reject_match(id).await?;
    if json {
        return print_json(&updated);
    }
    println!("rejected match {id}; the pair will not be proposed again");
    print_match(&updated);
    Ok(())
}

pub(crate) async fn run_scan(services: &Services, json: bool) -> anyhow::Result<()> {
    let stats = services.matcher.scan_duplicates().await?;
    if json {
        return print_json(&stats);
    }
    println!(
        "scanned {} product(s): {} match(es) recorded, {} error(s)",
        stats.products_processed, stats.matches_recorded, stats.errors
    );
    Ok(())
}

pub(crate) async fn run_merge(
    services: &Services,
    source: Uuid,
    target: Uuid,
    json: bool,
) -> anyhow::Result<()> {
    let target_product = services.matcher.merge_products(source, target).await?;
    if json {
        return print_json(&target_product);
    }
    println!(
        "merged {source} into {} ({})",
        target_product.product_id, target_product.standard_name
    );
    Ok(())
}
