//! `ingest` command: match a supplier's standardized rows into the catalog.

use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, Utc};

use serde_json::Value;

use monito_core::ProductRecord;
use monito_engine::{IngestReport, RowOutcome, UnreadableRow};

use crate::{print_json, truncate, Services};

pub(crate) type Row = Result<ProductRecord, UnreadableRow>;

/// Reads a JSON array from `path`, converting each element to a
/// [`ProductRecord`] on its own so one bad row does not sink the file.
pub(crate) fn read_records(path: &Path) -> anyhow::Result<Vec<Row>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let values: Vec<Value> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array", path.display()))?;
    Ok(values.into_iter().map(parse_row).collect())
}

fn parse_row(value: Value) -> Row {
    let original_name = value
        .get("original_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    serde_json::from_value(value).map_err(|e| UnreadableRow {
        original_name,
        reason: e.to_string(),
    })
}

pub(crate) async fn run_ingest(
    services: &Services,
    file: &Path,
    supplier: &str,
    date: Option<NaiveDate>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let rows = read_records(file)?;
    let price_date = date.unwrap_or_else(|| Utc::now().date_naive());

    tracing::info!(
        supplier,
        %price_date,
        rows = rows.len(),
        unreadable = rows.iter().filter(|r| r.is_err()).count(),
        dry_run,
        "ingesting supplier file"
    );

    let report = services
        .pipeline
        .ingest_rows(&rows, supplier, price_date)
        .await?;

    if json {
        return print_json(&report);
    }
    print_report(&report, dry_run);
    Ok(())
}

fn print_report(report: &IngestReport, dry_run: bool) {
    if dry_run {
        println!("dry run: nothing was written to the database");
    }

    println!(
        "{:<6} {:<40} {:<10} {:>6}  {:<6} {:<36}",
        "ROW", "ORIGINAL NAME", "RESULT", "SCORE", "REVIEW", "PRODUCT"
    );
    println!("{}", "-".repeat(112));
    for row in &report.rows {
        let (result, score, review) = match &row.outcome {
            RowOutcome::Matched(d) => (
                d.match_type.as_str(),
                format!("{:.3}", d.score),
                if d.needs_review { "yes" } else { "" },
            ),
            RowOutcome::Created { .. } => ("created", "-".to_string(), ""),
        };
        println!(
            "{:<6} {:<40} {:<10} {:>6}  {:<6} {:<36}",
            row.index,
            truncate(&row.original_name, 37),
            result,
            score,
            review,
            row.outcome.product_id(),
        );
    }

    if !report.rejected.is_empty() {
        println!();
        println!("rejected rows:");
        for rejected in &report.rejected {
            println!(
                "  {:<6} {:<40} {}",
                rejected.index,
                truncate(&rejected.original_name, 37),
                rejected.reason
            );
        }
    }

    println!();
    println!(
        "{}: {} processed, {} matched, {} created, {} need review, {} price changes, {} rejected",
        report.supplier,
        report.processed(),
        report.matched,
        report.created,
        report.needs_review,
        report.price_changes,
        report.rejected.len(),
    );
}
