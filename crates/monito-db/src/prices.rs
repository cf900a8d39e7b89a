//! Database operations for `supplier_prices` and `price_history`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use monito_core::{PriceHistoryEntry, PriceObservation, SupplierPrice, Unit};

use crate::products::parse_unit;
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `supplier_prices` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SupplierPriceRow {
    pub product_id: Uuid,
    pub supplier_name: String,
    pub original_name: String,
    pub price: Decimal,
    pub currency: String,
    pub size: Option<Decimal>,
    pub unit: Option<String>,
    pub price_date: NaiveDate,
    pub confidence_score: f64,
    pub last_seen: DateTime<Utc>,
}

impl TryFrom<SupplierPriceRow> for SupplierPrice {
    type Error = DbError;

    fn try_from(row: SupplierPriceRow) -> Result<Self, Self::Error> {
        Ok(SupplierPrice {
            product_id: row.product_id,
            supplier_name: row.supplier_name,
            original_name: row.original_name,
            price: row.price,
            currency: row.currency,
            size: row.size,
            unit: parse_unit(row.unit.as_deref())?,
            price_date: row.price_date,
            confidence_score: row.confidence_score,
            last_seen: row.last_seen,
        })
    }
}

/// A row from the `price_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceHistoryRow {
    pub id: i64,
    pub product_id: Uuid,
    pub supplier_name: String,
    pub old_price: Option<Decimal>,
    pub new_price: Decimal,
    pub change_percentage: Option<Decimal>,
    pub change_date: DateTime<Utc>,
}

impl From<PriceHistoryRow> for PriceHistoryEntry {
    fn from(row: PriceHistoryRow) -> Self {
        PriceHistoryEntry {
            product_id: row.product_id,
            supplier_name: row.supplier_name,
            old_price: row.old_price,
            new_price: row.new_price,
            change_percentage: row.change_percentage,
            change_date: row.change_date,
        }
    }
}

// ---------------------------------------------------------------------------
// supplier_prices operations
// ---------------------------------------------------------------------------

/// Writes the supplier's price for the observation's day.
///
/// Conflicts on `(product_id, supplier_name, price_date)` overwrite the row.
/// The product row is locked and its `updated_at` advanced first, which
/// serializes price writes per product. Returns the supplier's latest price
/// before this write.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] if any statement fails.
pub async fn upsert_supplier_price(
    pool: &PgPool,
    product_id: Uuid,
    supplier_name: &str,
    observation: &PriceObservation,
) -> Result<Option<Decimal>, DbError> {
    let mut tx = pool.begin().await?;

    let touched = sqlx::query(
        "UPDATE master_products \
         SET updated_at = GREATEST(updated_at, $2) \
         WHERE product_id = $1",
    )
    .bind(product_id)
    .bind(observation.seen_at)
    .execute(&mut *tx)
    .await?;
    if touched.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("master product {product_id}")));
    }

    let previous = sqlx::query_scalar::<_, Decimal>(
        "SELECT price FROM supplier_prices \
         WHERE product_id = $1 AND supplier_name = $2 \
         ORDER BY price_date DESC, last_seen DESC \
         LIMIT 1",
    )
    .bind(product_id)
    .bind(supplier_name)
    .fetch_optional(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO supplier_prices \
             (product_id, supplier_name, original_name, price, currency, size, unit, \
              price_date, confidence_score, last_seen) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (product_id, supplier_name, price_date) DO UPDATE SET \
             original_name    = EXCLUDED.original_name, \
             price            = EXCLUDED.price, \
             currency         = EXCLUDED.currency, \
             size             = EXCLUDED.size, \
             unit             = EXCLUDED.unit, \
             confidence_score = EXCLUDED.confidence_score, \
             last_seen        = EXCLUDED.last_seen",
    )
    .bind(product_id)
    .bind(supplier_name)
    .bind(&observation.original_name)
    .bind(observation.price)
    .bind(&observation.currency)
    .bind(observation.size)
    .bind(observation.unit.map(Unit::as_str))
    .bind(observation.price_date)
    .bind(observation.confidence_score)
    .bind(observation.seen_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(previous)
}

/// Every price row for the product, newest day first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// for an unknown stored unit.
pub async fn get_supplier_prices(
    pool: &PgPool,
    product_id: Uuid,
) -> Result<Vec<SupplierPrice>, DbError> {
    let rows = sqlx::query_as::<_, SupplierPriceRow>(
        "SELECT product_id, supplier_name, original_name, price, currency, size, unit, \
                price_date, confidence_score, last_seen \
         FROM supplier_prices \
         WHERE product_id = $1 \
         ORDER BY price_date DESC, supplier_name",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(SupplierPrice::try_from).collect()
}

// ---------------------------------------------------------------------------
// price_history operations
// ---------------------------------------------------------------------------

/// Appends a history entry. The table rejects updates and deletes.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn append_price_history(pool: &PgPool, entry: &PriceHistoryEntry) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO price_history \
             (product_id, supplier_name, old_price, new_price, change_percentage, change_date) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(entry.product_id)
    .bind(&entry.supplier_name)
    .bind(entry.old_price)
    .bind(entry.new_price)
    .bind(entry.change_percentage)
    .bind(entry.change_date)
    .execute(pool)
    .await?;

    Ok(())
}

/// History entries for a product since `since`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_price_history(
    pool: &PgPool,
    product_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<PriceHistoryEntry>, DbError> {
    let rows = sqlx::query_as::<_, PriceHistoryRow>(
        "SELECT id, product_id, supplier_name, old_price, new_price, change_percentage, \
                change_date \
         FROM price_history \
         WHERE product_id = $1 AND change_date >= $2 \
         ORDER BY change_date, id",
    )
    .bind(product_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(PriceHistoryEntry::from).collect())
}
