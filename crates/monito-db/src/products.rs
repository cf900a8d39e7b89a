//! Database operations for `master_products`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use monito_core::{MasterProduct, NewMasterProduct, ProductStatus, Unit};
use monito_engine::{ProductFilter, ProductUpsert};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `master_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MasterProductRow {
    pub product_id: Uuid,
    pub standard_name: String,
    pub normalized_name: String,
    pub brand: Option<String>,
    pub normalized_brand: Option<String>,
    pub category: String,
    pub size: Option<Decimal>,
    pub unit: Option<String>,
    /// One of `active`, `discontinued`, `merged`.
    pub status: String,
    pub merged_into: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<MasterProductRow> for MasterProduct {
    type Error = DbError;

    fn try_from(row: MasterProductRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ProductStatus>()
            .map_err(DbError::InvalidRow)?;
        Ok(MasterProduct {
            product_id: row.product_id,
            standard_name: row.standard_name,
            normalized_name: row.normalized_name,
            brand: row.brand,
            normalized_brand: row.normalized_brand,
            category: row.category,
            size: row.size,
            unit: parse_unit(row.unit.as_deref())?,
            status,
            merged_into: row.merged_into,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn parse_unit(raw: Option<&str>) -> Result<Option<Unit>, DbError> {
    raw.map(|u| {
        u.parse::<Unit>()
            .map_err(|e| DbError::InvalidRow(e.to_string()))
    })
    .transpose()
}

fn into_products(rows: Vec<MasterProductRow>) -> Result<Vec<MasterProduct>, DbError> {
    rows.into_iter().map(MasterProduct::try_from).collect()
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns a product by id, whatever its status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// if the stored status or unit is unknown.
pub async fn get_master_product(
    pool: &PgPool,
    product_id: Uuid,
) -> Result<Option<MasterProduct>, DbError> {
    let row = sqlx::query_as::<_, MasterProductRow>(
        "SELECT product_id, standard_name, normalized_name, brand, normalized_brand, \
                category, size, unit, status, merged_into, created_at, updated_at \
         FROM master_products \
         WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    row.map(MasterProduct::try_from).transpose()
}

/// Lists products matching every set field of `filter`, by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// for an unreadable row.
pub async fn list_master_products(
    pool: &PgPool,
    filter: &ProductFilter,
) -> Result<Vec<MasterProduct>, DbError> {
    let rows = sqlx::query_as::<_, MasterProductRow>(
        "SELECT product_id, standard_name, normalized_name, brand, normalized_brand, \
                category, size, unit, status, merged_into, created_at, updated_at \
         FROM master_products \
         WHERE ($1::text IS NULL OR category = $1) \
           AND ($2::text IS NULL OR normalized_brand = $2) \
           AND ($3::text IS NULL OR status = $3) \
         ORDER BY standard_name, product_id",
    )
    .bind(filter.category.as_deref())
    .bind(filter.normalized_brand.as_deref())
    .bind(filter.status.map(ProductStatus::as_str))
    .fetch_all(pool)
    .await?;

    into_products(rows)
}

/// Active products in a category, optionally narrowed to one folded brand.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// for an unreadable row.
pub async fn get_candidates(
    pool: &PgPool,
    category: &str,
    normalized_brand: Option<&str>,
) -> Result<Vec<MasterProduct>, DbError> {
    let rows = sqlx::query_as::<_, MasterProductRow>(
        "SELECT product_id, standard_name, normalized_name, brand, normalized_brand, \
                category, size, unit, status, merged_into, created_at, updated_at \
         FROM master_products \
         WHERE status = 'active' \
           AND category = $1 \
           AND ($2::text IS NULL OR normalized_brand = $2) \
         ORDER BY product_id",
    )
    .bind(category)
    .bind(normalized_brand)
    .fetch_all(pool)
    .await?;

    into_products(rows)
}

/// Active products with exactly this folded name and brand. A `None` brand
/// only matches products without one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// for an unreadable row.
pub async fn get_candidates_by_exact_key(
    pool: &PgPool,
    normalized_brand: Option<&str>,
    normalized_name: &str,
) -> Result<Vec<MasterProduct>, DbError> {
    let rows = sqlx::query_as::<_, MasterProductRow>(
        "SELECT product_id, standard_name, normalized_name, brand, normalized_brand, \
                category, size, unit, status, merged_into, created_at, updated_at \
         FROM master_products \
         WHERE status = 'active' \
           AND normalized_name = $2 \
           AND normalized_brand IS NOT DISTINCT FROM $1 \
         ORDER BY product_id",
    )
    .bind(normalized_brand)
    .bind(normalized_name)
    .fetch_all(pool)
    .await?;

    into_products(rows)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts a product unless a non-merged one with the same match key exists.
///
/// The key is folded name, folded brand, category and pack, where the pack
/// columns are generated from `size` and `unit`. A conflict on the partial
/// `master_products_match_key` index inserts nothing and the holder of the
/// key is reported instead, so concurrent creators end up with one row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement fails.
pub async fn upsert_master_product(
    pool: &PgPool,
    product: &NewMasterProduct,
) -> Result<ProductUpsert, DbError> {
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO master_products \
             (product_id, standard_name, normalized_name, brand, normalized_brand, \
              category, size, unit) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (normalized_name, (COALESCE(normalized_brand, '')), category, \
                      (COALESCE(pack_dimension, '')), (COALESCE(pack_amount, 0))) \
             WHERE status <> 'merged' \
         DO NOTHING \
         RETURNING product_id",
    )
    .bind(Uuid::new_v4())
    .bind(&product.standard_name)
    .bind(&product.normalized_name)
    .bind(&product.brand)
    .bind(&product.normalized_brand)
    .bind(&product.category)
    .bind(product.size)
    .bind(product.unit.map(Unit::as_str))
    .fetch_optional(pool)
    .await?;

    if let Some(id) = inserted {
        return Ok(ProductUpsert::Created(id));
    }

    let pack = product.pack();
    let existing = sqlx::query_scalar::<_, Uuid>(
        "SELECT product_id FROM master_products \
         WHERE normalized_name = $1 \
           AND COALESCE(normalized_brand, '') = COALESCE($2, '') \
           AND category = $3 \
           AND COALESCE(pack_dimension, '') = COALESCE($4, '') \
           AND COALESCE(pack_amount, 0) = COALESCE($5, 0) \
           AND status <> 'merged'",
    )
    .bind(&product.normalized_name)
    .bind(&product.normalized_brand)
    .bind(&product.category)
    .bind(pack.map(|p| p.dimension.as_str()))
    .bind(pack.map(|p| p.amount))
    .fetch_optional(pool)
    .await?;

    existing.map(ProductUpsert::Existing).ok_or_else(|| {
        DbError::NotFound(format!(
            "master product for key {:?}/{:?}/{:?}/{pack:?}",
            product.normalized_name, product.normalized_brand, product.category
        ))
    })
}

/// Marks `source` merged into `target` and moves the source's supplier prices
/// to the target where the target has no row for that supplier and day.
///
/// Runs in one transaction; the target row is locked first.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if either product is missing, or
/// [`DbError::Sqlx`] if any statement fails.
pub async fn mark_merged(pool: &PgPool, source: Uuid, target: Uuid) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let target_exists = sqlx::query_scalar::<_, Uuid>(
        "SELECT product_id FROM master_products WHERE product_id = $1 FOR UPDATE",
    )
    .bind(target)
    .fetch_optional(&mut *tx)
    .await?;
    if target_exists.is_none() {
        return Err(DbError::NotFound(format!("master product {target}")));
    }

    let updated = sqlx::query(
        "UPDATE master_products \
         SET status = 'merged', merged_into = $2, updated_at = NOW() \
         WHERE product_id = $1",
    )
    .bind(source)
    .bind(target)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(DbError::NotFound(format!("master product {source}")));
    }

    let moved = sqlx::query(
        "UPDATE supplier_prices s SET product_id = $2 \
         WHERE s.product_id = $1 \
           AND NOT EXISTS ( \
               SELECT 1 FROM supplier_prices t \
               WHERE t.product_id = $2 \
                 AND t.supplier_name = s.supplier_name \
                 AND t.price_date = s.price_date)",
    )
    .bind(source)
    .bind(target)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(
        source = %source,
        target = %target,
        moved_prices = moved.rows_affected(),
        "marked product merged"
    );
    Ok(())
}
