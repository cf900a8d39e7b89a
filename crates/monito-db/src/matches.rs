//! Database operations for `product_matches`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use monito_core::{MatchType, ProductMatch};
use monito_engine::ReviewDecision;

use crate::DbError;

/// A row from the `product_matches` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductMatchRow {
    pub match_id: Uuid,
    pub product_a_id: Uuid,
    pub product_b_id: Uuid,
    pub similarity_score: f64,
    /// One of `exact`, `fuzzy`, `manual`, `rejected`.
    pub match_type: String,
    pub reviewed: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ProductMatchRow> for ProductMatch {
    type Error = DbError;

    fn try_from(row: ProductMatchRow) -> Result<Self, Self::Error> {
        Ok(ProductMatch {
            match_id: row.match_id,
            product_a_id: row.product_a_id,
            product_b_id: row.product_b_id,
            similarity_score: row.similarity_score,
            match_type: row
                .match_type
                .parse::<MatchType>()
                .map_err(DbError::InvalidRow)?,
            reviewed: row.reviewed,
            created_at: row.created_at,
        })
    }
}

/// Records a match for its pair and returns the id of the pair's row.
///
/// Conflicts on `(product_a_id, product_b_id)` refresh the score and type,
/// except on rows a reviewer has touched (`reviewed`, `manual`, `rejected`),
/// which are left as they are.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement fails.
pub async fn record_match(pool: &PgPool, record: &ProductMatch) -> Result<Uuid, DbError> {
    let written = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO product_matches \
             (match_id, product_a_id, product_b_id, similarity_score, match_type, \
              reviewed, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (product_a_id, product_b_id) DO UPDATE SET \
             similarity_score = EXCLUDED.similarity_score, \
             match_type       = EXCLUDED.match_type, \
             reviewed         = product_matches.reviewed OR EXCLUDED.reviewed \
         WHERE NOT product_matches.reviewed \
           AND product_matches.match_type NOT IN ('manual', 'rejected') \
         RETURNING match_id",
    )
    .bind(record.match_id)
    .bind(record.product_a_id)
    .bind(record.product_b_id)
    .bind(record.similarity_score)
    .bind(record.match_type.as_str())
    .bind(record.reviewed)
    .bind(record.created_at)
    .fetch_optional(pool)
    .await?;

    if let Some(id) = written {
        return Ok(id);
    }

    sqlx::query_scalar::<_, Uuid>(
        "SELECT match_id FROM product_matches \
         WHERE product_a_id = $1 AND product_b_id = $2",
    )
    .bind(record.product_a_id)
    .bind(record.product_b_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        DbError::NotFound(format!(
            "product match {}/{}",
            record.product_a_id, record.product_b_id
        ))
    })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// for an unknown stored match type.
pub async fn get_match(pool: &PgPool, match_id: Uuid) -> Result<Option<ProductMatch>, DbError> {
    let row = sqlx::query_as::<_, ProductMatchRow>(
        "SELECT match_id, product_a_id, product_b_id, similarity_score, match_type, \
                reviewed, created_at \
         FROM product_matches \
         WHERE match_id = $1",
    )
    .bind(match_id)
    .fetch_optional(pool)
    .await?;

    row.map(ProductMatch::try_from).transpose()
}

/// Unreviewed, non-rejected matches scoring at least `min_score`, best first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// for an unknown stored match type.
pub async fn list_unreviewed_matches(
    pool: &PgPool,
    min_score: f64,
) -> Result<Vec<ProductMatch>, DbError> {
    let rows = sqlx::query_as::<_, ProductMatchRow>(
        "SELECT match_id, product_a_id, product_b_id, similarity_score, match_type, \
                reviewed, created_at \
         FROM product_matches \
         WHERE NOT reviewed \
           AND match_type <> 'rejected' \
           AND similarity_score >= $1 \
         ORDER BY similarity_score DESC, match_id",
    )
    .bind(min_score)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ProductMatch::try_from).collect()
}

/// Marks a match reviewed, and rejected when so decided.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id, or [`DbError::Sqlx`] if
/// the update fails.
pub async fn set_match_review(
    pool: &PgPool,
    match_id: Uuid,
    decision: ReviewDecision,
) -> Result<ProductMatch, DbError> {
    let row = sqlx::query_as::<_, ProductMatchRow>(
        "UPDATE product_matches \
         SET reviewed = TRUE, \
             match_type = CASE WHEN $2 THEN 'rejected' ELSE match_type END \
         WHERE match_id = $1 \
         RETURNING match_id, product_a_id, product_b_id, similarity_score, match_type, \
                   reviewed, created_at",
    )
    .bind(match_id)
    .bind(decision == ReviewDecision::Rejected)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::NotFound(format!("product match {match_id}")))?;

    ProductMatch::try_from(row)
}

/// Ids paired with `id` by a rejected match.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn rejected_partners(pool: &PgPool, id: Uuid) -> Result<Vec<Uuid>, DbError> {
    let partners = sqlx::query_scalar::<_, Uuid>(
        "SELECT CASE WHEN product_a_id = $1 THEN product_b_id ELSE product_a_id END \
         FROM product_matches \
         WHERE match_type = 'rejected' \
           AND (product_a_id = $1 OR product_b_id = $1)",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(partners)
}
