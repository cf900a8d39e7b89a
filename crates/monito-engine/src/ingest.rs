//! Commits standardized supplier records to the catalog.
//!
//! Each record is matched, attached to an existing or newly created master
//! product, and its price stored for the supplier and day. A price that is
//! new or differs from the supplier's previous one is appended to history.
//!
//! A new product whose match key is already held lands on the holder, with
//! an `exact` audit row like any other match.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use monito_core::{
    NewMasterProduct, PriceHistoryEntry, PriceObservation, ProductRecord, ValidationError,
};

use crate::error::EngineError;
use crate::matching::{MatchDecision, MatchOutcome, MatchingEngine};
use crate::store::{CatalogStore, ProductUpsert};
use crate::text::{fold_brand, fold_name};

/// What happened to one committed record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RowOutcome {
    Matched(MatchDecision),
    Created { product_id: Uuid },
}

impl RowOutcome {
    #[must_use]
    pub fn product_id(&self) -> Uuid {
        match self {
            RowOutcome::Matched(d) => d.product_id,
            RowOutcome::Created { product_id } => *product_id,
        }
    }
}

/// One record committed to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedRecord {
    pub original_name: String,
    pub outcome: RowOutcome,
    /// `true` when a history entry was appended for this record.
    pub price_changed: bool,
}

/// A committed record and its position in the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedRow {
    pub index: usize,
    pub original_name: String,
    pub outcome: RowOutcome,
    pub price_changed: bool,
}

impl IngestedRow {
    fn new(index: usize, committed: CommittedRecord) -> Self {
        Self {
            index,
            original_name: committed.original_name,
            outcome: committed.outcome,
            price_changed: committed.price_changed,
        }
    }
}

/// A supplier row that could not be read as a [`ProductRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct UnreadableRow {
    /// Best-effort name from the raw row; empty when it had none.
    pub original_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    pub index: usize,
    pub original_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub supplier: String,
    pub matched: usize,
    pub created: usize,
    pub needs_review: usize,
    pub price_changes: usize,
    pub rows: Vec<IngestedRow>,
    pub rejected: Vec<RejectedRow>,
}

impl IngestReport {
    #[must_use]
    pub fn processed(&self) -> usize {
        self.rows.len() + self.rejected.len()
    }
}

#[derive(Debug, Clone)]
pub struct IngestPipeline {
    matcher: MatchingEngine,
}

impl IngestPipeline {
    #[must_use]
    pub fn new(matcher: MatchingEngine) -> Self {
        Self { matcher }
    }

    fn store(&self) -> &Arc<dyn CatalogStore> {
        self.matcher.store()
    }

    /// Commits one record for `supplier` on `price_date`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a malformed record or blank
    /// supplier and [`EngineError::Store`] if any catalog write fails.
    pub async fn ingest(
        &self,
        record: &ProductRecord,
        supplier: &str,
        price_date: NaiveDate,
    ) -> Result<CommittedRecord, EngineError> {
        self.ingest_at(record, supplier, price_date, Utc::now()).await
    }

    /// [`ingest`](Self::ingest) with an explicit observation time.
    ///
    /// # Errors
    ///
    /// See [`ingest`](Self::ingest).
    pub async fn ingest_at(
        &self,
        record: &ProductRecord,
        supplier: &str,
        price_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CommittedRecord, EngineError> {
        let supplier = supplier.trim();
        if supplier.is_empty() {
            return Err(ValidationError::EmptyField { field: "supplier" }.into());
        }

        let outcome = match self.matcher.find_matches_at(record, now).await? {
            MatchOutcome::Matched(decision) => RowOutcome::Matched(decision),
            MatchOutcome::NewProduct => match self.create_product(record).await? {
                ProductUpsert::Created(product_id) => RowOutcome::Created { product_id },
                ProductUpsert::Existing(product_id) => RowOutcome::Matched(
                    self.matcher
                        .attach_to_key_holder(record, product_id, now)
                        .await?,
                ),
            },
        };
        let product_id = outcome.product_id();

        let previous = self
            .store()
            .upsert_supplier_price(
                product_id,
                supplier,
                &PriceObservation {
                    original_name: record.original_name.clone(),
                    price: record.price,
                    currency: record.currency.clone(),
                    size: record.size,
                    unit: record.unit,
                    price_date,
                    confidence_score: record.confidence,
                    seen_at: now,
                },
            )
            .await?;

        let price_changed = previous != Some(record.price);
        if price_changed {
            self.store()
                .append_price_history(&PriceHistoryEntry::new(
                    product_id,
                    supplier,
                    previous,
                    record.price,
                    now,
                ))
                .await?;
            tracing::debug!(
                product_id = %product_id,
                supplier,
                old = ?previous,
                new = %record.price,
                "price change recorded"
            );
        }

        Ok(CommittedRecord {
            original_name: record.original_name.clone(),
            outcome,
            price_changed,
        })
    }

    /// Commits every record, collecting malformed rows instead of stopping.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the catalog fails mid-batch; rows
    /// already committed stay committed.
    pub async fn ingest_batch(
        &self,
        records: &[ProductRecord],
        supplier: &str,
        price_date: NaiveDate,
    ) -> Result<IngestReport, EngineError> {
        self.ingest_batch_at(records, supplier, price_date, Utc::now())
            .await
    }

    /// # Errors
    ///
    /// See [`ingest_batch`](Self::ingest_batch).
    pub async fn ingest_batch_at(
        &self,
        records: &[ProductRecord],
        supplier: &str,
        price_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, EngineError> {
        self.commit_rows(records.iter().map(Ok), supplier, price_date, now)
            .await
    }

    /// Like [`ingest_batch`](Self::ingest_batch) for rows read one by one;
    /// unreadable rows are reported as rejected at their position.
    ///
    /// # Errors
    ///
    /// See [`ingest_batch`](Self::ingest_batch).
    pub async fn ingest_rows(
        &self,
        rows: &[Result<ProductRecord, UnreadableRow>],
        supplier: &str,
        price_date: NaiveDate,
    ) -> Result<IngestReport, EngineError> {
        self.ingest_rows_at(rows, supplier, price_date, Utc::now())
            .await
    }

    /// # Errors
    ///
    /// See [`ingest_batch`](Self::ingest_batch).
    pub async fn ingest_rows_at(
        &self,
        rows: &[Result<ProductRecord, UnreadableRow>],
        supplier: &str,
        price_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, EngineError> {
        self.commit_rows(rows.iter().map(Result::as_ref), supplier, price_date, now)
            .await
    }

    async fn commit_rows<'a>(
        &self,
        rows: impl Iterator<Item = Result<&'a ProductRecord, &'a UnreadableRow>>,
        supplier: &str,
        price_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, EngineError> {
        let mut report = IngestReport {
            supplier: supplier.trim().to_string(),
            ..IngestReport::default()
        };

        for (index, row) in rows.enumerate() {
            let record = match row {
                Ok(record) => record,
                Err(unreadable) => {
                    tracing::warn!(
                        index,
                        name = %unreadable.original_name,
                        error = %unreadable.reason,
                        "unreadable record"
                    );
                    report.rejected.push(RejectedRow {
                        index,
                        original_name: unreadable.original_name.clone(),
                        reason: unreadable.reason.clone(),
                    });
                    continue;
                }
            };

            match self.ingest_at(record, supplier, price_date, now).await {
                Ok(committed) => {
                    match &committed.outcome {
                        RowOutcome::Matched(d) => {
                            report.matched += 1;
                            if d.needs_review {
                                report.needs_review += 1;
                            }
                        }
                        RowOutcome::Created { .. } => report.created += 1,
                    }
                    if committed.price_changed {
                        report.price_changes += 1;
                    }
                    report.rows.push(IngestedRow::new(index, committed));
                }
                Err(e @ (EngineError::Validation(_) | EngineError::Normalize(_))) => {
                    tracing::warn!(
                        index,
                        name = %record.original_name,
                        error = %e,
                        "rejected record"
                    );
                    report.rejected.push(RejectedRow {
                        index,
                        original_name: record.original_name.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            supplier = %report.supplier,
            processed = report.processed(),
            matched = report.matched,
            created = report.created,
            needs_review = report.needs_review,
            rejected = report.rejected.len(),
            "ingest batch complete"
        );
        Ok(report)
    }

    async fn create_product(&self, record: &ProductRecord) -> Result<ProductUpsert, EngineError> {
        let aliases = self.matcher.scorer().aliases();
        let upsert = self
            .store()
            .upsert_master_product(&NewMasterProduct {
                standard_name: record.standardized_name.trim().to_string(),
                normalized_name: fold_name(&record.standardized_name),
                brand: record.brand().map(str::to_string),
                normalized_brand: fold_brand(record.brand(), aliases),
                category: record.category.trim().to_string(),
                size: record.size,
                unit: record.unit,
            })
            .await?;
        match upsert {
            ProductUpsert::Created(product_id) => tracing::info!(
                product_id = %product_id,
                name = %record.standardized_name,
                category = %record.category,
                "created master product"
            ),
            ProductUpsert::Existing(product_id) => tracing::info!(
                product_id = %product_id,
                name = %record.standardized_name,
                "match key already held; attaching record for review"
            ),
        }
        Ok(upsert)
    }
}
