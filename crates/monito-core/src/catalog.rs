use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::units::{Pack, Unit};

// ---------------------------------------------------------------------------
// Master products
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Discontinued,
    /// Superseded by another product; kept for referential history.
    Merged,
}

impl ProductStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Discontinued => "discontinued",
            ProductStatus::Merged => "merged",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "discontinued" => Ok(ProductStatus::Discontinued),
            "merged" => Ok(ProductStatus::Merged),
            other => Err(format!("unknown product status: {other}")),
        }
    }
}

/// The catalog's canonical identity for a physical product.
///
/// Descriptive attributes come from the record that created the product and
/// are never rewritten by automatic matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterProduct {
    pub product_id: Uuid,
    pub standard_name: String,
    /// Folded form of `standard_name` used as the exact-tier key.
    pub normalized_name: String,
    pub brand: Option<String>,
    /// Folded, alias-canonicalized brand.
    pub normalized_brand: Option<String>,
    pub category: String,
    pub size: Option<Decimal>,
    pub unit: Option<Unit>,
    pub status: ProductStatus,
    pub merged_into: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MasterProduct {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    #[must_use]
    pub fn pack(&self) -> Option<Pack> {
        Pack::new(self.size, self.unit)
    }
}

/// Attributes for a master product about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMasterProduct {
    pub standard_name: String,
    pub normalized_name: String,
    pub brand: Option<String>,
    pub normalized_brand: Option<String>,
    pub category: String,
    pub size: Option<Decimal>,
    pub unit: Option<Unit>,
}

impl NewMasterProduct {
    /// Whether `existing` holds this product's match key: folded name,
    /// folded brand, category and pack. Merged products hold no key.
    #[must_use]
    pub fn same_key_as(&self, existing: &MasterProduct) -> bool {
        existing.status != ProductStatus::Merged
            && existing.normalized_name == self.normalized_name
            && existing.normalized_brand == self.normalized_brand
            && existing.category == self.category
            && existing.pack() == self.pack()
    }

    #[must_use]
    pub fn pack(&self) -> Option<Pack> {
        Pack::new(self.size, self.unit)
    }
}

// ---------------------------------------------------------------------------
// Supplier prices
// ---------------------------------------------------------------------------

/// One supplier's price observation for a master product on a given day.
///
/// Unique on `(product_id, supplier_name, price_date)`. The offered pack size
/// is kept per row since suppliers sell the same product in different packs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierPrice {
    pub product_id: Uuid,
    pub supplier_name: String,
    pub original_name: String,
    pub price: Decimal,
    pub currency: String,
    pub size: Option<Decimal>,
    pub unit: Option<Unit>,
    pub price_date: NaiveDate,
    pub confidence_score: f64,
    pub last_seen: DateTime<Utc>,
}

/// A price as submitted by a supplier, before it is attached to a product.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub original_name: String,
    pub price: Decimal,
    pub currency: String,
    pub size: Option<Decimal>,
    pub unit: Option<Unit>,
    pub price_date: NaiveDate,
    pub confidence_score: f64,
    pub seen_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Match audit records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Manual,
    /// A candidate a reviewer explicitly disconfirmed. Sticky for fuzzy matching.
    Rejected,
}

impl MatchType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Manual => "manual",
            MatchType::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(MatchType::Exact),
            "fuzzy" => Ok(MatchType::Fuzzy),
            "manual" => Ok(MatchType::Manual),
            "rejected" => Ok(MatchType::Rejected),
            other => Err(format!("unknown match type: {other}")),
        }
    }
}

/// Audit row for a match decision over an unordered pair of ids.
///
/// `product_a_id < product_b_id` always holds; use [`ProductMatch::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMatch {
    pub match_id: Uuid,
    pub product_a_id: Uuid,
    pub product_b_id: Uuid,
    pub similarity_score: f64,
    pub match_type: MatchType,
    pub reviewed: bool,
    pub created_at: DateTime<Utc>,
}

impl ProductMatch {
    /// Builds an unreviewed match with the pair in canonical order.
    #[must_use]
    pub fn new(
        x: Uuid,
        y: Uuid,
        similarity_score: f64,
        match_type: MatchType,
        created_at: DateTime<Utc>,
    ) -> Self {
        let (product_a_id, product_b_id) = canonical_pair(x, y);
        Self {
            match_id: Uuid::new_v4(),
            product_a_id,
            product_b_id,
            similarity_score,
            match_type,
            reviewed: false,
            created_at,
        }
    }

    #[must_use]
    pub fn pair(&self) -> (Uuid, Uuid) {
        (self.product_a_id, self.product_b_id)
    }

    /// The other side of the pair, if `id` is one side of it.
    #[must_use]
    pub fn partner_of(&self, id: Uuid) -> Option<Uuid> {
        if self.product_a_id == id {
            Some(self.product_b_id)
        } else if self.product_b_id == id {
            Some(self.product_a_id)
        } else {
            None
        }
    }

    /// Rows a reviewer has touched. Automatic writes must leave these alone.
    #[must_use]
    pub fn is_human_decision(&self) -> bool {
        self.reviewed || matches!(self.match_type, MatchType::Rejected | MatchType::Manual)
    }
}

/// Orders two ids so the smaller comes first.
#[must_use]
pub fn canonical_pair(x: Uuid, y: Uuid) -> (Uuid, Uuid) {
    if x <= y {
        (x, y)
    } else {
        (y, x)
    }
}

// ---------------------------------------------------------------------------
// Price history
// ---------------------------------------------------------------------------

/// Append-only record of a supplier price change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub product_id: Uuid,
    pub supplier_name: String,
    pub old_price: Option<Decimal>,
    pub new_price: Decimal,
    /// `(new - old) / old * 100`, absent for a supplier's first price.
    pub change_percentage: Option<Decimal>,
    pub change_date: DateTime<Utc>,
}

impl PriceHistoryEntry {
    #[must_use]
    pub fn new(
        product_id: Uuid,
        supplier_name: impl Into<String>,
        old_price: Option<Decimal>,
        new_price: Decimal,
        change_date: DateTime<Utc>,
    ) -> Self {
        let change_percentage = old_price.and_then(|old| {
            (new_price - old)
                .checked_div(old)
                .map(|ratio| ratio * Decimal::ONE_HUNDRED)
        });
        Self {
            product_id,
            supplier_name: supplier_name.into(),
            old_price,
            new_price,
            change_percentage,
            change_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn rice(size: i64, unit: Unit) -> NewMasterProduct {
        NewMasterProduct {
            standard_name: "Beras Pandan Wangi".to_string(),
            normalized_name: "beras pandan wangi".to_string(),
            brand: None,
            normalized_brand: None,
            category: "rice".to_string(),
            size: Some(Decimal::from(size)),
            unit: Some(unit),
        }
    }

    fn stored(product: &NewMasterProduct, status: ProductStatus) -> MasterProduct {
        MasterProduct {
            product_id: Uuid::from_u128(7),
            standard_name: product.standard_name.clone(),
            normalized_name: product.normalized_name.clone(),
            brand: product.brand.clone(),
            normalized_brand: product.normalized_brand.clone(),
            category: product.category.clone(),
            size: product.size,
            unit: product.unit,
            status,
            merged_into: None,
            created_at: ts(),
            updated_at: ts(),
        }
    }

    #[test]
    fn match_key_includes_pack() {
        let five = stored(&rice(5, Unit::Kg), ProductStatus::Active);
        assert!(rice(5, Unit::Kg).same_key_as(&five));
        assert!(rice(5000, Unit::G).same_key_as(&five));
        assert!(!rice(25, Unit::Kg).same_key_as(&five));
    }

    #[test]
    fn merged_products_hold_no_key() {
        let five = stored(&rice(5, Unit::Kg), ProductStatus::Merged);
        assert!(!rice(5, Unit::Kg).same_key_as(&five));
        let discontinued = stored(&rice(5, Unit::Kg), ProductStatus::Discontinued);
        assert!(rice(5, Unit::Kg).same_key_as(&discontinued));
    }

    #[test]
    fn product_match_orders_pair() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let m = ProductMatch::new(high, low, 0.9, MatchType::Fuzzy, ts());
        assert_eq!(m.pair(), (low, high));
        assert!(!m.reviewed);
    }

    #[test]
    fn partner_of_returns_other_side() {
        let a = Uuid::from_u128(10);
        let b = Uuid::from_u128(20);
        let m = ProductMatch::new(a, b, 0.9, MatchType::Fuzzy, ts());
        assert_eq!(m.partner_of(a), Some(b));
        assert_eq!(m.partner_of(b), Some(a));
        assert_eq!(m.partner_of(Uuid::from_u128(30)), None);
    }

    #[test]
    fn rejected_and_reviewed_rows_are_human_decisions() {
        let mut m = ProductMatch::new(
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            0.9,
            MatchType::Fuzzy,
            ts(),
        );
        assert!(!m.is_human_decision());
        m.reviewed = true;
        assert!(m.is_human_decision());
        m.reviewed = false;
        m.match_type = MatchType::Rejected;
        assert!(m.is_human_decision());
    }

    #[test]
    fn history_change_percentage_is_derived() {
        let entry = PriceHistoryEntry::new(
            Uuid::nil(),
            "Supplier A",
            Some(Decimal::from(10_000)),
            Decimal::from(11_000),
            ts(),
        );
        assert_eq!(entry.change_percentage, Some(Decimal::from(10)));
    }

    #[test]
    fn history_first_price_has_no_change_percentage() {
        let entry =
            PriceHistoryEntry::new(Uuid::nil(), "Supplier A", None, Decimal::from(5000), ts());
        assert_eq!(entry.change_percentage, None);
    }

    #[test]
    fn status_and_match_type_round_trip_through_str() {
        for status in [
            ProductStatus::Active,
            ProductStatus::Discontinued,
            ProductStatus::Merged,
        ] {
            assert_eq!(status.as_str().parse::<ProductStatus>(), Ok(status));
        }
        for match_type in [
            MatchType::Exact,
            MatchType::Fuzzy,
            MatchType::Manual,
            MatchType::Rejected,
        ] {
            assert_eq!(match_type.as_str().parse::<MatchType>(), Ok(match_type));
        }
        assert!("pending".parse::<MatchType>().is_err());
    }
}
