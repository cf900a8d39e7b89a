use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::units::Unit;
use crate::ValidationError;

/// Currency assumed when a supplier file does not state one.
pub const DEFAULT_CURRENCY: &str = "IDR";

/// One supplier row after LLM standardization, ready for matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Raw product text exactly as it appeared in the supplier file.
    pub original_name: String,
    /// Normalized English name produced by the standardizer.
    pub standardized_name: String,
    #[serde(default)]
    pub brand: Option<String>,
    /// Numeric pack magnitude only, e.g. `330` for a 330 ml can.
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<Unit>,
    pub price: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub category: String,
    /// Standardizer's self-reported confidence. Informational only.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl ProductRecord {
    /// Checks the boundary invariants before a record reaches matching.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the price or size is not positive,
    /// when the size overflows once converted to base units,
    /// when only one of size/unit is present, when confidence falls outside
    /// `[0, 1]`, or when a required text field is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.standardized_name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "standardized_name",
            });
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "category" });
        }
        if self.currency.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "currency" });
        }
        if self.price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice(self.price));
        }
        match (self.size, self.unit) {
            (Some(size), Some(_)) if size <= Decimal::ZERO => {
                return Err(ValidationError::NonPositiveSize(size));
            }
            (Some(size), Some(unit)) if size.checked_mul(unit.factor()).is_none() => {
                return Err(ValidationError::SizeOutOfRange { size, unit });
            }
            (Some(_), None) | (None, Some(_)) => return Err(ValidationError::SizeUnitMismatch),
            _ => {}
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }

    /// Brand with surrounding whitespace removed; blank brands read as absent.
    #[must_use]
    pub fn brand(&self) -> Option<&str> {
        self.brand
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_confidence() -> f64 {
    1.0
}
