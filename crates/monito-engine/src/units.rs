//! Per-base-unit price normalization.
//!
//! Mass prices become per gram, volume prices per millilitre, and count
//! prices per piece. Arithmetic stays in `Decimal` throughout; only the
//! storage form is rounded.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use monito_core::{Dimension, Unit};

use crate::error::NormalizeError;

/// Significant digits kept when a normalized price is persisted.
pub const STORAGE_SIGNIFICANT_DIGITS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    PerGram,
    PerMl,
    PerPiece,
}

impl Basis {
    #[must_use]
    pub fn of(unit: Unit) -> Self {
        match unit.dimension() {
            Dimension::Mass => Basis::PerGram,
            Dimension::Volume => Basis::PerMl,
            Dimension::Count => Basis::PerPiece,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Basis::PerGram => "per_gram",
            Basis::PerMl => "per_ml",
            Basis::PerPiece => "per_piece",
        }
    }
}

impl std::fmt::Display for Basis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quantity expressed in its dimension's base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity {
    pub amount: Decimal,
    pub basis: Basis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPrice {
    /// Full precision; use this for comparisons.
    pub value: Decimal,
    pub basis: Basis,
}

impl NormalizedPrice {
    /// The value rounded to six significant digits for storage.
    #[must_use]
    pub fn storage_value(&self) -> Decimal {
        self.value
            .round_sf(STORAGE_SIGNIFICANT_DIGITS)
            .unwrap_or(self.value)
    }

    /// Orders two prices of the same basis.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::IncompatibleUnit`] when the bases differ.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering, NormalizeError> {
        if self.basis != other.basis {
            return Err(NormalizeError::IncompatibleUnit {
                left: self.basis,
                right: other.basis,
            });
        }
        Ok(self.value.cmp(&other.value))
    }
}

/// Converts a pack size to base units.
///
/// Count units default to a size of one when the size is absent. A record
/// with neither size nor unit counts as a single piece.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidQuantity`] for a non-positive size,
/// [`NormalizeError::Overflow`] when the size does not fit in base units, and
/// [`NormalizeError::MissingQuantity`] when a mass or volume unit has no size
/// or a size has no unit.
pub fn quantity(size: Option<Decimal>, unit: Option<Unit>) -> Result<Quantity, NormalizeError> {
    match (size, unit) {
        (Some(size), Some(unit)) => {
            if size <= Decimal::ZERO {
                return Err(NormalizeError::InvalidQuantity {
                    field: "size",
                    value: size,
                });
            }
            let amount = size
                .checked_mul(unit.factor())
                .ok_or(NormalizeError::Overflow {
                    field: "size",
                    value: size,
                })?;
            Ok(Quantity {
                amount,
                basis: Basis::of(unit),
            })
        }
        (None, Some(unit)) if unit.dimension() == Dimension::Count => Ok(Quantity {
            amount: Decimal::ONE,
            basis: Basis::PerPiece,
        }),
        (None, Some(_)) => Err(NormalizeError::MissingQuantity(
            "mass and volume units need a size",
        )),
        (Some(_), None) => Err(NormalizeError::MissingQuantity("size given without a unit")),
        (None, None) => Ok(Quantity {
            amount: Decimal::ONE,
            basis: Basis::PerPiece,
        }),
    }
}

/// Normalizes a price to its per-base-unit value.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidQuantity`] when the price or size is not
/// positive, [`NormalizeError::Overflow`] when the size or the per-unit value
/// is out of range, or [`NormalizeError::MissingQuantity`] for an unusable
/// size/unit pair.
pub fn normalize(
    price: Decimal,
    size: Option<Decimal>,
    unit: Option<Unit>,
) -> Result<NormalizedPrice, NormalizeError> {
    if price <= Decimal::ZERO {
        return Err(NormalizeError::InvalidQuantity {
            field: "price",
            value: price,
        });
    }
    let qty = quantity(size, unit)?;
    let value = price
        .checked_div(qty.amount)
        .ok_or(NormalizeError::Overflow {
            field: "price",
            value: price,
        })?;
    Ok(NormalizedPrice {
        value,
        basis: qty.basis,
    })
}

/// Normalizes two offers and orders them by per-base-unit cost.
///
/// # Errors
///
/// Returns [`NormalizeError::IncompatibleUnit`] when the offers measure
/// different dimensions, or any error from [`normalize`].
pub fn compare(
    a: (Decimal, Option<Decimal>, Option<Unit>),
    b: (Decimal, Option<Decimal>, Option<Unit>),
) -> Result<Ordering, NormalizeError> {
    let left = normalize(a.0, a.1, a.2)?;
    let right = normalize(b.0, b.1, b.2)?;
    left.try_cmp(&right)
}

/// Relative size difference `|a - b| / max(a, b)` in `[0, 1]`.
///
/// # Errors
///
/// Returns [`NormalizeError::IncompatibleUnit`] when the bases differ.
pub fn relative_difference(a: Quantity, b: Quantity) -> Result<Decimal, NormalizeError> {
    if a.basis != b.basis {
        return Err(NormalizeError::IncompatibleUnit {
            left: a.basis,
            right: b.basis,
        });
    }
    let larger = a.amount.max(b.amount);
    (a.amount - b.amount)
        .abs()
        .checked_div(larger)
        .ok_or(NormalizeError::InvalidQuantity {
            field: "size",
            value: larger,
        })
}
