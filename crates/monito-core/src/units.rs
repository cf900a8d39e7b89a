use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Packaging unit attached to a product size.
///
/// Serializes as the canonical lowercase code and deserializes from any
/// spelling [`FromStr`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    G,
    Kg,
    Ml,
    L,
    Pcs,
    Box,
    Pack,
    Set,
    Pair,
}

/// The physical quantity a [`Unit`] measures. Units from different
/// dimensions are never comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

impl Dimension {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Mass => "mass",
            Dimension::Volume => "volume",
            Dimension::Count => "count",
        }
    }
}

/// A pack size in its dimension's base unit, so `1 kg` and `1000 g` are the
/// same pack. Part of the master product match key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pack {
    pub dimension: Dimension,
    pub amount: Decimal,
}

impl Pack {
    /// `None` without a unit, for a mass or volume unit without a size, or
    /// when the size does not fit in base units. Count units default to one
    /// piece.
    #[must_use]
    pub fn new(size: Option<Decimal>, unit: Option<Unit>) -> Option<Self> {
        let unit = unit?;
        let dimension = unit.dimension();
        let size = match (size, dimension) {
            (Some(size), _) => size,
            (None, Dimension::Count) => Decimal::ONE,
            (None, _) => return None,
        };
        let amount = size.checked_mul(unit.factor())?.normalize();
        Some(Self { dimension, amount })
    }
}

impl Unit {
    /// Multiplier that converts a size in this unit to the dimension's base
    /// unit (grams, millilitres, pieces).
    #[must_use]
    pub fn factor(self) -> Decimal {
        match self {
            Unit::Kg | Unit::L => Decimal::ONE_THOUSAND,
            Unit::G | Unit::Ml | Unit::Pcs | Unit::Box | Unit::Pack | Unit::Set | Unit::Pair => {
                Decimal::ONE
            }
        }
    }

    #[must_use]
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::G | Unit::Kg => Dimension::Mass,
            Unit::Ml | Unit::L => Dimension::Volume,
            Unit::Pcs | Unit::Box | Unit::Pack | Unit::Set | Unit::Pair => Dimension::Count,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::G => "g",
            Unit::Kg => "kg",
            Unit::Ml => "ml",
            Unit::L => "l",
            Unit::Pcs => "pcs",
            Unit::Box => "box",
            Unit::Pack => "pack",
            Unit::Set => "set",
            Unit::Pair => "pair",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Unit {
    type Err = ValidationError;

    /// Parses the unit spellings seen in supplier price lists.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let unit = match lower.trim_end_matches('.') {
            "g" | "gr" | "gram" | "grams" | "gramm" => Unit::G,
            "kg" | "kgs" | "kilo" | "kilogram" | "kilograms" => Unit::Kg,
            "ml" | "milliliter" | "millilitre" | "milliliters" | "millilitres" | "cc" => Unit::Ml,
            "l" | "lt" | "ltr" | "liter" | "litre" | "liters" | "litres" => Unit::L,
            "pcs" | "pc" | "piece" | "pieces" | "unit" | "units" | "ea" => Unit::Pcs,
            "box" | "boxes" => Unit::Box,
            "pack" | "packs" | "packet" | "packets" | "pck" => Unit::Pack,
            "set" | "sets" => Unit::Set,
            "pair" | "pairs" => Unit::Pair,
            _ => return Err(ValidationError::UnknownUnit(s.to_string())),
        };
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factors_follow_conversion_table() {
        assert_eq!(Unit::G.factor(), Decimal::ONE);
        assert_eq!(Unit::Kg.factor(), Decimal::from(1000));
        assert_eq!(Unit::Ml.factor(), Decimal::ONE);
        assert_eq!(Unit::L.factor(), Decimal::from(1000));
        for unit in [Unit::Pcs, Unit::Box, Unit::Pack, Unit::Set, Unit::Pair] {
            assert_eq!(unit.factor(), Decimal::ONE, "{unit}");
        }
    }

    #[test]
    fn dimensions_partition_units() {
        assert_eq!(Unit::Kg.dimension(), Dimension::Mass);
        assert_eq!(Unit::L.dimension(), Dimension::Volume);
        assert_eq!(Unit::Pair.dimension(), Dimension::Count);
        assert_ne!(Unit::G.dimension(), Unit::Ml.dimension());
    }

    #[test]
    fn pack_reduces_to_base_units() {
        let kilo = Pack::new(Some(Decimal::ONE), Some(Unit::Kg)).unwrap();
        let grams = Pack::new(Some(Decimal::new(10_000, 1)), Some(Unit::G)).unwrap();
        assert_eq!(kilo, grams);
        assert_eq!(kilo.dimension, Dimension::Mass);
        assert_eq!(kilo.amount, Decimal::from(1000));

        let litre = Pack::new(Some(Decimal::ONE), Some(Unit::L)).unwrap();
        assert_ne!(kilo, litre);
    }

    #[test]
    fn pack_sizes_stay_distinct() {
        let five = Pack::new(Some(Decimal::from(5)), Some(Unit::Kg));
        let twenty_five = Pack::new(Some(Decimal::from(25)), Some(Unit::Kg));
        assert_ne!(five, twenty_five);
    }

    #[test]
    fn pack_defaults_count_units_to_one_piece() {
        assert_eq!(
            Pack::new(None, Some(Unit::Box)),
            Pack::new(Some(Decimal::ONE), Some(Unit::Pcs))
        );
        assert_eq!(Pack::new(None, Some(Unit::Kg)), None);
        assert_eq!(Pack::new(Some(Decimal::ONE), None), None);
    }

    #[test]
    fn pack_overflow_has_no_key() {
        assert_eq!(Pack::new(Some(Decimal::MAX), Some(Unit::Kg)), None);
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!("Gram".parse::<Unit>().unwrap(), Unit::G);
        assert_eq!(" KG ".parse::<Unit>().unwrap(), Unit::Kg);
        assert_eq!("litre".parse::<Unit>().unwrap(), Unit::L);
        assert_eq!("pieces".parse::<Unit>().unwrap(), Unit::Pcs);
        assert_eq!("packet".parse::<Unit>().unwrap(), Unit::Pack);
        assert_eq!("ml.".parse::<Unit>().unwrap(), Unit::Ml);
    }

    #[test]
    fn unknown_spelling_is_rejected() {
        let err = "bushel".parse::<Unit>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownUnit("bushel".to_string()));
    }

    #[test]
    fn serde_uses_lowercase_codes() {
        let json = serde_json::to_string(&Unit::Pcs).unwrap();
        assert_eq!(json, "\"pcs\"");
        let unit: Unit = serde_json::from_str("\"kg\"").unwrap();
        assert_eq!(unit, Unit::Kg);
    }

    #[test]
    fn serde_accepts_supplier_spellings() {
        let unit: Unit = serde_json::from_str("\"Litre\"").unwrap();
        assert_eq!(unit, Unit::L);
        assert!(serde_json::from_str::<Unit>("\"bushel\"").is_err());
    }
}
