//! Name and brand folding shared by the exact tier and the scorer.

use rust_decimal::Decimal;
use uuid::Uuid;

use monito_core::{fold_key, BrandAliases, ProductRecord, Unit};

const STOPWORDS: &[&str] = &["the", "a", "an", "and", "of", "with", "for"];

/// Namespace for record fingerprints.
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6d6f_6e69_746f_4000_8000_7265_636f_7264);

/// Folds a product name into its comparison key.
///
/// Lowercases, turns punctuation into spaces (keeping decimal points between
/// digits), drops stopwords and glues a number to a following unit word.
/// `"COCA COLA 330 ML"` and `"Coca Cola 330ml"` both fold to `"coca cola 330ml"`.
#[must_use]
pub fn fold_name(raw: &str) -> String {
    let lower: Vec<char> = raw.to_lowercase().chars().collect();
    let mut cleaned = String::with_capacity(lower.len());
    for (i, &c) in lower.iter().enumerate() {
        let between_digits = i > 0
            && lower[i - 1].is_ascii_digit()
            && lower.get(i + 1).is_some_and(char::is_ascii_digit);
        if c.is_alphanumeric() {
            cleaned.push(c);
        } else if (c == '.' || c == ',') && between_digits {
            cleaned.push('.');
        } else {
            cleaned.push(' ');
        }
    }

    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .collect();

    let mut folded: Vec<String> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        let glued_unit = tokens
            .get(i + 1)
            .filter(|_| is_number(token))
            .and_then(|next| next.parse::<Unit>().ok());
        match glued_unit {
            Some(unit) => {
                folded.push(format!("{token}{unit}"));
                i += 2;
            }
            None => {
                folded.push(token.to_string());
                i += 1;
            }
        }
    }
    folded.join(" ")
}

/// Folds a brand and maps it through the alias table. Blank brands are absent.
#[must_use]
pub fn fold_brand(raw: Option<&str>, aliases: &BrandAliases) -> Option<String> {
    let folded = fold_key(raw?);
    if folded.is_empty() {
        return None;
    }
    Some(aliases.canonicalize(&folded))
}

/// Tokens of a folded name sorted alphabetically, for order-insensitive comparison.
#[must_use]
pub fn token_sorted(folded: &str) -> String {
    let mut tokens: Vec<&str> = folded.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Deterministic identity for a record that has no catalog id yet.
///
/// Identical input data always yields the same id; any change to name,
/// brand, category or pack size yields a different one.
#[must_use]
pub fn record_fingerprint(record: &ProductRecord, aliases: &BrandAliases) -> Uuid {
    let name = fold_name(&record.standardized_name);
    let brand = fold_brand(record.brand(), aliases).unwrap_or_default();
    let category = fold_key(&record.category);
    let size = record
        .size
        .map(|s| s.normalize().to_string())
        .unwrap_or_default();
    let unit = record.unit.map(Unit::as_str).unwrap_or_default();
    let key = format!("{name}\u{1f}{brand}\u{1f}{category}\u{1f}{size}\u{1f}{unit}");
    Uuid::new_v5(&RECORD_NAMESPACE, key.as_bytes())
}

fn is_number(token: &str) -> bool {
    token.parse::<Decimal>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, brand: Option<&str>) -> ProductRecord {
        ProductRecord {
            original_name: name.to_string(),
            standardized_name: name.to_string(),
            brand: brand.map(str::to_string),
            size: Some(Decimal::from(330)),
            unit: Some(Unit::Ml),
            price: Decimal::from(15_000),
            currency: "IDR".to_string(),
            category: "beverages".to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn fold_name_glues_size_and_unit() {
        assert_eq!(fold_name("COCA COLA 330 ML"), "coca cola 330ml");
        assert_eq!(fold_name("Coca Cola 330ml"), "coca cola 330ml");
        assert_eq!(fold_name("Gula Pasir 1 Kilo"), "gula pasir 1kg");
    }

    #[test]
    fn fold_name_drops_stopwords_and_punctuation() {
        assert_eq!(fold_name("The Best-of Rice, with Beans"), "best rice beans");
    }

    #[test]
    fn fold_name_keeps_decimal_points() {
        assert_eq!(fold_name("Aqua 1.5 L"), "aqua 1.5l");
        assert_eq!(fold_name("Aqua 1,5 L"), "aqua 1.5l");
    }

    #[test]
    fn fold_name_is_idempotent() {
        let once = fold_name("Indomie Goreng 85 gr. (Pack of 5)");
        assert_eq!(fold_name(&once), once);
    }

    #[test]
    fn fold_brand_uses_aliases() {
        let aliases = BrandAliases::builtin();
        assert_eq!(
            fold_brand(Some("COCA COLA"), &aliases),
            fold_brand(Some("Coca-Cola"), &aliases)
        );
        assert_eq!(
            fold_brand(Some("Coke"), &aliases).as_deref(),
            Some("coca cola")
        );
        assert_eq!(fold_brand(Some("  "), &aliases), None);
        assert_eq!(fold_brand(None, &aliases), None);
    }

    #[test]
    fn token_sorted_orders_tokens() {
        assert_eq!(token_sorted("goreng mie indomie"), "goreng indomie mie");
    }

    #[test]
    fn fingerprint_is_stable_for_equivalent_spellings() {
        let aliases = BrandAliases::builtin();
        let a = record("Coca Cola 330ml", Some("COCA COLA"));
        let b = record("COCA COLA 330 ML", Some("Coca-Cola"));
        assert_eq!(
            record_fingerprint(&a, &aliases),
            record_fingerprint(&b, &aliases)
        );
    }

    #[test]
    fn fingerprint_changes_with_data() {
        let aliases = BrandAliases::builtin();
        let a = record("Coca Cola 330ml", Some("COCA COLA"));
        let mut b = a.clone();
        b.size = Some(Decimal::from(500));
        assert_ne!(
            record_fingerprint(&a, &aliases),
            record_fingerprint(&b, &aliases)
        );
    }
}
