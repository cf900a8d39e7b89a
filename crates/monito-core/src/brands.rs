use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// On-disk shape of the brand alias file: canonical brand to alternate spellings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandAliasesFile {
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

/// Folded alias to folded canonical brand lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrandAliases {
    map: HashMap<String, String>,
}

impl BrandAliases {
    /// Builds the lookup from a parsed file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` when a canonical or alias is blank,
    /// or when one spelling is claimed by two canonical brands.
    pub fn from_file(file: &BrandAliasesFile) -> Result<Self, ConfigError> {
        let mut map: HashMap<String, String> = HashMap::new();

        for canonical in file.aliases.keys() {
            let key = fold_key(canonical);
            if key.is_empty() {
                return Err(ConfigError::Validation(
                    "canonical brand must be non-empty".to_string(),
                ));
            }
            map.insert(key.clone(), key);
        }

        for (canonical, aliases) in &file.aliases {
            let target = fold_key(canonical);
            for alias in aliases {
                let key = fold_key(alias);
                if key.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "brand '{canonical}' has a blank alias"
                    )));
                }
                match map.get(&key) {
                    Some(existing) if *existing != target => {
                        return Err(ConfigError::Validation(format!(
                            "alias '{alias}' is claimed by both '{existing}' and '{target}'"
                        )));
                    }
                    _ => {
                        map.insert(key, target.clone());
                    }
                }
            }
        }

        Ok(Self { map })
    }

    /// The alias table shipped with the catalog, used when no file is configured.
    #[must_use]
    pub fn builtin() -> Self {
        let table: [(&str, &[&str]); 6] = [
            ("coca-cola", &["coca cola", "coke", "cocacola"]),
            ("pepsi", &["pepsi cola"]),
            ("indomie", &["indo mie", "indomee"]),
            ("maggi", &["magi"]),
            ("barilla", &["barila"]),
            ("abc", &["a.b.c", "a b c"]),
        ];
        let mut map = HashMap::new();
        for (canonical, aliases) in table {
            let target = fold_key(canonical);
            map.insert(target.clone(), target.clone());
            for alias in aliases {
                map.insert(fold_key(alias), target.clone());
            }
        }
        Self { map }
    }

    /// Maps an already folded brand to its canonical spelling, or returns it unchanged.
    #[must_use]
    pub fn canonicalize(&self, folded: &str) -> String {
        self.map
            .get(folded)
            .cloned()
            .unwrap_or_else(|| folded.to_string())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Load and validate brand aliases from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_brand_aliases(path: &Path) -> Result<BrandAliases, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::AliasesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: BrandAliasesFile =
        serde_yaml::from_str(&content).map_err(ConfigError::AliasesFileParse)?;

    BrandAliases::from_file(&file)
}

/// Lowercases, turns punctuation into spaces and collapses whitespace.
///
/// `"COCA-COLA  Company"` folds to `"coca cola company"`.
#[must_use]
pub fn fold_key(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
