use std::env::VarError;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Loads `.env` (if present), then reads the configuration from the process
/// environment.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Reads the configuration from the process environment without touching
/// `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Typed reads over an env-var lookup, so tests can pass a map.
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    fn required(&self, var: &str) -> Result<String, ConfigError> {
        (self.lookup)(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    }

    /// The value, with blank treated as unset.
    fn optional(&self, var: &str) -> Option<String> {
        (self.lookup)(var).ok().filter(|v| !v.trim().is_empty())
    }

    fn text(&self, var: &str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(var) {
            Some(raw) => raw.trim().parse::<T>().map_err(|e| invalid(var, e)),
            None => Ok(default),
        }
    }

    fn positive(&self, var: &str, default: u32) -> Result<u32, ConfigError> {
        match self.parsed(var, default)? {
            0 => Err(invalid(var, "must be greater than zero")),
            n => Ok(n),
        }
    }

    fn threshold(&self, var: &str, default: f64) -> Result<f64, ConfigError> {
        let value: f64 = self.parsed(var, default)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(var, format!("must be within [0, 1], got {value}")));
        }
        Ok(value)
    }
}

fn invalid(var: &str, reason: impl Display) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Builds the configuration from an arbitrary env-var lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let env = EnvReader { lookup };

    let database_url = env.required("DATABASE_URL")?;
    let environment: Environment = env.parsed("MONITO_ENV", Environment::Development)?;
    let log_level = env.text("MONITO_LOG_LEVEL", "info");
    let brand_aliases_path = env.optional("MONITO_BRAND_ALIASES_PATH").map(PathBuf::from);

    let db_max_connections = env.positive("MONITO_DB_MAX_CONNECTIONS", 10)?;
    let db_min_connections: u32 = env.parsed("MONITO_DB_MIN_CONNECTIONS", 1)?;
    if db_min_connections > db_max_connections {
        return Err(ConfigError::Validation(format!(
            "pool minimum {db_min_connections} exceeds maximum {db_max_connections}"
        )));
    }
    let db_acquire_timeout_secs: u64 = env.parsed("MONITO_DB_ACQUIRE_TIMEOUT_SECS", 10)?;

    let fuzzy_threshold = env.threshold("MONITO_FUZZY_THRESHOLD", 0.8)?;
    let auto_merge_threshold = env.threshold("MONITO_AUTO_MERGE_THRESHOLD", 0.95)?;
    if fuzzy_threshold > auto_merge_threshold {
        return Err(ConfigError::Validation(format!(
            "fuzzy threshold {fuzzy_threshold} exceeds auto-merge threshold {auto_merge_threshold}"
        )));
    }

    Ok(AppConfig {
        database_url,
        env: environment,
        log_level,
        brand_aliases_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        fuzzy_threshold,
        auto_merge_threshold,
        freshness_days: env.positive("MONITO_FRESHNESS_DAYS", 30)?,
        trend_window_days: env.positive("MONITO_TREND_WINDOW_DAYS", 90)?,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
