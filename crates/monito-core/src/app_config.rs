use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "development" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Settings for one process, read once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    /// Optional YAML alias table; the built-in table is used when unset.
    pub brand_aliases_path: Option<PathBuf>,

    // Postgres pool
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    // Matching
    pub fuzzy_threshold: f64,
    pub auto_merge_threshold: f64,

    // Pricing windows, in days
    pub freshness_days: u32,
    pub trend_window_days: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[redacted]")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("brand_aliases_path", &self.brand_aliases_path)
            .field(
                "pool",
                &format_args!(
                    "{}..={} connections, {}s acquire timeout",
                    self.db_min_connections, self.db_max_connections, self.db_acquire_timeout_secs
                ),
            )
            .field("fuzzy_threshold", &self.fuzzy_threshold)
            .field("auto_merge_threshold", &self.auto_merge_threshold)
            .field("freshness_days", &self.freshness_days)
            .field("trend_window_days", &self.trend_window_days)
            .finish()
    }
}
