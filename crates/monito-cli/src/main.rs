mod catalog;
mod ingest;
mod matches;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use monito_core::{load_brand_aliases, AppConfig, BrandAliases};
use monito_engine::{
    CatalogStore, IngestPipeline, MatchingConfig, MatchingEngine, PriceComparisonEngine,
    PricingConfig, SimilarityScorer, UnifiedCatalogManager,
};

#[derive(Debug, Parser)]
#[command(name = "monito-cli")]
#[command(about = "Monito supplier price catalog command line interface")]
struct Cli {
    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Match and store a supplier's standardized price list
    Ingest {
        /// JSON array of standardized product records
        #[arg(long)]
        file: PathBuf,
        /// Supplier the prices belong to
        #[arg(long)]
        supplier: String,
        /// Price date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Match against an empty in-memory catalog without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the unified catalog with best current prices
    Catalog {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        brand: Option<String>,
        /// Free-text product search
        #[arg(long, conflicts_with = "brand")]
        search: Option<String>,
    },
    /// Price analysis for one master product
    Analyze {
        #[arg(long)]
        product: Uuid,
    },
    /// Products with the largest savings
    Deals {
        /// Minimum savings versus the most expensive supplier, in percent
        #[arg(long, default_value = "5")]
        min_savings: f64,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Catalog summary figures
    Stats,
    /// Review product matches
    Matches {
        #[command(subcommand)]
        command: MatchCommands,
    },
    /// Merge a duplicate master product into another
    Merge {
        #[arg(long)]
        source: Uuid,
        #[arg(long)]
        target: Uuid,
    },
    /// Best supplier for each product on a shopping list
    Recommend {
        /// JSON array of `{ "name": ..., "quantity": ... }`
        #[arg(long)]
        file: PathBuf,
        /// Spend limit for the whole list
        #[arg(long)]
        budget: Option<Decimal>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Run pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[derive(Debug, Subcommand)]
enum MatchCommands {
    /// List unreviewed matches
    Suggest {
        #[arg(long, default_value = "0.8")]
        min_confidence: f64,
    },
    /// Confirm a match
    Approve {
        #[arg(long)]
        id: Uuid,
    },
    /// Reject a match so it is never proposed again
    Reject {
        #[arg(long)]
        id: Uuid,
    },
    /// Look for duplicate master products across the catalog
    Scan,
}

/// The engines wired to one store.
pub(crate) struct Services {
    pub matcher: MatchingEngine,
    pub pricing: PriceComparisonEngine,
    pub catalog: UnifiedCatalogManager,
    pub pipeline: IngestPipeline,
}

impl Services {
    fn new(store: Arc<dyn CatalogStore>, config: &AppConfig, aliases: Arc<BrandAliases>) -> Self {
        let matcher = MatchingEngine::new(
            store.clone(),
            SimilarityScorer::new(aliases),
            MatchingConfig::from_app_config(config),
        );
        let pricing = PriceComparisonEngine::new(
            store,
            matcher.clone(),
            PricingConfig::from_app_config(config),
        );
        Self {
            catalog: UnifiedCatalogManager::new(pricing.clone()),
            pipeline: IngestPipeline::new(matcher.clone()),
            matcher,
            pricing,
        }
    }
}

fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

fn brand_aliases(config: &AppConfig) -> anyhow::Result<Arc<BrandAliases>> {
    let aliases = match &config.brand_aliases_path {
        Some(path) => load_brand_aliases(path)?,
        None => BrandAliases::builtin(),
    };
    tracing::debug!(aliases = aliases.len(), "brand aliases loaded");
    Ok(Arc::new(aliases))
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    Ok(monito_db::connect_pool_from_config(config).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("monito-cli ready; see --help for commands");
        return Ok(());
    };

    let config = monito_core::load_app_config_from_env()?;
    init_tracing(&config.log_level)?;
    tracing::debug!(env = %config.env, "configuration loaded");
    let aliases = brand_aliases(&config)?;
    let json = cli.json;

    if let Commands::Ingest {
        file,
        supplier,
        date,
        dry_run: true,
    } = &command
    {
        let store: Arc<dyn CatalogStore> = Arc::new(monito_engine::InMemoryCatalogStore::new());
        let services = Services::new(store, &config, aliases);
        return ingest::run_ingest(&services, file, supplier, *date, true, json).await;
    }

    let pool = connect(&config).await?;
    if let Commands::Db { command } = &command {
        return match command {
            DbCommands::Migrate => {
                let applied = monito_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
                Ok(())
            }
            DbCommands::Ping => {
                monito_db::ping(&pool).await?;
                println!("database reachable");
                Ok(())
            }
        };
    }

    let store: Arc<dyn CatalogStore> = Arc::new(monito_db::PgCatalogStore::new(pool));
    let services = Services::new(store, &config, aliases);

    match command {
        Commands::Db { .. } => Ok(()),
        Commands::Ingest {
            file,
            supplier,
            date,
            dry_run,
        } => ingest::run_ingest(&services, &file, &supplier, date, dry_run, json).await,
        Commands::Catalog {
            category,
            brand,
            search,
        } => {
            catalog::run_catalog(
                &services,
                category.as_deref(),
                brand.as_deref(),
                search.as_deref(),
                json,
            )
            .await
        }
        Commands::Analyze { product } => catalog::run_analyze(&services, product, json).await,
        Commands::Deals { min_savings, limit } => {
            catalog::run_deals(&services, min_savings, limit, json).await
        }
        Commands::Stats => catalog::run_stats(&services, json).await,
        Commands::Matches { command } => match command {
            MatchCommands::Suggest { min_confidence } => {
                matches::run_suggest(&services, min_confidence, json).await
            }
            MatchCommands::Approve { id } => matches::run_approve(&services, id, json).await,
            MatchCommands::Reject { id } => matches::run_reject(&services, id, json).await,
            MatchCommands::Scan => matches::run_scan(&services, json).await,
        },
        Commands::Merge { source, target } => {
            matches::run_merge(&services, source, target, json).await
        }
        Commands::Recommend { file, budget } => {
            catalog::run_recommend(&services, &file, budget, json).await
        }
    }
}

/// Prints `value` as pretty JSON.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Truncates `s` to `max` characters with a trailing ellipsis.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}
