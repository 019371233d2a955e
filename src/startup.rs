use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{InMemoryLedger, InMemoryLinkStore, PostgresLinkStore, RedisLedger};
use crate::config::Config;
use crate::ports::{LinkStore, ReconciliationLedger};
use crate::provider::{CardProvider, HttpCardProvider};
use crate::{db, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Ok,
    Failed,
    /// Backend not configured; the in-memory fallback is used.
    Skipped,
}

impl Check {
    fn label(&self) -> &'static str {
        match self {
            Check::Ok => "✅ OK",
            Check::Failed => "❌ FAIL",
            Check::Skipped => "➖ SKIPPED (in-memory)",
        }
    }
}

pub struct ValidationReport {
    pub environment: Check,
    pub database: Check,
    pub redis: Check,
    pub provider: Check,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        [self.environment, self.database, self.redis, self.provider]
            .iter()
            .all(|check| *check != Check::Failed)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", self.environment.label());
        println!("Database Connectivity: {}", self.database.label());
        println!("Redis Connectivity:    {}", self.redis.label());
        println!("Card Provider:         {}", self.provider.label());

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!(
            "\nOverall Status: {}",
            if self.is_valid() { "✅ PASS" } else { "❌ FAIL" }
        );
        println!("=================================\n");
    }
}

pub async fn validate_environment(config: &Config) -> ValidationReport {
    let mut report = ValidationReport {
        environment: Check::Ok,
        database: Check::Skipped,
        redis: Check::Skipped,
        provider: Check::Ok,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = Check::Failed;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Some(url) = &config.database_url {
        report.database = match validate_database(url).await {
            Ok(()) => Check::Ok,
            Err(e) => {
                report.errors.push(format!("Database: {:#}", e));
                Check::Failed
            }
        };
    }

    if let Some(url) = &config.redis_url {
        report.redis = match validate_redis(url).await {
            Ok(()) => Check::Ok,
            Err(e) => {
                report.errors.push(format!("Redis: {:#}", e));
                Check::Failed
            }
        };
    }

    if let Err(e) = validate_provider(&config.provider_api_url).await {
        report.provider = Check::Failed;
        report.errors.push(format!("Card provider: {:#}", e));
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    for (name, value) in [
        ("PROVIDER_SECRET_KEY", &config.provider_secret_key),
        ("PROVIDER_PUBLISHABLE_KEY", &config.provider_publishable_key),
        ("MERCHANT_API_KEY", &config.merchant_api_key),
        ("RAIL_WEBHOOK_SECRET", &config.rail_webhook_secret),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("{} is empty", name);
        }
    }

    url::Url::parse(&config.provider_api_url).context("PROVIDER_API_URL is not a valid URL")?;
    url::Url::parse(&config.public_base_url).context("PUBLIC_BASE_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(database_url: &str) -> Result<()> {
    let pool = db::create_pool(database_url)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(&pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

/// Any HTTP answer proves the provider is reachable; auth is checked per call.
async fn validate_provider(api_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    client
        .get(api_url)
        .send()
        .await
        .context("Failed to reach card provider")?;

    Ok(())
}

/// Wires adapters from configuration, falling back to in-memory backends for
/// anything not configured.
pub async fn build_state(config: Config) -> Result<AppState> {
    let (store, store_backend): (Arc<dyn LinkStore>, &'static str) = match &config.database_url
    {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            (Arc::new(PostgresLinkStore::new(pool)), "postgres")
        }
        None => {
            tracing::warn!("DATABASE_URL not set; links are kept in memory and lost on restart");
            (Arc::new(InMemoryLinkStore::new()), "memory")
        }
    };

    let ledger: Arc<dyn ReconciliationLedger> = match &config.redis_url {
        Some(url) => Arc::new(RedisLedger::new(url)?),
        None => {
            tracing::warn!("REDIS_URL not set; using in-process reconciliation ledger");
            Arc::new(InMemoryLedger::new())
        }
    };

    let provider: Arc<dyn CardProvider> = Arc::new(HttpCardProvider::new(
        config.provider_api_url.clone(),
        config.provider_secret_key.clone(),
        config.provider_publishable_key.clone(),
    ));
    tracing::info!(
        provider = %config.provider_api_url,
        store = store_backend,
        "Card provider client initialized"
    );

    Ok(AppState::new(config, store, ledger, provider, store_backend))
}
