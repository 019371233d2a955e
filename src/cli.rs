use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::adapters::PostgresLinkStore;
use crate::config::Config;
use crate::ports::LinkStore;
use crate::startup;

#[derive(Parser)]
#[command(name = "paylink-core")]
#[command(about = "Paylink Core - payment links and checkout confirmation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Payment link maintenance
    #[command(subcommand)]
    Links(LinksCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum LinksCommands {
    /// Mark every lapsed or exhausted active link as expired
    SweepExpired,

    /// Print payments held for manual review
    Flagged {
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
}

async fn postgres_store(config: &Config) -> anyhow::Result<PostgresLinkStore> {
    let Some(url) = &config.database_url else {
        anyhow::bail!("DATABASE_URL is required for this command");
    };
    let pool = crate::db::create_pool(url).await?;
    Ok(PostgresLinkStore::new(pool))
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let Some(url) = &config.database_url else {
        anyhow::bail!("DATABASE_URL is required to run migrations");
    };
    let pool = crate::db::create_pool(url).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_links_sweep(config: &Config) -> anyhow::Result<()> {
    let store = postgres_store(config).await?;
    let expired = store.expire_stale(Utc::now()).await?;

    tracing::info!(expired, "Expiry sweep completed");
    println!("✓ {} payment link(s) marked expired", expired);
    Ok(())
}

pub async fn handle_links_flagged(config: &Config, limit: i64) -> anyhow::Result<()> {
    let store = postgres_store(config).await?;
    let flagged = store.list_flagged(limit.clamp(1, 100), 0).await?;

    if flagged.is_empty() {
        println!("✓ No flagged payments");
        return Ok(());
    }

    for payment in flagged {
        println!(
            "{}  link={}  {} {}  via {}  at {}",
            payment.provider_reference,
            payment.link_id,
            payment.amount,
            payment.currency,
            payment.rail,
            payment.created_at.to_rfc3339(),
        );
    }
    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!(
        "  Database URL: {}",
        config
            .database_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(in-memory)".to_string())
    );
    println!(
        "  Redis URL: {}",
        config
            .redis_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(in-memory)".to_string())
    );
    println!("  Card Provider URL: {}", config.provider_api_url);
    println!("  Public Base URL: {}", config.public_base_url);
    println!(
        "  Card Session Timeout: {}s",
        config.card_session_timeout_secs
    );

    let report = startup::validate_environment(config).await;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Configuration validation failed");
    }

    println!("✓ Configuration is valid");
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
