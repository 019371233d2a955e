use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paylink_core::cli::{Cli, Commands, DbCommands, LinksCommands};
use paylink_core::config::{Config, LogFormat};
use paylink_core::services::run_expiry_sweeper;
use paylink_core::{cli, create_app, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve) | None => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Links(LinksCommands::SweepExpired)) => {
            cli::handle_links_sweep(&config).await
        }
        Some(Commands::Links(LinksCommands::Flagged { limit })) => {
            cli::handle_links_flagged(&config, limit).await
        }
        Some(Commands::Config) => cli::handle_config_validate(&config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let port = config.server_port;
    let sweep_interval = config.expiry_sweep_interval();

    let state = startup::build_state(config).await?;
    tokio::spawn(run_expiry_sweeper(state.reconciler.clone(), sweep_interval));

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
