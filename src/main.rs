use std::sync::Arc;

use clap::Parser;
use grantry::permissions::service::Backends;
use grantry::errors::GrantryError;
use grantry::permissions::PermissionService;
use grantry::settings::Settings;
use grantry::storage::{self, SqlStore};
use miette::Result;
use migration::{Migrator, MigratorTrait};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "grantry",
    version,
    about = "Permission ownership resolution and grant requests"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    bootstrap(&settings).await?;

    Ok(())
}

async fn bootstrap(settings: &Settings) -> std::result::Result<(), GrantryError> {
    // init storage (database)
    let db = storage::init(&settings.database).await?;
    Migrator::up(&db, None).await?;

    let store = Arc::new(SqlStore::new(db));
    let service = PermissionService::new(Backends::from_store(store))
        .with_restricted_ownership_permissions(
            settings.permissions.restricted_ownership_permissions.clone(),
        )
        .with_base_url(settings.notifications.url.clone());

    let system = service.bootstrap_system_permissions().await?;
    tracing::info!(count = system.len(), "System permissions ready");

    let owners = service.owners_by_grantable_permission(true).await?;
    tracing::info!(
        permissions = owners.permission_count(),
        global_owners = owners.global_owners().len(),
        "Resolved permission owners"
    );

    Ok(())
}
