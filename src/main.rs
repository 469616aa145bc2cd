use aq_normalize::config::Config;
use aq_normalize::db::{BatchLoader, Repository};
use aq_normalize::output::read_artifact;
use aq_normalize::pipeline::Pipeline;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,aq_normalize=debug,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Air quality normalization pipeline starting...");

    let config_path =
        std::env::var("AQ_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration from {}: {}\n\n\
             Make sure:\n\
             1. The config file exists (set AQ_CONFIG to override the path)\n\
             2. All referenced environment variables are set or have defaults\n\
             3. Create a .env file if needed",
            config_path,
            e
        )
    })?;
    info!("Configuration loaded from {}", config_path);

    let summary = Pipeline::new(config.pipeline.clone()).run()?;

    let Some(database) = config.database.as_ref() else {
        info!("No database configured, skipping load stage");
        return Ok(());
    };

    if summary.rows_written == 0 {
        info!("No rows to load");
        return Ok(());
    }

    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .connect(&database.connection_string())
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to connect to database: {}\n\n\
                 Host: {}:{}\n\
                 Database: {}\n\
                 User: {}\n\n\
                 Common fixes:\n\
                 1. Ensure PostgreSQL is running\n\
                 2. Check username/password are correct\n\
                 3. Verify database exists: createdb {}",
                e,
                database.host,
                database.port,
                database.name,
                database.user,
                database.name
            )
        })?;

    info!(
        "Connected to database: {}@{}:{}/{}",
        database.user, database.host, database.port, database.name
    );

    let repository = Repository::new(pool);
    repository.run_migrations().await?;

    let table = &config.loader.table_name;
    if !repository.table_exists(table).await? {
        anyhow::bail!(
            "Target table '{}' does not exist\n\n             Migrations only create air_quality_data. Create '{}' with the same              columns or set loader.table_name back to air_quality_data.",
            table,
            table
        );
    }

    let records = read_artifact(&summary.output_file)?;
    let loader = BatchLoader::new(config.loader.clone(), repository);
    let load_summary = loader.load(&records).await;

    if !load_summary.is_complete() {
        warn!(
            "{} of {} rows failed to load",
            load_summary.failed_rows, load_summary.total_rows
        );
    }

    info!("Air quality pipeline finished");
    Ok(())
}
