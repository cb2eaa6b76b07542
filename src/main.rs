use std::sync::Arc;

use color_eyre::eyre::{Result, eyre};
use dotenv::dotenv;
use openhouse_api::config::{ApiConfig, StoreBackend};
use openhouse_core::store::{KvStore, MemoryStore};
use openhouse_db::{PgStore, create_pool, schema::initialize_database};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Load environment variables
    dotenv().ok();

    // Load configuration
    let config = ApiConfig::from_env()?;
    openhouse_api::init_tracing(config.log_level)?;

    let store: Arc<dyn KvStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| eyre!("DATABASE_URL environment variable must be set"))?;

            // Create database connection pool
            let db_pool = create_pool(database_url).await?;

            // Initialize database schema
            initialize_database(&db_pool).await?;

            info!("Using PostgreSQL store");
            Arc::new(PgStore::new(db_pool))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; applications are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Start API server
    openhouse_api::start_server(config, store).await?;

    Ok(())
}
