pub mod api;
pub mod catalog;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod store;

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::catalog::TargetCatalog;
use crate::config::ServiceConfig;
use crate::pipeline::AssessmentService;
use crate::store::{InMemoryResultStore, ResultStore, SqliteResultStore};

/// Install the global `fmt` subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Open the configured result store: SQLite on disk, or in-memory when no
/// database path is set.
pub fn open_store(config: &ServiceConfig) -> Result<Arc<dyn ResultStore>, store::StoreError> {
    match &config.database_path {
        Some(path) => {
            tracing::info!("Result store: {}", path.display());
            Ok(Arc::new(SqliteResultStore::open(path)?))
        }
        None => {
            tracing::warn!("Result store: in-memory, results are lost on restart");
            Ok(Arc::new(InMemoryResultStore::new()))
        }
    }
}

/// Wire the catalog, store and pipeline into an API context.
pub fn build_context(config: &ServiceConfig) -> Result<api::ApiContext, Box<dyn std::error::Error>> {
    let catalog = Arc::new(TargetCatalog::load(&config.catalog_path)?);
    let store = open_store(config)?;
    let service = Arc::new(AssessmentService::from_config(config, catalog, store));

    let characters_dir = config
        .catalog_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    Ok(api::ApiContext::new(service).with_characters_dir(characters_dir))
}

/// Run the service until ctrl-c.
pub async fn run(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let ctx = build_context(&config)?;
    // Start loading the extractor now so the first submission rarely waits
    ctx.service.extractor().warm_up();

    let mut server = api::start_server(ctx, config.bind_addr).await?;
    tracing::info!("Listening on http://{}", server.addr);

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    server.stopped().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundled_config() -> ServiceConfig {
        ServiceConfig {
            database_path: None,
            catalog_path: Path::new(env!("CARGO_MANIFEST_DIR")).join("resources/targets/catalog.json"),
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn in_memory_store_when_no_database_path() {
        let store = open_store(&bundled_config()).unwrap();
        assert!(store.get(&uuid::Uuid::new_v4()).is_err());
    }

    #[test]
    fn sqlite_store_created_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            database_path: Some(dir.path().join("nested").join("results.db")),
            ..bundled_config()
        };
        open_store(&config).unwrap();
        assert!(dir.path().join("nested").join("results.db").exists());
    }

    #[tokio::test]
    async fn bundled_context_serves_catalog() {
        let ctx = build_context(&bundled_config()).unwrap();
        assert!(ctx.service.catalog().get("character1").is_some());
        assert!(ctx.characters_dir.unwrap().join("character1.png").is_file());
    }

    #[test]
    fn missing_catalog_fails_context() {
        let config = ServiceConfig {
            catalog_path: "/nonexistent/catalog.json".into(),
            ..bundled_config()
        };
        assert!(build_context(&config).is_err());
    }
}
