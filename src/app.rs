//! Wiring: pick the store from settings and wrap the router in transport layers.

use crate::config::{Settings, StorageBackend};
use crate::error::AppResult;
use crate::migration::{apply_migrations, ensure_database_exists};
use crate::routes;
use crate::state::AppState;
use crate::store::{LibraryStore, MemoryStore, PgStore};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Open the configured store. PostgreSQL is created and migrated on the way.
pub async fn connect_store(settings: &Settings) -> AppResult<Arc<dyn LibraryStore>> {
    match settings.storage {
        StorageBackend::Memory => {
            tracing::info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            ensure_database_exists(&settings.database_url).await?;
            let store = PgStore::connect(&settings.database_url, settings.max_connections).await?;
            apply_migrations(store.pool()).await?;
            tracing::info!(max_connections = settings.max_connections, "connected to postgres");
            Ok(Arc::new(store))
        }
    }
}

/// Full router with the request body limit applied.
pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.body_limit_bytes;
    routes::app(state).layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(body_limit)))
}
