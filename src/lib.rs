//! Library borrowing backend: books, readers, loans and reservations over a REST API.

pub mod app;
pub mod config;
pub mod dates;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod openapi;
pub mod response;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod telemetry;

pub use app::{connect_store, router};
pub use config::{LoanPolicy, Settings, StorageBackend};
pub use error::{AppError, AppResult};
pub use migration::{apply_migrations, ensure_database_exists};
pub use response::{success_many, success_one};
pub use routes::{common_routes_with_ready, library_routes};
pub use state::AppState;
pub use store::{LibraryStore, MemoryStore, PgStore};
