//! Library backend HTTP server.
//!
//! Run from repo root: `cargo run -p library-server`
//! `STORAGE_BACKEND=memory` runs without PostgreSQL.

use library_backend::{connect_store, router, telemetry, AppState, Settings};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing("library_backend=info,library_server=info");

    let settings = Settings::from_env();
    let store = connect_store(&settings).await?;
    let bind_addr = settings.bind_addr.clone();
    let app = router(AppState::new(store, settings));

    let listener = TcpListener::bind(&bind_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!("Library backend listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
