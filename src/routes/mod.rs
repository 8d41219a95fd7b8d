//! Routers: common probes at the root, library API under `/api/v1`.

mod common;
mod library;

pub use common::common_routes_with_ready;
pub use library::library_routes;

use crate::state::AppState;
use axum::Router;

pub const API_PREFIX: &str = "/api/v1";

/// Complete application router without transport layers.
pub fn app(state: AppState) -> Router {
    common_routes_with_ready(state.clone()).nest(API_PREFIX, library_routes(state))
}
