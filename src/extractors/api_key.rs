//! Placeholder guard for mutating routes: `X-API-Key` must equal `SECRET_KEY` when one is configured.

use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Present in a handler's arguments means the route is guarded.
#[derive(Clone, Debug)]
pub struct ApiKey;

#[async_trait]
impl FromRequestParts<AppState> for ApiKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.settings.secret_key.as_deref() else {
            return Ok(ApiKey);
        };
        let supplied = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        if supplied == Some(expected) {
            Ok(ApiKey)
        } else {
            tracing::warn!(path = %parts.uri.path(), "rejected request without valid api key");
            Err(AppError::Unauthorized)
        }
    }
}
