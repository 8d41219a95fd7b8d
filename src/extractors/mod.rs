//! Request extractors shared by the handlers.

mod api_key;
mod json;
mod query;

pub use api_key::{ApiKey, API_KEY_HEADER};
pub use json::AppJson;
pub use query::AppQuery;
