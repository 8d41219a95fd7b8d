//! Small helper endpoints.

use crate::dates::to_day_month_year;
use crate::error::AppError;
use crate::extractors::AppQuery;
use crate::response::success_one_ok;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct FormatDateQuery {
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct FormattedDate {
    pub input: String,
    pub formatted: String,
}

pub async fn format_date(AppQuery(q): AppQuery<FormatDateQuery>) -> Result<impl IntoResponse, AppError> {
    let formatted = to_day_month_year(&q.date)?;
    Ok(success_one_ok(FormattedDate {
        input: q.date,
        formatted,
    }))
}
