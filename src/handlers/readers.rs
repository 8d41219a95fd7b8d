//! Reader handlers.

use crate::error::AppError;
use crate::extractors::{ApiKey, AppJson, AppQuery};
use crate::model::{Page, PageParams, ReaderDetails, ReaderFilter, ReaderStatus, ReaderType};
use crate::response::{success_count, success_many, success_one, success_one_ok, success_with_message};
use crate::service::ReaderService;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ReaderQuery {
    pub reader_type: Option<ReaderType>,
    pub status: Option<ReaderStatus>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreditQuery {
    pub score_change: i32,
}

pub async fn register_reader(
    State(state): State<AppState>,
    _key: ApiKey,
    AppJson(body): AppJson<ReaderDetails>,
) -> Result<impl IntoResponse, AppError> {
    let reader = ReaderService::register(state.store(), state.policy(), body, Utc::now()).await?;
    Ok(success_one(reader))
}

pub async fn list_readers(
    State(state): State<AppState>,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(q): AppQuery<ReaderQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = ReaderFilter {
        reader_type: q.reader_type,
        status: q.status,
        name: q.name.filter(|s| !s.trim().is_empty()),
    };
    Ok(success_many(ReaderService::list(state.store(), &filter, page).await?))
}

pub async fn count_readers(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(success_count(ReaderService::count(state.store()).await?))
}

pub async fn get_reader(
    State(state): State<AppState>,
    Path(reader_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one_ok(ReaderService::get(state.store(), &reader_id).await?))
}

pub async fn update_reader(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(reader_id): Path<String>,
    AppJson(body): AppJson<ReaderDetails>,
) -> Result<impl IntoResponse, AppError> {
    let reader =
        ReaderService::update(state.store(), state.policy(), &reader_id, body, Utc::now()).await?;
    Ok(success_one_ok(reader))
}

pub async fn delete_reader(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(reader_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let reader = ReaderService::delete(state.store(), &reader_id).await?;
    Ok(success_with_message(reader, format!("reader {} deleted", reader_id)))
}

pub async fn freeze_reader(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(reader_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let reader = ReaderService::freeze(state.store(), &reader_id).await?;
    Ok(success_with_message(reader, format!("reader {} frozen", reader_id)))
}

pub async fn unfreeze_reader(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(reader_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let reader = ReaderService::unfreeze(state.store(), &reader_id).await?;
    Ok(success_with_message(reader, format!("reader {} unfrozen", reader_id)))
}

pub async fn adjust_credit(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(reader_id): Path<String>,
    AppQuery(q): AppQuery<CreditQuery>,
) -> Result<impl IntoResponse, AppError> {
    let reader = ReaderService::adjust_credit(state.store(), &reader_id, q.score_change).await?;
    Ok(success_one_ok(reader))
}

pub async fn reader_status(
    State(state): State<AppState>,
    Path(reader_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let today = Utc::now().date_naive();
    let report = ReaderService::status_report(state.store(), state.policy(), &reader_id, today).await?;
    Ok(success_one_ok(report))
}
