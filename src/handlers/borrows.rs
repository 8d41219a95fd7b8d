//! Borrow handlers.

use crate::error::AppError;
use crate::extractors::{ApiKey, AppJson, AppQuery};
use crate::model::{BorrowFilter, BorrowRequest, BorrowStatus, Page, PageParams};
use crate::response::{success_count, success_many, success_one, success_one_ok, success_with_message};
use crate::service::BorrowService;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct BorrowQuery {
    pub status: Option<BorrowStatus>,
}

impl BorrowQuery {
    fn into_filter(self) -> BorrowFilter {
        BorrowFilter {
            statuses: self.status.into_iter().collect(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LostQuery {
    pub fine_cents: Option<i64>,
}

pub async fn borrow_book(
    State(state): State<AppState>,
    _key: ApiKey,
    AppJson(body): AppJson<BorrowRequest>,
) -> Result<impl IntoResponse, AppError> {
    let record = BorrowService::borrow(state.store(), state.policy(), body, Utc::now()).await?;
    Ok(success_one(record))
}

pub async fn list_borrows(
    State(state): State<AppState>,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(q): AppQuery<BorrowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    Ok(success_many(BorrowService::list(state.store(), &q.into_filter(), page).await?))
}

pub async fn list_overdue(
    State(state): State<AppState>,
    AppQuery(page): AppQuery<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    Ok(success_many(BorrowService::overdue(state.store(), Utc::now(), page).await?))
}

pub async fn process_overdue(
    State(state): State<AppState>,
    _key: ApiKey,
) -> Result<impl IntoResponse, AppError> {
    let outcome = BorrowService::process_overdue(state.store(), state.policy(), Utc::now()).await?;
    Ok(success_one_ok(outcome))
}

pub async fn count_borrows(
    State(state): State<AppState>,
    AppQuery(q): AppQuery<BorrowQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_count(BorrowService::count(state.store(), &q.into_filter()).await?))
}

pub async fn list_reader_borrows(
    State(state): State<AppState>,
    Path(reader_id): Path<String>,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(q): AppQuery<BorrowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = BorrowFilter {
        reader_id: Some(reader_id),
        ..q.into_filter()
    };
    Ok(success_many(BorrowService::list(state.store(), &filter, page).await?))
}

pub async fn list_reader_active_borrows(
    State(state): State<AppState>,
    Path(reader_id): Path<String>,
    AppQuery(page): AppQuery<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = BorrowFilter {
        reader_id: Some(reader_id),
        ..BorrowFilter::open()
    };
    Ok(success_many(BorrowService::list(state.store(), &filter, page).await?))
}

pub async fn list_book_borrows(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(q): AppQuery<BorrowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = BorrowFilter {
        isbn: Some(isbn),
        ..q.into_filter()
    };
    Ok(success_many(BorrowService::list(state.store(), &filter, page).await?))
}

pub async fn get_borrow(
    State(state): State<AppState>,
    Path(borrow_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one_ok(BorrowService::get(state.store(), &borrow_id).await?))
}

pub async fn return_book(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(borrow_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = BorrowService::return_book(state.store(), state.policy(), &borrow_id, Utc::now()).await?;
    let message = match record.fine_cents {
        Some(fine) if fine > 0 => format!("book returned, fine {} cents", fine),
        _ => "book returned".to_string(),
    };
    Ok(success_with_message(record, message))
}

pub async fn renew_borrow(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(borrow_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = BorrowService::renew(state.store(), state.policy(), &borrow_id, Utc::now()).await?;
    Ok(success_one_ok(record))
}

pub async fn mark_overdue(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(borrow_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one_ok(BorrowService::mark_overdue(state.store(), &borrow_id).await?))
}

pub async fn mark_lost(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(borrow_id): Path<String>,
    AppQuery(q): AppQuery<LostQuery>,
) -> Result<impl IntoResponse, AppError> {
    let record = BorrowService::mark_lost(state.store(), state.policy(), &borrow_id, q.fine_cents).await?;
    Ok(success_one_ok(record))
}
