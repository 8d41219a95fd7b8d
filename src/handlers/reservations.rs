//! Reservation handlers.

use crate::error::AppError;
use crate::extractors::{ApiKey, AppJson, AppQuery};
use crate::model::{Page, PageParams, ReservationFilter, ReservationRequest, ReservationStatus};
use crate::response::{success_count, success_many, success_one, success_one_ok, success_with_message};
use crate::service::{BookService, ReservationService};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ReservationQuery {
    pub status: Option<ReservationStatus>,
}

impl ReservationQuery {
    fn into_filter(self) -> ReservationFilter {
        ReservationFilter {
            statuses: self.status.into_iter().collect(),
            ..Default::default()
        }
    }
}

pub async fn reserve_book(
    State(state): State<AppState>,
    _key: ApiKey,
    AppJson(body): AppJson<ReservationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let record = ReservationService::reserve(state.store(), state.policy(), body, Utc::now()).await?;
    Ok(success_one(record))
}

pub async fn list_reservations(
    State(state): State<AppState>,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(q): AppQuery<ReservationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    Ok(success_many(ReservationService::list(state.store(), &q.into_filter(), page).await?))
}

pub async fn list_ready(
    State(state): State<AppState>,
    AppQuery(page): AppQuery<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = ReservationFilter {
        statuses: vec![ReservationStatus::Ready],
        oldest_first: true,
        ..Default::default()
    };
    Ok(success_many(ReservationService::list(state.store(), &filter, page).await?))
}

pub async fn process_expired(
    State(state): State<AppState>,
    _key: ApiKey,
) -> Result<impl IntoResponse, AppError> {
    let outcome =
        ReservationService::process_expired(state.store(), state.policy(), Utc::now()).await?;
    Ok(success_one_ok(outcome))
}

/// Offer a returned copy to the reservation queue. `data` is null when nobody was promoted.
pub async fn process_book_return(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(isbn): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    BookService::get(state.store(), &isbn).await?;
    let promoted =
        ReservationService::promote_next(state.store(), state.policy(), &isbn, Utc::now()).await?;
    let message = match &promoted {
        Some(r) => format!("reservation {} is ready", r.reservation_id),
        None => "no reservation promoted".to_string(),
    };
    Ok(success_with_message(promoted, message))
}

pub async fn count_reservations(
    State(state): State<AppState>,
    AppQuery(q): AppQuery<ReservationQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_count(ReservationService::count(state.store(), &q.into_filter()).await?))
}

pub async fn list_reader_reservations(
    State(state): State<AppState>,
    Path(reader_id): Path<String>,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(q): AppQuery<ReservationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = ReservationFilter {
        reader_id: Some(reader_id),
        ..q.into_filter()
    };
    Ok(success_many(ReservationService::list(state.store(), &filter, page).await?))
}

pub async fn list_reader_active_reservations(
    State(state): State<AppState>,
    Path(reader_id): Path<String>,
    AppQuery(page): AppQuery<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = ReservationFilter {
        reader_id: Some(reader_id),
        ..ReservationFilter::active()
    };
    Ok(success_many(ReservationService::list(state.store(), &filter, page).await?))
}

pub async fn list_book_reservations(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(q): AppQuery<ReservationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = ReservationFilter {
        isbn: Some(isbn),
        ..q.into_filter()
    };
    Ok(success_many(ReservationService::list(state.store(), &filter, page).await?))
}

pub async fn list_book_pending(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
    AppQuery(page): AppQuery<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    Ok(success_many(
        ReservationService::pending_for_book(state.store(), &isbn, page).await?,
    ))
}

pub async fn queue_position(
    State(state): State<AppState>,
    Path((reader_id, isbn)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let position = ReservationService::queue_position(state.store(), &reader_id, &isbn).await?;
    Ok(success_one_ok(position))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one_ok(ReservationService::get(state.store(), &reservation_id).await?))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(reservation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record =
        ReservationService::cancel(state.store(), state.policy(), &reservation_id, Utc::now()).await?;
    Ok(success_one_ok(record))
}

pub async fn notify_reservation(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(reservation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record =
        ReservationService::notify_ready(state.store(), state.policy(), &reservation_id, Utc::now())
            .await?;
    Ok(success_one_ok(record))
}

pub async fn complete_reservation(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(reservation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one_ok(ReservationService::complete(state.store(), &reservation_id).await?))
}
