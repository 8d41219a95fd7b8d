use crate::error::AppResult;
use crate::service::{RequestValidator, Validate, ValidationRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Ready,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub const ACTIVE: [ReservationStatus; 2] = [ReservationStatus::Pending, ReservationStatus::Ready];
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ReservationRecord {
    pub reservation_id: String,
    pub reader_id: String,
    pub isbn: String,
    pub reserve_date: DateTime<Utc>,
    pub status: ReservationStatus,
    pub notify_date: Option<DateTime<Utc>>,
    pub expire_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReservationRequest {
    pub reader_id: String,
    pub isbn: String,
}

impl Validate for ReservationRequest {
    fn validate(&self) -> AppResult<()> {
        RequestValidator::check_str("reader_id", &self.reader_id, &ValidationRule::length(1, 20))?;
        RequestValidator::check_str("isbn", &self.isbn, &ValidationRule::length(1, 20))
    }
}

/// Body of `GET /reservations/queue/{reader_id}/{isbn}`.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct QueuePosition {
    pub reader_id: String,
    pub isbn: String,
    pub has_reservation: bool,
    /// 1-based place among pending reservations; 0 once the reservation is ready.
    pub queue_position: Option<usize>,
}
