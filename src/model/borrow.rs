use crate::error::AppResult;
use crate::service::{RequestValidator, Validate, ValidationRule};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "borrow_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BorrowStatus {
    Borrowed,
    Returned,
    Overdue,
    Lost,
}

impl BorrowStatus {
    /// Still holding a copy: borrowed or overdue.
    pub fn is_open(self) -> bool {
        matches!(self, BorrowStatus::Borrowed | BorrowStatus::Overdue)
    }

    pub const OPEN: [BorrowStatus; 2] = [BorrowStatus::Borrowed, BorrowStatus::Overdue];
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct BorrowRecord {
    pub borrow_id: String,
    pub reader_id: String,
    pub isbn: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub return_date: Option<DateTime<Utc>>,
    pub renew_count: i32,
    pub status: BorrowStatus,
    pub fine_cents: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BorrowRequest {
    pub reader_id: String,
    pub isbn: String,
}

impl Validate for BorrowRequest {
    fn validate(&self) -> AppResult<()> {
        RequestValidator::check_str("reader_id", &self.reader_id, &ValidationRule::length(1, 20))?;
        RequestValidator::check_str("isbn", &self.isbn, &ValidationRule::length(1, 20))
    }
}

/// Result of a batch job such as overdue or expiry processing.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ProcessOutcome {
    pub message: String,
    pub processed_count: u64,
}
