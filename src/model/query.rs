//! Pagination and list filters shared by services and stores.

use super::{
    Book, BookStatus, BorrowRecord, BorrowStatus, Reader, ReaderStatus, ReaderType,
    ReservationRecord, ReservationStatus,
};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// `skip`/`limit` query parameters as sent by clients.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Unbounded page for internal scans (queues, batch jobs).
    pub const ALL: Page = Page {
        skip: 0,
        limit: i64::MAX,
    };

    pub fn apply<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        items
            .skip(usize::try_from(self.skip).unwrap_or(0))
            .take(usize::try_from(self.limit).unwrap_or(usize::MAX))
            .collect()
    }
}

impl TryFrom<PageParams> for Page {
    type Error = AppError;

    fn try_from(p: PageParams) -> AppResult<Self> {
        let skip = p.skip.unwrap_or(0);
        let limit = p.limit.unwrap_or(DEFAULT_LIMIT);
        if skip < 0 {
            return Err(AppError::Validation("skip must be at least 0".into()));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        Ok(Page { skip, limit })
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Only books with status `available` are ever listed.
#[derive(Clone, Debug, Default)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    /// Additionally require at least one copy on the shelf.
    pub in_stock_only: bool,
}

impl BookFilter {
    pub fn matches(&self, b: &Book) -> bool {
        b.status == BookStatus::Available
            && self.title.as_deref().map_or(true, |t| contains_ci(&b.title, t))
            && self.author.as_deref().map_or(true, |a| contains_ci(&b.author, a))
            && self.category.as_deref().map_or(true, |c| b.category == c)
            && (!self.in_stock_only || b.available_quantity > 0)
    }
}

/// Deleted readers are hidden unless `status` asks for them.
#[derive(Clone, Debug, Default)]
pub struct ReaderFilter {
    pub reader_type: Option<ReaderType>,
    pub status: Option<ReaderStatus>,
    pub name: Option<String>,
}

impl ReaderFilter {
    pub fn matches(&self, r: &Reader) -> bool {
        let status_ok = match self.status {
            Some(s) => r.status == s,
            None => r.status != ReaderStatus::Deleted,
        };
        status_ok
            && self.reader_type.map_or(true, |t| r.reader_type == t)
            && self.name.as_deref().map_or(true, |n| contains_ci(&r.name, n))
    }
}

/// Empty `statuses` means any status. Newest first unless `oldest_first`.
#[derive(Clone, Debug, Default)]
pub struct BorrowFilter {
    pub reader_id: Option<String>,
    pub isbn: Option<String>,
    pub statuses: Vec<BorrowStatus>,
    /// Due strictly before this date.
    pub due_before: Option<NaiveDate>,
    pub oldest_first: bool,
}

impl BorrowFilter {
    pub fn open() -> Self {
        BorrowFilter {
            statuses: BorrowStatus::OPEN.to_vec(),
            ..Default::default()
        }
    }

    pub fn matches(&self, r: &BorrowRecord) -> bool {
        self.reader_id.as_deref().map_or(true, |id| r.reader_id == id)
            && self.isbn.as_deref().map_or(true, |i| r.isbn == i)
            && (self.statuses.is_empty() || self.statuses.contains(&r.status))
            && self.due_before.map_or(true, |d| r.due_date < d)
    }
}

/// Empty `statuses` means any status. Newest first unless `oldest_first`.
#[derive(Clone, Debug, Default)]
pub struct ReservationFilter {
    pub reader_id: Option<String>,
    pub isbn: Option<String>,
    pub statuses: Vec<ReservationStatus>,
    /// Expiry strictly before this instant.
    pub expires_before: Option<DateTime<Utc>>,
    pub oldest_first: bool,
}

impl ReservationFilter {
    pub fn active() -> Self {
        ReservationFilter {
            statuses: ReservationStatus::ACTIVE.to_vec(),
            oldest_first: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, r: &ReservationRecord) -> bool {
        self.reader_id.as_deref().map_or(true, |id| r.reader_id == id)
            && self.isbn.as_deref().map_or(true, |i| r.isbn == i)
            && (self.statuses.is_empty() || self.statuses.contains(&r.status))
            && self
                .expires_before
                .map_or(true, |t| r.expire_date.map_or(false, |e| e < t))
    }
}
