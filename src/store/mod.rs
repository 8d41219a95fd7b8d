//! Persistence seam. Services talk to a `LibraryStore`; PostgreSQL in production, memory in tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppResult;
use crate::model::{
    Book, BookFilter, BorrowFilter, BorrowRecord, BorrowStatus, Page, Reader, ReaderFilter,
    ReservationFilter, ReservationRecord, ReservationStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Cheap liveness probe for readiness checks.
    async fn ping(&self) -> AppResult<()>;

    // books
    /// Fails with `Duplicate` when the isbn exists.
    async fn insert_book(&self, book: &Book) -> AppResult<Book>;
    async fn find_book(&self, isbn: &str) -> AppResult<Option<Book>>;
    async fn list_books(&self, filter: &BookFilter, page: Page) -> AppResult<Vec<Book>>;
    /// Fails with `Rejected` when `available_quantity` plus copies on loan would exceed
    /// `total_quantity`, checked against loans at write time.
    async fn update_book(&self, book: &Book) -> AppResult<Option<Book>>;
    async fn count_books(&self) -> AppResult<i64>;

    // readers
    async fn insert_reader(&self, reader: &Reader) -> AppResult<Reader>;
    async fn find_reader(&self, reader_id: &str) -> AppResult<Option<Reader>>;
    /// Non-deleted reader holding this id card.
    async fn find_reader_by_id_card(&self, id_card: &str) -> AppResult<Option<Reader>>;
    /// Non-deleted reader holding this phone number.
    async fn find_reader_by_phone(&self, phone: &str) -> AppResult<Option<Reader>>;
    async fn list_readers(&self, filter: &ReaderFilter, page: Page) -> AppResult<Vec<Reader>>;
    async fn update_reader(&self, reader: &Reader) -> AppResult<Option<Reader>>;
    /// Adds `delta` to the credit score, clamped to 0..=100.
    async fn adjust_credit_score(&self, reader_id: &str, delta: i32) -> AppResult<Option<Reader>>;
    async fn count_readers(&self) -> AppResult<i64>;

    // borrows
    /// Takes one copy off the shelf, records the loan and completes the reader's `ready`
    /// reservation for the book in one step. Fails with `Rejected` when no copy is available.
    async fn open_borrow(&self, record: &BorrowRecord) -> AppResult<BorrowRecord>;
    /// Marks the loan returned and puts the copy back on the shelf in one step.
    async fn close_borrow(
        &self,
        borrow_id: &str,
        returned_at: DateTime<Utc>,
        fine_cents: i64,
    ) -> AppResult<Option<BorrowRecord>>;
    async fn find_borrow(&self, borrow_id: &str) -> AppResult<Option<BorrowRecord>>;
    async fn list_borrows(&self, filter: &BorrowFilter, page: Page) -> AppResult<Vec<BorrowRecord>>;
    /// Persists status, due date, renew count and fine while the stored status is still
    /// `expected`. Fails with `Rejected` when it moved on.
    async fn update_borrow(
        &self,
        record: &BorrowRecord,
        expected: BorrowStatus,
    ) -> AppResult<Option<BorrowRecord>>;
    async fn count_borrows(&self, filter: &BorrowFilter) -> AppResult<i64>;

    // reservations
    async fn insert_reservation(&self, record: &ReservationRecord) -> AppResult<ReservationRecord>;
    async fn find_reservation(&self, reservation_id: &str) -> AppResult<Option<ReservationRecord>>;
    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
        page: Page,
    ) -> AppResult<Vec<ReservationRecord>>;
    /// Persists status, notify and expire dates while the stored status is still `expected`.
    /// Fails with `Rejected` when it moved on.
    async fn update_reservation(
        &self,
        record: &ReservationRecord,
        expected: ReservationStatus,
    ) -> AppResult<Option<ReservationRecord>>;
    async fn count_reservations(&self, filter: &ReservationFilter) -> AppResult<i64>;
}
