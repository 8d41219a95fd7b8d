//! In-process store behind a single lock. Used by tests and `STORAGE_BACKEND=memory`.

use super::LibraryStore;
use crate::error::{AppError, AppResult};
use crate::model::{
    Book, BookFilter, BorrowFilter, BorrowRecord, BorrowStatus, Page, Reader, ReaderFilter,
    ReaderStatus, ReservationFilter, ReservationRecord, ReservationStatus, MAX_CREDIT_SCORE,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    books: BTreeMap<String, Book>,
    readers: BTreeMap<String, Reader>,
    borrows: BTreeMap<String, BorrowRecord>,
    reservations: BTreeMap<String, ReservationRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn insert_book(&self, book: &Book) -> AppResult<Book> {
        let mut t = self.tables.write().await;
        if t.books.contains_key(&book.isbn) {
            return Err(AppError::Duplicate(format!("isbn {} already exists", book.isbn)));
        }
        t.books.insert(book.isbn.clone(), book.clone());
        Ok(book.clone())
    }

    async fn find_book(&self, isbn: &str) -> AppResult<Option<Book>> {
        Ok(self.tables.read().await.books.get(isbn).cloned())
    }

    async fn list_books(&self, filter: &BookFilter, page: Page) -> AppResult<Vec<Book>> {
        let t = self.tables.read().await;
        Ok(page.apply(t.books.values().filter(|b| filter.matches(b)).cloned()))
    }

    async fn update_book(&self, book: &Book) -> AppResult<Option<Book>> {
        let mut t = self.tables.write().await;
        let on_loan = t
            .borrows
            .values()
            .filter(|r| r.isbn == book.isbn && r.status.is_open())
            .count() as i64;
        let Some(slot) = t.books.get_mut(&book.isbn) else {
            return Ok(None);
        };
        if i64::from(book.available_quantity) + on_loan > i64::from(book.total_quantity) {
            return Err(AppError::Rejected(format!(
                "{} copies of book {} are on loan; total_quantity {} cannot hold available_quantity {}",
                on_loan, book.isbn, book.total_quantity, book.available_quantity
            )));
        }
        *slot = book.clone();
        Ok(Some(slot.clone()))
    }

    async fn count_books(&self) -> AppResult<i64> {
        let t = self.tables.read().await;
        let filter = BookFilter::default();
        Ok(t.books.values().filter(|b| filter.matches(b)).count() as i64)
    }

    async fn insert_reader(&self, reader: &Reader) -> AppResult<Reader> {
        let mut t = self.tables.write().await;
        if t.readers.contains_key(&reader.reader_id) {
            return Err(AppError::Duplicate(format!(
                "reader {} already exists",
                reader.reader_id
            )));
        }
        t.readers.insert(reader.reader_id.clone(), reader.clone());
        Ok(reader.clone())
    }

    async fn find_reader(&self, reader_id: &str) -> AppResult<Option<Reader>> {
        Ok(self.tables.read().await.readers.get(reader_id).cloned())
    }

    async fn find_reader_by_id_card(&self, id_card: &str) -> AppResult<Option<Reader>> {
        let t = self.tables.read().await;
        Ok(t.readers
            .values()
            .find(|r| r.id_card == id_card && r.status != ReaderStatus::Deleted)
            .cloned())
    }

    async fn find_reader_by_phone(&self, phone: &str) -> AppResult<Option<Reader>> {
        let t = self.tables.read().await;
        Ok(t.readers
            .values()
            .find(|r| r.phone == phone && r.status != ReaderStatus::Deleted)
            .cloned())
    }

    async fn list_readers(&self, filter: &ReaderFilter, page: Page) -> AppResult<Vec<Reader>> {
        let t = self.tables.read().await;
        let mut rows: Vec<&Reader> = t.readers.values().filter(|r| filter.matches(r)).collect();
        rows.sort_by(|a, b| {
            a.register_date
                .cmp(&b.register_date)
                .then_with(|| a.reader_id.cmp(&b.reader_id))
        });
        Ok(page.apply(rows.into_iter().cloned()))
    }

    async fn update_reader(&self, reader: &Reader) -> AppResult<Option<Reader>> {
        let mut t = self.tables.write().await;
        Ok(t.readers.get_mut(&reader.reader_id).map(|slot| {
            let credit_score = slot.credit_score;
            let register_date = slot.register_date;
            *slot = Reader {
                credit_score,
                register_date,
                ..reader.clone()
            };
            slot.clone()
        }))
    }

    async fn adjust_credit_score(&self, reader_id: &str, delta: i32) -> AppResult<Option<Reader>> {
        let mut t = self.tables.write().await;
        Ok(t.readers.get_mut(reader_id).map(|r| {
            r.credit_score = (r.credit_score + delta).clamp(0, MAX_CREDIT_SCORE);
            r.clone()
        }))
    }

    async fn count_readers(&self) -> AppResult<i64> {
        let t = self.tables.read().await;
        Ok(t.readers
            .values()
            .filter(|r| r.status != ReaderStatus::Deleted)
            .count() as i64)
    }

    async fn open_borrow(&self, record: &BorrowRecord) -> AppResult<BorrowRecord> {
        let mut t = self.tables.write().await;
        if t.borrows.contains_key(&record.borrow_id) {
            return Err(AppError::Duplicate(format!(
                "borrow {} already exists",
                record.borrow_id
            )));
        }
        let book = t
            .books
            .get_mut(&record.isbn)
            .ok_or_else(|| AppError::NotFound(format!("book {}", record.isbn)))?;
        if !book.is_borrowable() {
            return Err(AppError::Rejected(format!("book {} is not available", record.isbn)));
        }
        book.available_quantity -= 1;
        t.borrows.insert(record.borrow_id.clone(), record.clone());
        t.reservations
            .values_mut()
            .filter(|r| {
                r.reader_id == record.reader_id
                    && r.isbn == record.isbn
                    && r.status == ReservationStatus::Ready
            })
            .for_each(|r| r.status = ReservationStatus::Completed);
        Ok(record.clone())
    }

    async fn close_borrow(
        &self,
        borrow_id: &str,
        returned_at: DateTime<Utc>,
        fine_cents: i64,
    ) -> AppResult<Option<BorrowRecord>> {
        let mut t = self.tables.write().await;
        let Some(record) = t.borrows.get_mut(borrow_id) else {
            return Ok(None);
        };
        if !record.status.is_open() {
            return Err(AppError::Rejected(format!("borrow {} is already closed", borrow_id)));
        }
        record.status = BorrowStatus::Returned;
        record.return_date = Some(returned_at);
        record.fine_cents = Some(fine_cents);
        let closed = record.clone();
        if let Some(book) = t.books.get_mut(&closed.isbn) {
            book.available_quantity = (book.available_quantity + 1).min(book.total_quantity);
        }
        Ok(Some(closed))
    }

    async fn find_borrow(&self, borrow_id: &str) -> AppResult<Option<BorrowRecord>> {
        Ok(self.tables.read().await.borrows.get(borrow_id).cloned())
    }

    async fn list_borrows(&self, filter: &BorrowFilter, page: Page) -> AppResult<Vec<BorrowRecord>> {
        let t = self.tables.read().await;
        let mut rows: Vec<&BorrowRecord> = t.borrows.values().filter(|r| filter.matches(r)).collect();
        rows.sort_by(|a, b| {
            a.borrow_date
                .cmp(&b.borrow_date)
                .then_with(|| a.borrow_id.cmp(&b.borrow_id))
        });
        if !filter.oldest_first {
            rows.reverse();
        }
        Ok(page.apply(rows.into_iter().cloned()))
    }

    async fn update_borrow(
        &self,
        record: &BorrowRecord,
        expected: BorrowStatus,
    ) -> AppResult<Option<BorrowRecord>> {
        let mut t = self.tables.write().await;
        let Some(slot) = t.borrows.get_mut(&record.borrow_id) else {
            return Ok(None);
        };
        if slot.status != expected {
            return Err(AppError::Rejected(format!(
                "borrow {} is {:?}, expected {:?}",
                record.borrow_id, slot.status, expected
            )));
        }
        slot.status = record.status;
        slot.due_date = record.due_date;
        slot.renew_count = record.renew_count;
        slot.fine_cents = record.fine_cents;
        Ok(Some(slot.clone()))
    }

    async fn count_borrows(&self, filter: &BorrowFilter) -> AppResult<i64> {
        let t = self.tables.read().await;
        Ok(t.borrows.values().filter(|r| filter.matches(r)).count() as i64)
    }

    async fn insert_reservation(&self, record: &ReservationRecord) -> AppResult<ReservationRecord> {
        let mut t = self.tables.write().await;
        if t.reservations.contains_key(&record.reservation_id) {
            return Err(AppError::Duplicate(format!(
                "reservation {} already exists",
                record.reservation_id
            )));
        }
        t.reservations
            .insert(record.reservation_id.clone(), record.clone());
        Ok(record.clone())
    }

    async fn find_reservation(&self, reservation_id: &str) -> AppResult<Option<ReservationRecord>> {
        Ok(self.tables.read().await.reservations.get(reservation_id).cloned())
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
        page: Page,
    ) -> AppResult<Vec<ReservationRecord>> {
        let t = self.tables.read().await;
        let mut rows: Vec<&ReservationRecord> =
            t.reservations.values().filter(|r| filter.matches(r)).collect();
        rows.sort_by(|a, b| {
            a.reserve_date
                .cmp(&b.reserve_date)
                .then_with(|| a.reservation_id.cmp(&b.reservation_id))
        });
        if !filter.oldest_first {
            rows.reverse();
        }
        Ok(page.apply(rows.into_iter().cloned()))
    }

    async fn update_reservation(
        &self,
        record: &ReservationRecord,
        expected: ReservationStatus,
    ) -> AppResult<Option<ReservationRecord>> {
        let mut t = self.tables.write().await;
        let Some(slot) = t.reservations.get_mut(&record.reservation_id) else {
            return Ok(None);
        };
        if slot.status != expected {
            return Err(AppError::Rejected(format!(
                "reservation {} is {:?}, expected {:?}",
                record.reservation_id, slot.status, expected
            )));
        }
        slot.status = record.status;
        slot.notify_date = record.notify_date;
        slot.expire_date = record.expire_date;
        Ok(Some(slot.clone()))
    }

    async fn count_reservations(&self, filter: &ReservationFilter) -> AppResult<i64> {
        let t = self.tables.read().await;
        Ok(t.reservations.values().filter(|r| filter.matches(r)).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::book::fixtures::details;
    use chrono::NaiveDate;

    fn borrow(id: &str, isbn: &str) -> BorrowRecord {
        BorrowRecord {
            borrow_id: id.into(),
            reader_id: "R00000001".into(),
            isbn: isbn.into(),
            borrow_date: Utc::now(),
            due_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            return_date: None,
            renew_count: 0,
            status: BorrowStatus::Borrowed,
            fine_cents: None,
        }
    }

    fn hold(id: &str, reader_id: &str) -> ReservationRecord {
        ReservationRecord {
            reservation_id: id.into(),
            reader_id: reader_id.into(),
            isbn: "9787111111111".into(),
            reserve_date: Utc::now(),
            status: ReservationStatus::Ready,
            notify_date: Some(Utc::now()),
            expire_date: None,
        }
    }

    #[tokio::test]
    async fn open_and_close_keep_stock_within_total() {
        let store = MemoryStore::new();
        store
            .insert_book(&Book::new("9787111111111".into(), details(1, 1)))
            .await
            .unwrap();

        store.open_borrow(&borrow("B1", "9787111111111")).await.unwrap();
        let err = store.open_borrow(&borrow("B2", "9787111111111")).await.unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));

        store.close_borrow("B1", Utc::now(), 0).await.unwrap();
        let book = store.find_book("9787111111111").await.unwrap().unwrap();
        assert_eq!(book.available_quantity, 1);
        assert!(store.close_borrow("B1", Utc::now(), 0).await.is_err());
        assert!(store.close_borrow("missing", Utc::now(), 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_book_update_cannot_erase_a_loan() {
        let store = MemoryStore::new();
        let stale = Book::new("9787111111111".into(), details(2, 2));
        store.insert_book(&stale).await.unwrap();
        store.open_borrow(&borrow("B1", "9787111111111")).await.unwrap();

        let err = store.update_book(&stale).await.unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));
        let book = store.find_book("9787111111111").await.unwrap().unwrap();
        assert_eq!(book.available_quantity, 1);

        let grown = Book::new("9787111111111".into(), details(3, 2));
        let book = store.update_book(&grown).await.unwrap().unwrap();
        assert_eq!((book.total_quantity, book.available_quantity), (3, 2));
        assert!(store
            .update_book(&Book::new("9787000000000".into(), details(1, 1)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn status_write_after_the_record_moved_on_is_rejected() {
        let store = MemoryStore::new();
        store
            .insert_book(&Book::new("9787111111111".into(), details(1, 1)))
            .await
            .unwrap();
        let mut seen = store.open_borrow(&borrow("B1", "9787111111111")).await.unwrap();
        store.close_borrow("B1", Utc::now(), 0).await.unwrap();

        seen.status = BorrowStatus::Overdue;
        let err = store.update_borrow(&seen, BorrowStatus::Borrowed).await.unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));
        let stored = store.find_borrow("B1").await.unwrap().unwrap();
        assert_eq!(stored.status, BorrowStatus::Returned);
        let book = store.find_book("9787111111111").await.unwrap().unwrap();
        assert_eq!(book.available_quantity, 1);

        seen.borrow_id = "missing".into();
        assert!(store
            .update_borrow(&seen, BorrowStatus::Borrowed)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn reservation_write_after_cancel_is_rejected() {
        let store = MemoryStore::new();
        let mut seen = store.insert_reservation(&hold("V1", "R00000001")).await.unwrap();
        let mut cancelled = seen.clone();
        cancelled.status = ReservationStatus::Cancelled;
        store
            .update_reservation(&cancelled, ReservationStatus::Ready)
            .await
            .unwrap();

        seen.status = ReservationStatus::Completed;
        assert!(matches!(
            store.update_reservation(&seen, ReservationStatus::Ready).await,
            Err(AppError::Rejected(_))
        ));
        let stored = store.find_reservation("V1").await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn open_borrow_completes_only_the_borrowers_ready_hold() {
        let store = MemoryStore::new();
        store
            .insert_book(&Book::new("9787111111111".into(), details(2, 2)))
            .await
            .unwrap();
        store.insert_reservation(&hold("V1", "R00000001")).await.unwrap();
        store.insert_reservation(&hold("V2", "R00000002")).await.unwrap();

        store.open_borrow(&borrow("B1", "9787111111111")).await.unwrap();
        let mine = store.find_reservation("V1").await.unwrap().unwrap();
        assert_eq!(mine.status, ReservationStatus::Completed);
        let other = store.find_reservation("V2").await.unwrap().unwrap();
        assert_eq!(other.status, ReservationStatus::Ready);
    }

    #[tokio::test]
    async fn duplicate_isbn_is_rejected() {
        let store = MemoryStore::new();
        let book = Book::new("9787111111111".into(), details(1, 1));
        store.insert_book(&book).await.unwrap();
        assert!(matches!(store.insert_book(&book).await, Err(AppError::Duplicate(_))));
    }
}
