//! Loan lifecycle: borrow, return, renew, overdue and lost handling.

use super::{BookService, ReaderService, ReservationService, Validate};
use crate::config::LoanPolicy;
use crate::error::{AppError, AppResult};
use crate::model::{
    generate_id, BorrowFilter, BorrowRecord, BorrowRequest, BorrowStatus, Page, ProcessOutcome,
};
use crate::store::LibraryStore;
use chrono::{DateTime, Duration, Utc};

pub struct BorrowService;

impl BorrowService {
    /// Lend one copy. The store fulfils any `ready` reservation the reader holds for the book.
    pub async fn borrow(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        req: BorrowRequest,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        req.validate()?;
        let today = now.date_naive();
        let reader = ReaderService::require_eligible(store, policy, &req.reader_id, today).await?;
        let book = BookService::get(store, &req.isbn).await?;
        if !book.is_borrowable() {
            return Err(AppError::Rejected(format!("book {} has no copy available", req.isbn)));
        }

        let open_for_reader = BorrowFilter {
            reader_id: Some(req.reader_id.clone()),
            ..BorrowFilter::open()
        };
        let same_book = BorrowFilter {
            isbn: Some(req.isbn.clone()),
            ..open_for_reader.clone()
        };
        if store.count_borrows(&same_book).await? > 0 {
            return Err(AppError::Rejected(format!(
                "reader {} already has book {} on loan",
                req.reader_id, req.isbn
            )));
        }
        let limit = policy.max_active_borrows(reader.reader_type);
        if store.count_borrows(&open_for_reader).await? >= limit {
            return Err(AppError::Rejected(format!(
                "reader {} reached the limit of {} active borrows",
                req.reader_id, limit
            )));
        }

        let record = BorrowRecord {
            borrow_id: generate_id('B'),
            reader_id: req.reader_id,
            isbn: req.isbn,
            borrow_date: now,
            due_date: policy.due_date(reader.reader_type, today),
            return_date: None,
            renew_count: 0,
            status: BorrowStatus::Borrowed,
            fine_cents: None,
        };
        let record = store.open_borrow(&record).await?;
        tracing::info!(
            borrow_id = %record.borrow_id,
            reader_id = %record.reader_id,
            isbn = %record.isbn,
            due_date = %record.due_date,
            "book borrowed"
        );
        Ok(record)
    }

    /// Close an open loan, charge any late fine, and hand the copy to the next pending reservation.
    pub async fn return_book(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        borrow_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let record = Self::get(store, borrow_id).await?;
        if !record.status.is_open() {
            return Err(AppError::Rejected(format!(
                "borrow {} is {:?}, only borrowed or overdue loans can be returned",
                borrow_id, record.status
            )));
        }
        let fine = policy.overdue_fine_cents(record.due_date, now.date_naive());
        let closed = store
            .close_borrow(borrow_id, now, fine)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("borrow {}", borrow_id)))?;
        if fine > 0 {
            let deduction = policy.return_credit_deduction(fine);
            store.adjust_credit_score(&closed.reader_id, -deduction).await?;
        }
        tracing::info!(borrow_id, isbn = %closed.isbn, fine_cents = fine, "book returned");
        ReservationService::promote_next(store, policy, &closed.isbn, now).await?;
        Ok(closed)
    }

    /// Extend the due date by one loan period. Only on-time `borrowed` loans can be renewed.
    pub async fn renew(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        borrow_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let mut record = Self::get(store, borrow_id).await?;
        if record.status != BorrowStatus::Borrowed {
            return Err(AppError::Rejected(format!(
                "borrow {} is {:?}, only borrowed loans can be renewed",
                borrow_id, record.status
            )));
        }
        if record.renew_count >= policy.max_renewals {
            return Err(AppError::Rejected(format!(
                "borrow {} reached the limit of {} renewals",
                borrow_id, policy.max_renewals
            )));
        }
        let today = now.date_naive();
        if record.due_date < today {
            return Err(AppError::Rejected(format!("borrow {} is past due", borrow_id)));
        }
        let reader = ReaderService::require_eligible(store, policy, &record.reader_id, today).await?;
        record.due_date += Duration::days(policy.loan_days(reader.reader_type));
        record.renew_count += 1;
        let record = Self::save(store, &record, BorrowStatus::Borrowed).await?;
        tracing::info!(borrow_id, due_date = %record.due_date, renew_count = record.renew_count, "borrow renewed");
        Ok(record)
    }

    pub async fn mark_overdue(store: &dyn LibraryStore, borrow_id: &str) -> AppResult<BorrowRecord> {
        let mut record = Self::get(store, borrow_id).await?;
        if record.status != BorrowStatus::Borrowed {
            return Err(AppError::Rejected(format!(
                "borrow {} is {:?}, only borrowed loans can become overdue",
                borrow_id, record.status
            )));
        }
        record.status = BorrowStatus::Overdue;
        Self::save(store, &record, BorrowStatus::Borrowed).await
    }

    /// Close an open loan as lost. The copy never returns to the shelf.
    pub async fn mark_lost(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        borrow_id: &str,
        fine_cents: Option<i64>,
    ) -> AppResult<BorrowRecord> {
        let fine = fine_cents.unwrap_or(policy.lost_fine_cents);
        if fine < 0 {
            return Err(AppError::Validation("fine_cents must be at least 0".into()));
        }
        let mut record = Self::get(store, borrow_id).await?;
        if !record.status.is_open() {
            return Err(AppError::Rejected(format!(
                "borrow {} is {:?}, only borrowed or overdue loans can be lost",
                borrow_id, record.status
            )));
        }
        let seen = record.status;
        record.status = BorrowStatus::Lost;
        record.fine_cents = Some(fine);
        let record = Self::save(store, &record, seen).await?;
        store
            .adjust_credit_score(&record.reader_id, -policy.lost_credit_deduction(fine))
            .await?;
        tracing::info!(borrow_id, fine_cents = fine, "book lost");
        Ok(record)
    }

    /// Flag every `borrowed` loan past its due date and deduct credit per day overdue.
    pub async fn process_overdue(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<ProcessOutcome> {
        let today = now.date_naive();
        let late = store
            .list_borrows(
                &BorrowFilter {
                    statuses: vec![BorrowStatus::Borrowed],
                    due_before: Some(today),
                    oldest_first: true,
                    ..Default::default()
                },
                Page::ALL,
            )
            .await?;
        let mut processed = 0u64;
        for mut record in late {
            let days = (today - record.due_date).num_days();
            record.status = BorrowStatus::Overdue;
            match Self::save(store, &record, BorrowStatus::Borrowed).await {
                Ok(_) => {}
                Err(AppError::Rejected(reason)) => {
                    tracing::debug!(borrow_id = %record.borrow_id, %reason, "skipped, loan changed");
                    continue;
                }
                Err(e) => return Err(e),
            }
            store
                .adjust_credit_score(&record.reader_id, -policy.overdue_credit_deduction(days))
                .await?;
            processed += 1;
        }
        tracing::info!(processed, "overdue borrows processed");
        Ok(ProcessOutcome {
            message: format!("{} borrow(s) marked overdue", processed),
            processed_count: processed,
        })
    }

    pub async fn get(store: &dyn LibraryStore, borrow_id: &str) -> AppResult<BorrowRecord> {
        store
            .find_borrow(borrow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("borrow {}", borrow_id)))
    }

    pub async fn list(
        store: &dyn LibraryStore,
        filter: &BorrowFilter,
        page: Page,
    ) -> AppResult<Vec<BorrowRecord>> {
        store.list_borrows(filter, page).await
    }

    /// Open loans due before today, oldest first.
    pub async fn overdue(
        store: &dyn LibraryStore,
        now: DateTime<Utc>,
        page: Page,
    ) -> AppResult<Vec<BorrowRecord>> {
        let filter = BorrowFilter {
            due_before: Some(now.date_naive()),
            oldest_first: true,
            ..BorrowFilter::open()
        };
        store.list_borrows(&filter, page).await
    }

    pub async fn count(store: &dyn LibraryStore, filter: &BorrowFilter) -> AppResult<i64> {
        store.count_borrows(filter).await
    }

    /// Write `record` only if the stored loan is still in `expected` status.
    async fn save(
        store: &dyn LibraryStore,
        record: &BorrowRecord,
        expected: BorrowStatus,
    ) -> AppResult<BorrowRecord> {
        store
            .update_borrow(record, expected)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("borrow {}", record.borrow_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReaderType, ReservationRequest, ReservationStatus};
    use crate::service::testkit::*;
    use crate::store::{MemoryStore, MockLibraryStore};

    const ISBN: &str = "9787111111111";

    fn request(reader_id: &str, isbn: &str) -> BorrowRequest {
        BorrowRequest { reader_id: reader_id.into(), isbn: isbn.into() }
    }

    #[tokio::test]
    async fn borrow_and_return_move_stock_and_set_due_date() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        seed_book(&store, ISBN, 1).await;
        let r = seed_reader(&store, ReaderType::Student).await;

        let loan = BorrowService::borrow(&store, &policy, request(&r.reader_id, ISBN), at(2024, 2, 1))
            .await
            .unwrap();
        assert!(loan.borrow_id.starts_with('B'));
        assert_eq!(loan.due_date, day(2024, 3, 2));
        assert_eq!(BookService::get(&store, ISBN).await.unwrap().available_quantity, 0);

        let back = BorrowService::return_book(&store, &policy, &loan.borrow_id, at(2024, 2, 10))
            .await
            .unwrap();
        assert_eq!(back.status, BorrowStatus::Returned);
        assert_eq!(back.fine_cents, Some(0));
        assert_eq!(BookService::get(&store, ISBN).await.unwrap().available_quantity, 1);
        assert!(matches!(
            BorrowService::return_book(&store, &policy, &loan.borrow_id, at(2024, 2, 11)).await,
            Err(AppError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn late_return_charges_fine_and_credit() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        seed_book(&store, ISBN, 1).await;
        let r = seed_reader(&store, ReaderType::Public).await;
        let loan = BorrowService::borrow(&store, &policy, request(&r.reader_id, ISBN), at(2024, 2, 1))
            .await
            .unwrap();
        assert_eq!(loan.due_date, day(2024, 2, 16));

        let back = BorrowService::return_book(&store, &policy, &loan.borrow_id, at(2024, 2, 20))
            .await
            .unwrap();
        assert_eq!(back.fine_cents, Some(400));
        assert_eq!(ReaderService::get(&store, &r.reader_id).await.unwrap().credit_score, 96);
    }

    #[tokio::test]
    async fn same_book_twice_and_type_limit_are_rejected() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        let r = seed_reader(&store, ReaderType::Public).await;
        for i in 0..4 {
            seed_book(&store, &format!("978711111111{}", i), 2).await;
        }
        BorrowService::borrow(&store, &policy, request(&r.reader_id, "9787111111110"), at(2024, 2, 1))
            .await
            .unwrap();
        assert!(matches!(
            BorrowService::borrow(&store, &policy, request(&r.reader_id, "9787111111110"), at(2024, 2, 1)).await,
            Err(AppError::Rejected(_))
        ));
        for i in 1..3 {
            BorrowService::borrow(&store, &policy, request(&r.reader_id, &format!("978711111111{}", i)), at(2024, 2, 1))
                .await
                .unwrap();
        }
        let err = BorrowService::borrow(&store, &policy, request(&r.reader_id, "9787111111113"), at(2024, 2, 1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[tokio::test]
    async fn frozen_reader_cannot_borrow() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        seed_book(&store, ISBN, 1).await;
        let r = seed_reader(&store, ReaderType::Student).await;
        ReaderService::freeze(&store, &r.reader_id).await.unwrap();
        assert!(matches!(
            BorrowService::borrow(&store, &policy, request(&r.reader_id, ISBN), at(2024, 2, 1)).await,
            Err(AppError::Rejected(_))
        ));
        assert_eq!(BookService::get(&store, ISBN).await.unwrap().available_quantity, 1);
    }

    #[tokio::test]
    async fn renew_extends_due_date_until_limit() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        seed_book(&store, ISBN, 1).await;
        let r = seed_reader(&store, ReaderType::Public).await;
        let loan = BorrowService::borrow(&store, &policy, request(&r.reader_id, ISBN), at(2024, 2, 1))
            .await
            .unwrap();

        let once = BorrowService::renew(&store, &policy, &loan.borrow_id, at(2024, 2, 10)).await.unwrap();
        assert_eq!(once.due_date, day(2024, 3, 2));
        let twice = BorrowService::renew(&store, &policy, &loan.borrow_id, at(2024, 2, 11)).await.unwrap();
        assert_eq!(twice.renew_count, 2);
        assert!(matches!(
            BorrowService::renew(&store, &policy, &loan.borrow_id, at(2024, 2, 12)).await,
            Err(AppError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn past_due_loan_cannot_be_renewed() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        seed_book(&store, ISBN, 1).await;
        let r = seed_reader(&store, ReaderType::Public).await;
        let loan = BorrowService::borrow(&store, &policy, request(&r.reader_id, ISBN), at(2024, 2, 1))
            .await
            .unwrap();
        let err = BorrowService::renew(&store, &policy, &loan.borrow_id, at(2024, 2, 17))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("past due"));
    }

    #[tokio::test]
    async fn process_overdue_flags_late_loans_once() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        seed_book(&store, ISBN, 2).await;
        let r = seed_reader(&store, ReaderType::Public).await;
        BorrowService::borrow(&store, &policy, request(&r.reader_id, ISBN), at(2024, 2, 1))
            .await
            .unwrap();

        let early = BorrowService::process_overdue(&store, &policy, at(2024, 2, 16)).await.unwrap();
        assert_eq!(early.processed_count, 0);
        let late = BorrowService::process_overdue(&store, &policy, at(2024, 2, 20)).await.unwrap();
        assert_eq!(late.processed_count, 1);
        assert_eq!(ReaderService::get(&store, &r.reader_id).await.unwrap().credit_score, 96);
        let again = BorrowService::process_overdue(&store, &policy, at(2024, 2, 21)).await.unwrap();
        assert_eq!(again.processed_count, 0);

        let listed = BorrowService::overdue(&store, at(2024, 2, 21), Page::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, BorrowStatus::Overdue);
    }

    #[tokio::test]
    async fn lost_loan_keeps_stock_down_and_charges_default_fine() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        seed_book(&store, ISBN, 1).await;
        let r = seed_reader(&store, ReaderType::Student).await;
        let loan = BorrowService::borrow(&store, &policy, request(&r.reader_id, ISBN), at(2024, 2, 1))
            .await
            .unwrap();
        BorrowService::mark_overdue(&store, &loan.borrow_id).await.unwrap();

        let lost = BorrowService::mark_lost(&store, &policy, &loan.borrow_id, None).await.unwrap();
        assert_eq!(lost.status, BorrowStatus::Lost);
        assert_eq!(lost.fine_cents, Some(5000));
        assert_eq!(ReaderService::get(&store, &r.reader_id).await.unwrap().credit_score, 90);
        assert_eq!(BookService::get(&store, ISBN).await.unwrap().available_quantity, 0);
        assert!(BorrowService::mark_lost(&store, &policy, &loan.borrow_id, None).await.is_err());
    }

    fn late_loan() -> BorrowRecord {
        BorrowRecord {
            borrow_id: "B00000001".into(),
            reader_id: "R00000001".into(),
            isbn: ISBN.into(),
            borrow_date: at(2024, 1, 1),
            due_date: day(2024, 1, 31),
            return_date: None,
            renew_count: 0,
            status: BorrowStatus::Borrowed,
            fine_cents: None,
        }
    }

    fn returned_meanwhile(r: &BorrowRecord, _: BorrowStatus) -> AppResult<Option<BorrowRecord>> {
        Err(AppError::Rejected(format!("borrow {} is Returned", r.borrow_id)))
    }

    #[tokio::test]
    async fn process_overdue_skips_a_loan_returned_meanwhile() {
        let mut store = MockLibraryStore::new();
        store
            .expect_list_borrows()
            .returning(|_, _| Ok(vec![late_loan()]));
        store.expect_update_borrow().returning(returned_meanwhile);
        store.expect_adjust_credit_score().never();

        let outcome = BorrowService::process_overdue(&store, &LoanPolicy::default(), at(2024, 2, 20))
            .await
            .unwrap();
        assert_eq!(outcome.processed_count, 0);
    }

    #[tokio::test]
    async fn lost_report_racing_a_return_is_rejected_without_charge() {
        let mut store = MockLibraryStore::new();
        store
            .expect_find_borrow()
            .returning(|_| Ok(Some(late_loan())));
        store.expect_update_borrow().returning(returned_meanwhile);
        store.expect_adjust_credit_score().never();

        let err = BorrowService::mark_lost(&store, &LoanPolicy::default(), "B00000001", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));
    }

    #[tokio::test]
    async fn borrowing_completes_the_readers_ready_reservation() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        seed_book(&store, ISBN, 1).await;
        let first = seed_reader_n(&store, ReaderType::Student, 1).await;
        let second = seed_reader_n(&store, ReaderType::Student, 2).await;

        let loan = BorrowService::borrow(&store, &policy, request(&first.reader_id, ISBN), at(2024, 2, 1))
            .await
            .unwrap();
        let reservation = ReservationService::reserve(
            &store,
            &policy,
            ReservationRequest { reader_id: second.reader_id.clone(), isbn: ISBN.into() },
            at(2024, 2, 2),
        )
        .await
        .unwrap();
        BorrowService::return_book(&store, &policy, &loan.borrow_id, at(2024, 2, 5))
            .await
            .unwrap();
        assert_eq!(
            ReservationService::get(&store, &reservation.reservation_id).await.unwrap().status,
            ReservationStatus::Ready
        );

        BorrowService::borrow(&store, &policy, request(&second.reader_id, ISBN), at(2024, 2, 6))
            .await
            .unwrap();
        assert_eq!(
            ReservationService::get(&store, &reservation.reservation_id).await.unwrap().status,
            ReservationStatus::Completed
        );
    }
}
