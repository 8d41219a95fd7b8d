//! Reservation queue: reserve, cancel, notify, complete, promotion and expiry.

use super::readers::borrow_block_reason;
use super::{BookService, ReaderService, Validate};
use crate::config::LoanPolicy;
use crate::error::{AppError, AppResult};
use crate::model::{
    generate_id, BookStatus, BorrowFilter, Page, ProcessOutcome, QueuePosition, ReservationFilter,
    ReservationRecord, ReservationRequest, ReservationStatus,
};
use crate::store::LibraryStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

pub struct ReservationService;

impl ReservationService {
    /// Queue the reader for a book that has no copy on the shelf.
    pub async fn reserve(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        req: ReservationRequest,
        now: DateTime<Utc>,
    ) -> AppResult<ReservationRecord> {
        req.validate()?;
        ReaderService::require_eligible(store, policy, &req.reader_id, now.date_naive()).await?;
        let book = BookService::get(store, &req.isbn).await?;
        if book.status == BookStatus::Removed {
            return Err(AppError::Rejected(format!("book {} has been removed", req.isbn)));
        }
        let on_loan = store
            .count_borrows(&BorrowFilter {
                reader_id: Some(req.reader_id.clone()),
                isbn: Some(req.isbn.clone()),
                ..BorrowFilter::open()
            })
            .await?;
        if on_loan > 0 {
            return Err(AppError::Rejected(format!(
                "reader {} already has book {} on loan",
                req.reader_id, req.isbn
            )));
        }
        let mine = ReservationFilter {
            reader_id: Some(req.reader_id.clone()),
            ..ReservationFilter::active()
        };
        let same_book = ReservationFilter {
            isbn: Some(req.isbn.clone()),
            ..mine.clone()
        };
        if store.count_reservations(&same_book).await? > 0 {
            return Err(AppError::Duplicate(format!(
                "reader {} already has an active reservation for book {}",
                req.reader_id, req.isbn
            )));
        }
        if book.is_borrowable() {
            return Err(AppError::Rejected(format!(
                "book {} has copies available, borrow it directly",
                req.isbn
            )));
        }
        if store.count_reservations(&mine).await? >= policy.max_active_reservations {
            return Err(AppError::Rejected(format!(
                "reader {} reached the limit of {} active reservations",
                req.reader_id, policy.max_active_reservations
            )));
        }

        let record = ReservationRecord {
            reservation_id: generate_id('V'),
            reader_id: req.reader_id,
            isbn: req.isbn,
            reserve_date: now,
            status: ReservationStatus::Pending,
            notify_date: None,
            expire_date: None,
        };
        let record = store.insert_reservation(&record).await?;
        tracing::info!(
            reservation_id = %record.reservation_id,
            reader_id = %record.reader_id,
            isbn = %record.isbn,
            "book reserved"
        );
        Ok(record)
    }

    /// Cancel a pending or ready reservation. A released hold passes to the next in queue.
    pub async fn cancel(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        reservation_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<ReservationRecord> {
        let mut record = Self::get(store, reservation_id).await?;
        let was_ready = match record.status {
            ReservationStatus::Pending => false,
            ReservationStatus::Ready => true,
            other => {
                return Err(AppError::Rejected(format!(
                    "reservation {} is {:?} and cannot be cancelled",
                    reservation_id, other
                )))
            }
        };
        let seen = record.status;
        record.status = ReservationStatus::Cancelled;
        let record = Self::save(store, &record, seen).await?;
        tracing::info!(reservation_id, "reservation cancelled");
        if was_ready {
            Self::promote_next(store, policy, &record.isbn, now).await?;
        }
        Ok(record)
    }

    /// Pending -> ready; the hold lasts `reservation_hold_days` from now.
    pub async fn notify_ready(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        reservation_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<ReservationRecord> {
        let mut record = Self::get(store, reservation_id).await?;
        if record.status != ReservationStatus::Pending {
            return Err(AppError::Rejected(format!(
                "reservation {} is {:?}, only pending reservations can be notified",
                reservation_id, record.status
            )));
        }
        let expire_date = Duration::try_days(policy.reservation_hold_days)
            .and_then(|hold| now.checked_add_signed(hold))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "reservation hold of {} days is out of range",
                    policy.reservation_hold_days
                ))
            })?;
        record.status = ReservationStatus::Ready;
        record.notify_date = Some(now);
        record.expire_date = Some(expire_date);
        let record = Self::save(store, &record, ReservationStatus::Pending).await?;
        tracing::info!(
            reservation_id,
            reader_id = %record.reader_id,
            isbn = %record.isbn,
            "reservation ready for pickup"
        );
        Ok(record)
    }

    pub async fn complete(store: &dyn LibraryStore, reservation_id: &str) -> AppResult<ReservationRecord> {
        let mut record = Self::get(store, reservation_id).await?;
        if record.status != ReservationStatus::Ready {
            return Err(AppError::Rejected(format!(
                "reservation {} is {:?}, only ready reservations can be completed",
                reservation_id, record.status
            )));
        }
        record.status = ReservationStatus::Completed;
        let record = Self::save(store, &record, ReservationStatus::Ready).await?;
        tracing::info!(reservation_id, "reservation completed");
        Ok(record)
    }

    /// Mark the oldest eligible pending reservation ready when an unheld copy is on the shelf.
    /// Pending reservations of readers who can no longer borrow are cancelled along the way.
    pub async fn promote_next(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        isbn: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ReservationRecord>> {
        let book = BookService::get(store, isbn).await?;
        if !book.is_borrowable() {
            return Ok(None);
        }
        let held = store
            .count_reservations(&ReservationFilter {
                isbn: Some(isbn.to_string()),
                statuses: vec![ReservationStatus::Ready],
                ..Default::default()
            })
            .await?;
        if held >= i64::from(book.available_quantity) {
            return Ok(None);
        }

        let queue = Self::pending_for_book(store, isbn, Page::ALL).await?;
        let today = now.date_naive();
        for mut candidate in queue {
            let reason = match store.find_reader(&candidate.reader_id).await? {
                Some(reader) => borrow_block_reason(policy, &reader, today),
                None => Some("reader no longer exists"),
            };
            match reason {
                None => match Self::notify_ready(store, policy, &candidate.reservation_id, now).await {
                    Ok(ready) => return Ok(Some(ready)),
                    Err(AppError::Rejected(_)) => continue,
                    Err(e) => return Err(e),
                },
                Some(reason) => {
                    candidate.status = ReservationStatus::Cancelled;
                    match Self::save(store, &candidate, ReservationStatus::Pending).await {
                        Ok(_) | Err(AppError::Rejected(_)) => {}
                        Err(e) => return Err(e),
                    }
                    tracing::info!(
                        reservation_id = %candidate.reservation_id,
                        reason,
                        "pending reservation dropped"
                    );
                }
            }
        }
        Ok(None)
    }

    /// Cancel ready reservations whose hold has lapsed, then offer every freed copy to the queue.
    pub async fn process_expired(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<ProcessOutcome> {
        let expired = store
            .list_reservations(
                &ReservationFilter {
                    statuses: vec![ReservationStatus::Ready],
                    expires_before: Some(now),
                    oldest_first: true,
                    ..Default::default()
                },
                Page::ALL,
            )
            .await?;
        let mut books = BTreeSet::new();
        let mut processed = 0u64;
        for mut record in expired {
            record.status = ReservationStatus::Cancelled;
            match Self::save(store, &record, ReservationStatus::Ready).await {
                Ok(_) => {}
                Err(AppError::Rejected(reason)) => {
                    tracing::debug!(reservation_id = %record.reservation_id, %reason, "skipped, hold changed");
                    continue;
                }
                Err(e) => return Err(e),
            }
            books.insert(record.isbn);
            processed += 1;
        }
        // promote_next stops once ready holds cover the copies on the shelf
        for isbn in &books {
            while Self::promote_next(store, policy, isbn, now).await?.is_some() {}
        }
        tracing::info!(processed, "expired reservations processed");
        Ok(ProcessOutcome {
            message: format!("{} reservation(s) expired", processed),
            processed_count: processed,
        })
    }

    /// Where the reader stands in the queue for `isbn`: 0 when ready, otherwise 1-based among pending.
    pub async fn queue_position(
        store: &dyn LibraryStore,
        reader_id: &str,
        isbn: &str,
    ) -> AppResult<QueuePosition> {
        let active = store
            .list_reservations(
                &ReservationFilter {
                    isbn: Some(isbn.to_string()),
                    ..ReservationFilter::active()
                },
                Page::ALL,
            )
            .await?;
        let queue_position = active
            .iter()
            .find(|r| r.reader_id == reader_id)
            .map(|mine| match mine.status {
                ReservationStatus::Ready => 0,
                _ => {
                    active
                        .iter()
                        .filter(|r| r.status == ReservationStatus::Pending)
                        .take_while(|r| r.reservation_id != mine.reservation_id)
                        .count()
                        + 1
                }
            });
        Ok(QueuePosition {
            reader_id: reader_id.to_string(),
            isbn: isbn.to_string(),
            has_reservation: queue_position.is_some(),
            queue_position,
        })
    }

    pub async fn get(store: &dyn LibraryStore, reservation_id: &str) -> AppResult<ReservationRecord> {
        store
            .find_reservation(reservation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("reservation {}", reservation_id)))
    }

    pub async fn list(
        store: &dyn LibraryStore,
        filter: &ReservationFilter,
        page: Page,
    ) -> AppResult<Vec<ReservationRecord>> {
        store.list_reservations(filter, page).await
    }

    /// Pending reservations for a book in queue order.
    pub async fn pending_for_book(
        store: &dyn LibraryStore,
        isbn: &str,
        page: Page,
    ) -> AppResult<Vec<ReservationRecord>> {
        let filter = ReservationFilter {
            isbn: Some(isbn.to_string()),
            statuses: vec![ReservationStatus::Pending],
            oldest_first: true,
            ..Default::default()
        };
        store.list_reservations(&filter, page).await
    }

    pub async fn count(store: &dyn LibraryStore, filter: &ReservationFilter) -> AppResult<i64> {
        store.count_reservations(filter).await
    }

    async fn save(
        store: &dyn LibraryStore,
        record: &ReservationRecord,
        expected: ReservationStatus,
    ) -> AppResult<ReservationRecord> {
        store
            .update_reservation(record, expected)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("reservation {}", record.reservation_id)))
    }
}
