//! Reader registration, lifecycle and borrowing eligibility.

use super::Validate;
use crate::config::LoanPolicy;
use crate::error::{AppError, AppResult};
use crate::model::{
    generate_id, BorrowFilter, Page, Reader, ReaderDetails, ReaderFilter, ReaderStatus,
    ReaderStatusReport, MAX_CREDIT_SCORE,
};
use crate::store::LibraryStore;
use chrono::{DateTime, NaiveDate, Utc};

/// Largest single manual credit adjustment, either direction.
pub const MAX_CREDIT_CHANGE: i32 = 50;

/// Why `reader` may not borrow or reserve today; `None` when eligible.
pub fn borrow_block_reason(
    policy: &LoanPolicy,
    reader: &Reader,
    today: NaiveDate,
) -> Option<&'static str> {
    match reader.status {
        ReaderStatus::Deleted => return Some("reader has been deleted"),
        ReaderStatus::Frozen => return Some("reader is frozen"),
        ReaderStatus::Active => {}
    }
    if reader.valid_until < today {
        return Some("library card has expired");
    }
    if reader.credit_score < policy.min_credit_score {
        return Some("credit score is too low");
    }
    None
}

pub struct ReaderService;

impl ReaderService {
    pub async fn register(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        details: ReaderDetails,
        now: DateTime<Utc>,
    ) -> AppResult<Reader> {
        details.validate()?;
        Self::ensure_unique(store, &details, None).await?;
        let reader = Reader {
            reader_id: generate_id('R'),
            valid_until: policy.valid_until(details.reader_type, now.date_naive()),
            name: details.name,
            id_card: details.id_card,
            phone: details.phone,
            email: details.email,
            reader_type: details.reader_type,
            register_date: now,
            status: ReaderStatus::Active,
            credit_score: MAX_CREDIT_SCORE,
        };
        let reader = store.insert_reader(&reader).await?;
        tracing::info!(reader_id = %reader.reader_id, reader_type = ?reader.reader_type, "reader registered");
        Ok(reader)
    }

    pub async fn get(store: &dyn LibraryStore, reader_id: &str) -> AppResult<Reader> {
        store
            .find_reader(reader_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("reader {}", reader_id)))
    }

    pub async fn list(
        store: &dyn LibraryStore,
        filter: &ReaderFilter,
        page: Page,
    ) -> AppResult<Vec<Reader>> {
        store.list_readers(filter, page).await
    }

    /// Replace identity fields. A type change restarts card validity from today.
    pub async fn update(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        reader_id: &str,
        details: ReaderDetails,
        now: DateTime<Utc>,
    ) -> AppResult<Reader> {
        details.validate()?;
        let mut reader = Self::get_live(store, reader_id).await?;
        Self::ensure_unique(store, &details, Some(reader_id)).await?;
        if details.reader_type != reader.reader_type {
            reader.valid_until = policy.valid_until(details.reader_type, now.date_naive());
        }
        reader.name = details.name;
        reader.id_card = details.id_card;
        reader.phone = details.phone;
        reader.email = details.email;
        reader.reader_type = details.reader_type;
        Self::save(store, &reader).await
    }

    pub async fn freeze(store: &dyn LibraryStore, reader_id: &str) -> AppResult<Reader> {
        let mut reader = Self::get_live(store, reader_id).await?;
        reader.status = ReaderStatus::Frozen;
        let reader = Self::save(store, &reader).await?;
        tracing::info!(reader_id, "reader frozen");
        Ok(reader)
    }

    pub async fn unfreeze(store: &dyn LibraryStore, reader_id: &str) -> AppResult<Reader> {
        let mut reader = Self::get_live(store, reader_id).await?;
        reader.status = ReaderStatus::Active;
        let reader = Self::save(store, &reader).await?;
        tracing::info!(reader_id, "reader unfrozen");
        Ok(reader)
    }

    /// Soft delete. Refused while the reader still holds borrowed copies.
    pub async fn delete(store: &dyn LibraryStore, reader_id: &str) -> AppResult<Reader> {
        let mut reader = Self::get_live(store, reader_id).await?;
        let open = store
            .count_borrows(&BorrowFilter {
                reader_id: Some(reader_id.to_string()),
                ..BorrowFilter::open()
            })
            .await?;
        if open > 0 {
            return Err(AppError::Rejected(format!(
                "reader {} still has {} open borrow(s)",
                reader_id, open
            )));
        }
        reader.status = ReaderStatus::Deleted;
        let reader = Self::save(store, &reader).await?;
        tracing::info!(reader_id, "reader deleted");
        Ok(reader)
    }

    pub async fn adjust_credit(
        store: &dyn LibraryStore,
        reader_id: &str,
        score_change: i32,
    ) -> AppResult<Reader> {
        if !(-MAX_CREDIT_CHANGE..=MAX_CREDIT_CHANGE).contains(&score_change) {
            return Err(AppError::Validation(format!(
                "score_change must be between -{m} and {m}",
                m = MAX_CREDIT_CHANGE
            )));
        }
        let reader = store
            .adjust_credit_score(reader_id, score_change)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("reader {}", reader_id)))?;
        tracing::info!(reader_id, score_change, credit_score = reader.credit_score, "credit adjusted");
        Ok(reader)
    }

    pub async fn status_report(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        reader_id: &str,
        today: NaiveDate,
    ) -> AppResult<ReaderStatusReport> {
        let reader = Self::get(store, reader_id).await?;
        let block = borrow_block_reason(policy, &reader, today);
        Ok(ReaderStatusReport {
            is_active: reader.is_active(),
            is_valid: reader.is_valid(today),
            can_borrow: block.is_none(),
            borrow_reason: block.unwrap_or("ok").to_string(),
            reader_id: reader.reader_id,
            name: reader.name,
            status: reader.status,
            credit_score: reader.credit_score,
            valid_until: reader.valid_until,
        })
    }

    /// Reader who may borrow or reserve today, else `Rejected` with the reason.
    pub async fn require_eligible(
        store: &dyn LibraryStore,
        policy: &LoanPolicy,
        reader_id: &str,
        today: NaiveDate,
    ) -> AppResult<Reader> {
        let reader = Self::get(store, reader_id).await?;
        match borrow_block_reason(policy, &reader, today) {
            Some(reason) => Err(AppError::Rejected(format!("reader {}: {}", reader_id, reason))),
            None => Ok(reader),
        }
    }

    pub async fn count(store: &dyn LibraryStore) -> AppResult<i64> {
        store.count_readers().await
    }

    async fn get_live(store: &dyn LibraryStore, reader_id: &str) -> AppResult<Reader> {
        let reader = Self::get(store, reader_id).await?;
        if reader.status == ReaderStatus::Deleted {
            return Err(AppError::Rejected(format!("reader {} has been deleted", reader_id)));
        }
        Ok(reader)
    }

    async fn save(store: &dyn LibraryStore, reader: &Reader) -> AppResult<Reader> {
        store
            .update_reader(reader)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("reader {}", reader.reader_id)))
    }

    async fn ensure_unique(
        store: &dyn LibraryStore,
        details: &ReaderDetails,
        except: Option<&str>,
    ) -> AppResult<()> {
        let other = |r: &Reader| except != Some(r.reader_id.as_str());
        if store
            .find_reader_by_id_card(&details.id_card)
            .await?
            .filter(|r| other(r))
            .is_some()
        {
            return Err(AppError::Duplicate(format!(
                "id card {} is already registered",
                details.id_card
            )));
        }
        if store
            .find_reader_by_phone(&details.phone)
            .await?
            .filter(|r| other(r))
            .is_some()
        {
            return Err(AppError::Duplicate(format!(
                "phone {} is already registered",
                details.phone
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reader::fixtures::details;
    use crate::model::ReaderType;
    use crate::service::testkit::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn register_assigns_id_validity_and_full_credit() {
        let store = MemoryStore::new();
        let r = ReaderService::register(
            &store,
            &LoanPolicy::default(),
            details(ReaderType::Public, ID_CARD_A, PHONE_A),
            at(2024, 1, 1),
        )
        .await
        .unwrap();
        assert!(r.reader_id.starts_with('R'));
        assert_eq!(r.status, ReaderStatus::Active);
        assert_eq!(r.credit_score, 100);
        assert_eq!(r.valid_until, day(2024, 6, 29));
    }

    #[tokio::test]
    async fn duplicate_id_card_or_phone_is_rejected_until_deleted() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        let first = seed_reader(&store, ReaderType::Student).await;

        let same_card = details(ReaderType::Student, ID_CARD_A, "13900139000");
        let err = ReaderService::register(&store, &policy, same_card.clone(), at(2024, 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
        let same_phone = details(ReaderType::Student, "220101200001011234", PHONE_A);
        assert!(ReaderService::register(&store, &policy, same_phone, at(2024, 1, 2))
            .await
            .is_err());

        ReaderService::delete(&store, &first.reader_id).await.unwrap();
        assert!(ReaderService::register(&store, &policy, same_card, at(2024, 1, 3))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn update_keeps_own_identity_and_recomputes_validity_on_type_change() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        let r = seed_reader(&store, ReaderType::Student).await;

        let mut d = details(ReaderType::Student, ID_CARD_A, PHONE_A);
        d.name = "韩梅梅".into();
        let same_type = ReaderService::update(&store, &policy, &r.reader_id, d.clone(), at(2024, 3, 1))
            .await
            .unwrap();
        assert_eq!(same_type.name, "韩梅梅");
        assert_eq!(same_type.valid_until, r.valid_until);

        d.reader_type = ReaderType::Teacher;
        let promoted = ReaderService::update(&store, &policy, &r.reader_id, d, at(2024, 3, 1))
            .await
            .unwrap();
        assert_eq!(promoted.valid_until, policy.valid_until(ReaderType::Teacher, day(2024, 3, 1)));
    }

    #[tokio::test]
    async fn frozen_reader_cannot_borrow_and_deleted_reader_cannot_be_unfrozen() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        let r = seed_reader(&store, ReaderType::Student).await;

        ReaderService::freeze(&store, &r.reader_id).await.unwrap();
        let report = ReaderService::status_report(&store, &policy, &r.reader_id, day(2024, 1, 2))
            .await
            .unwrap();
        assert!(!report.can_borrow);
        assert!(!report.is_active);
        assert_eq!(report.borrow_reason, "reader is frozen");

        ReaderService::unfreeze(&store, &r.reader_id).await.unwrap();
        ReaderService::delete(&store, &r.reader_id).await.unwrap();
        assert!(matches!(
            ReaderService::unfreeze(&store, &r.reader_id).await,
            Err(AppError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn credit_adjustment_is_bounded() {
        let store = MemoryStore::new();
        let r = seed_reader(&store, ReaderType::Student).await;
        assert!(matches!(
            ReaderService::adjust_credit(&store, &r.reader_id, 51).await,
            Err(AppError::Validation(_))
        ));
        let up = ReaderService::adjust_credit(&store, &r.reader_id, 20).await.unwrap();
        assert_eq!(up.credit_score, 100);
        let down = ReaderService::adjust_credit(&store, &r.reader_id, -45).await.unwrap();
        assert_eq!(down.credit_score, 55);
        let err = ReaderService::require_eligible(&store, &LoanPolicy::default(), &r.reader_id, day(2024, 1, 2))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("credit"));
    }

    #[test]
    fn expired_card_blocks_borrowing() {
        let mut r = reader_fixture(ReaderType::Public);
        r.valid_until = day(2024, 1, 1);
        let policy = LoanPolicy::default();
        assert_eq!(borrow_block_reason(&policy, &r, day(2024, 1, 1)), None);
        assert_eq!(
            borrow_block_reason(&policy, &r, day(2024, 1, 2)),
            Some("library card has expired")
        );
    }
}
