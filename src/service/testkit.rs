//! Shared fixtures for service tests.

use super::{BookService, ReaderService};
use crate::config::LoanPolicy;
use crate::model::book::fixtures::new_book;
use crate::model::reader::fixtures::details;
use crate::model::{Book, Reader, ReaderStatus, ReaderType};
use crate::store::LibraryStore;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

pub const ID_CARD_A: &str = "110101200001010000";
pub const PHONE_A: &str = "13800130000";

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Noon UTC on the given day.
pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

pub async fn seed_book(store: &dyn LibraryStore, isbn: &str, copies: i32) -> Book {
    BookService::create(store, new_book(isbn, copies, copies))
        .await
        .unwrap()
}

/// Registered on 2024-01-01 with full credit.
pub async fn seed_reader(store: &dyn LibraryStore, reader_type: ReaderType) -> Reader {
    seed_reader_n(store, reader_type, 0).await
}

/// `n` picks a distinct id card and phone.
pub async fn seed_reader_n(store: &dyn LibraryStore, reader_type: ReaderType, n: u16) -> Reader {
    let id_card = format!("11010120000101{:04}", n);
    let phone = format!("1380013{:04}", n);
    ReaderService::register(
        store,
        &LoanPolicy::default(),
        details(reader_type, &id_card, &phone),
        at(2024, 1, 1),
    )
    .await
    .unwrap()
}

pub fn reader_fixture(reader_type: ReaderType) -> Reader {
    Reader {
        reader_id: "R00000001".into(),
        name: "李雷".into(),
        id_card: ID_CARD_A.into(),
        phone: PHONE_A.into(),
        email: None,
        reader_type,
        register_date: at(2024, 1, 1),
        valid_until: day(2025, 1, 1),
        status: ReaderStatus::Active,
        credit_score: 100,
    }
}
