//! HTTP handlers for books, readers, borrows, reservations and utilities.

pub mod books;
pub mod borrows;
pub mod readers;
pub mod reservations;
pub mod utils;
