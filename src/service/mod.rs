//! Library services: domain rules on top of a `LibraryStore`.

mod books;
mod borrows;
mod readers;
mod reservations;
#[cfg(test)]
pub(crate) mod testkit;
mod validation;

pub use books::BookService;
pub use borrows::BorrowService;
pub use readers::{borrow_block_reason, ReaderService, MAX_CREDIT_CHANGE};
pub use reservations::ReservationService;
pub use validation::{RequestValidator, Validate, ValidationRule};
