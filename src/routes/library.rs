//! Library API routes. Static segments sit beside `:id` captures; the static match wins.

use crate::handlers::{books, borrows, readers, reservations, utils};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn library_routes(state: AppState) -> Router {
    Router::new()
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/search", get(books::search_books))
        .route("/books/available", get(books::list_available_books))
        .route("/books/stats/count", get(books::count_books))
        .route(
            "/books/:isbn",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::remove_book),
        )
        .route("/books/:isbn/availability", get(books::book_availability))
        .route("/readers", get(readers::list_readers).post(readers::register_reader))
        .route("/readers/stats/count", get(readers::count_readers))
        .route(
            "/readers/:reader_id",
            get(readers::get_reader)
                .put(readers::update_reader)
                .delete(readers::delete_reader),
        )
        .route("/readers/:reader_id/freeze", post(readers::freeze_reader))
        .route("/readers/:reader_id/unfreeze", post(readers::unfreeze_reader))
        .route("/readers/:reader_id/credit", post(readers::adjust_credit))
        .route("/readers/:reader_id/status", get(readers::reader_status))
        .route("/borrows", get(borrows::list_borrows).post(borrows::borrow_book))
        .route("/borrows/overdue", get(borrows::list_overdue))
        .route("/borrows/process/overdue", post(borrows::process_overdue))
        .route("/borrows/stats/count", get(borrows::count_borrows))
        .route("/borrows/reader/:reader_id", get(borrows::list_reader_borrows))
        .route(
            "/borrows/reader/:reader_id/active",
            get(borrows::list_reader_active_borrows),
        )
        .route("/borrows/book/:isbn", get(borrows::list_book_borrows))
        .route("/borrows/:borrow_id", get(borrows::get_borrow))
        .route("/borrows/:borrow_id/return", post(borrows::return_book))
        .route("/borrows/:borrow_id/renew", post(borrows::renew_borrow))
        .route("/borrows/:borrow_id/overdue", post(borrows::mark_overdue))
        .route("/borrows/:borrow_id/lost", post(borrows::mark_lost))
        .route(
            "/reservations",
            get(reservations::list_reservations).post(reservations::reserve_book),
        )
        .route("/reservations/ready", get(reservations::list_ready))
        .route("/reservations/process/expired", post(reservations::process_expired))
        .route(
            "/reservations/process/book-return/:isbn",
            post(reservations::process_book_return),
        )
        .route("/reservations/stats/count", get(reservations::count_reservations))
        .route(
            "/reservations/reader/:reader_id",
            get(reservations::list_reader_reservations),
        )
        .route(
            "/reservations/reader/:reader_id/active",
            get(reservations::list_reader_active_reservations),
        )
        .route("/reservations/book/:isbn", get(reservations::list_book_reservations))
        .route("/reservations/book/:isbn/pending", get(reservations::list_book_pending))
        .route(
            "/reservations/queue/:reader_id/:isbn",
            get(reservations::queue_position),
        )
        .route("/reservations/:reservation_id", get(reservations::get_reservation))
        .route(
            "/reservations/:reservation_id/cancel",
            post(reservations::cancel_reservation),
        )
        .route(
            "/reservations/:reservation_id/notify",
            post(reservations::notify_reservation),
        )
        .route(
            "/reservations/:reservation_id/complete",
            post(reservations::complete_reservation),
        )
        .route("/utils/format-date", get(utils::format_date))
        .with_state(state)
}
