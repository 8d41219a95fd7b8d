//! PostgreSQL store. Identifiers are fixed; every value is a bound parameter.

use super::LibraryStore;
use crate::error::{AppError, AppResult};
use crate::model::{
    Book, BookFilter, BorrowFilter, BorrowRecord, BorrowStatus, Page, Reader, ReaderFilter,
    ReaderStatus, ReservationFilter, ReservationRecord, ReservationStatus, MAX_CREDIT_SCORE,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

const BOOK_COLUMNS: &str = "isbn, title, author, publisher, publish_year, category, \
    total_quantity, available_quantity, location, description, status";
const READER_COLUMNS: &str = "reader_id, name, id_card, phone, email, reader_type, \
    register_date, valid_until, status, credit_score";
const BORROW_COLUMNS: &str = "borrow_id, reader_id, isbn, borrow_date, due_date, return_date, \
    renew_count, status, fine_cents";
const RESERVATION_COLUMNS: &str = "reservation_id, reader_id, isbn, reserve_date, status, \
    notify_date, expire_date";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(PgStore { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Unique-key violations become `Duplicate`; everything else stays a database error.
fn map_unique(what: String) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Duplicate(format!("{} already exists", what))
        }
        _ => AppError::Db(e),
    }
}

/// `%` and `_` in user input match literally inside ILIKE.
fn like_pattern(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: Page) {
    qb.push(" LIMIT ").push_bind(page.limit);
    qb.push(" OFFSET ").push_bind(page.skip);
}

fn push_book_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &BookFilter) {
    qb.push(" WHERE status = 'available'");
    if let Some(title) = &filter.title {
        qb.push(" AND title ILIKE ").push_bind(like_pattern(title));
    }
    if let Some(author) = &filter.author {
        qb.push(" AND author ILIKE ").push_bind(like_pattern(author));
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if filter.in_stock_only {
        qb.push(" AND available_quantity > 0");
    }
}

fn push_borrow_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &BorrowFilter) {
    qb.push(" WHERE TRUE");
    if let Some(reader_id) = &filter.reader_id {
        qb.push(" AND reader_id = ").push_bind(reader_id.clone());
    }
    if let Some(isbn) = &filter.isbn {
        qb.push(" AND isbn = ").push_bind(isbn.clone());
    }
    if !filter.statuses.is_empty() {
        qb.push(" AND status IN (");
        let mut sep = qb.separated(", ");
        for s in &filter.statuses {
            sep.push_bind(*s);
        }
        sep.push_unseparated(")");
    }
    if let Some(due_before) = filter.due_before {
        qb.push(" AND due_date < ").push_bind(due_before);
    }
}

fn push_reservation_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ReservationFilter) {
    qb.push(" WHERE TRUE");
    if let Some(reader_id) = &filter.reader_id {
        qb.push(" AND reader_id = ").push_bind(reader_id.clone());
    }
    if let Some(isbn) = &filter.isbn {
        qb.push(" AND isbn = ").push_bind(isbn.clone());
    }
    if !filter.statuses.is_empty() {
        qb.push(" AND status IN (");
        let mut sep = qb.separated(", ");
        for s in &filter.statuses {
            sep.push_bind(*s);
        }
        sep.push_unseparated(")");
    }
    if let Some(expires_before) = filter.expires_before {
        qb.push(" AND expire_date < ").push_bind(expires_before);
    }
}

fn direction(oldest_first: bool) -> &'static str {
    if oldest_first {
        "ASC"
    } else {
        "DESC"
    }
}

#[async_trait]
impl LibraryStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }

    async fn insert_book(&self, book: &Book) -> AppResult<Book> {
        let sql = format!(
            "INSERT INTO books ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {cols}",
            cols = BOOK_COLUMNS
        );
        tracing::debug!(sql = %sql, isbn = %book.isbn, "query");
        sqlx::query_as::<_, Book>(&sql)
            .bind(&book.isbn)
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.publisher)
            .bind(book.publish_year)
            .bind(&book.category)
            .bind(book.total_quantity)
            .bind(book.available_quantity)
            .bind(&book.location)
            .bind(&book.description)
            .bind(book.status)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique(format!("isbn {}", book.isbn)))
    }

    async fn find_book(&self, isbn: &str) -> AppResult<Option<Book>> {
        let sql = format!("SELECT {} FROM books WHERE isbn = $1", BOOK_COLUMNS);
        Ok(sqlx::query_as::<_, Book>(&sql)
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_books(&self, filter: &BookFilter, page: Page) -> AppResult<Vec<Book>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM books", BOOK_COLUMNS));
        push_book_filter(&mut qb, filter);
        qb.push(" ORDER BY isbn");
        push_page(&mut qb, page);
        tracing::debug!(sql = %qb.sql(), "query");
        Ok(qb.build_query_as::<Book>().fetch_all(&self.pool).await?)
    }

    async fn update_book(&self, book: &Book) -> AppResult<Option<Book>> {
        let mut tx = self.pool.begin().await?;
        let locked = sqlx::query_scalar::<_, String>("SELECT isbn FROM books WHERE isbn = $1 FOR UPDATE")
            .bind(&book.isbn)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }
        let on_loan = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM borrow_records WHERE isbn = $1 AND status IN ('borrowed', 'overdue')",
        )
        .bind(&book.isbn)
        .fetch_one(&mut *tx)
        .await?;
        if i64::from(book.available_quantity) + on_loan > i64::from(book.total_quantity) {
            return Err(AppError::Rejected(format!(
                "{} copies of book {} are on loan; total_quantity {} cannot hold available_quantity {}",
                on_loan, book.isbn, book.total_quantity, book.available_quantity
            )));
        }
        let sql = format!(
            "UPDATE books SET title = $2, author = $3, publisher = $4, publish_year = $5, \
             category = $6, total_quantity = $7, available_quantity = $8, location = $9, \
             description = $10, status = $11 WHERE isbn = $1 RETURNING {}",
            BOOK_COLUMNS
        );
        tracing::debug!(sql = %sql, isbn = %book.isbn, "query (tx)");
        let row = sqlx::query_as::<_, Book>(&sql)
            .bind(&book.isbn)
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.publisher)
            .bind(book.publish_year)
            .bind(&book.category)
            .bind(book.total_quantity)
            .bind(book.available_quantity)
            .bind(&book.location)
            .bind(&book.description)
            .bind(book.status)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn count_books(&self) -> AppResult<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books WHERE status = 'available'")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn insert_reader(&self, reader: &Reader) -> AppResult<Reader> {
        let sql = format!(
            "INSERT INTO readers ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {cols}",
            cols = READER_COLUMNS
        );
        tracing::debug!(sql = %sql, reader_id = %reader.reader_id, "query");
        sqlx::query_as::<_, Reader>(&sql)
            .bind(&reader.reader_id)
            .bind(&reader.name)
            .bind(&reader.id_card)
            .bind(&reader.phone)
            .bind(&reader.email)
            .bind(reader.reader_type)
            .bind(reader.register_date)
            .bind(reader.valid_until)
            .bind(reader.status)
            .bind(reader.credit_score)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique(format!("reader {}", reader.reader_id)))
    }

    async fn find_reader(&self, reader_id: &str) -> AppResult<Option<Reader>> {
        let sql = format!("SELECT {} FROM readers WHERE reader_id = $1", READER_COLUMNS);
        Ok(sqlx::query_as::<_, Reader>(&sql)
            .bind(reader_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_reader_by_id_card(&self, id_card: &str) -> AppResult<Option<Reader>> {
        let sql = format!(
            "SELECT {} FROM readers WHERE id_card = $1 AND status <> 'deleted' LIMIT 1",
            READER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Reader>(&sql)
            .bind(id_card)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_reader_by_phone(&self, phone: &str) -> AppResult<Option<Reader>> {
        let sql = format!(
            "SELECT {} FROM readers WHERE phone = $1 AND status <> 'deleted' LIMIT 1",
            READER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Reader>(&sql)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_readers(&self, filter: &ReaderFilter, page: Page) -> AppResult<Vec<Reader>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM readers", READER_COLUMNS));
        match filter.status {
            Some(status) => {
                qb.push(" WHERE status = ").push_bind(status);
            }
            None => {
                qb.push(" WHERE status <> ").push_bind(ReaderStatus::Deleted);
            }
        }
        if let Some(reader_type) = filter.reader_type {
            qb.push(" AND reader_type = ").push_bind(reader_type);
        }
        if let Some(name) = &filter.name {
            qb.push(" AND name ILIKE ").push_bind(like_pattern(name));
        }
        qb.push(" ORDER BY register_date, reader_id");
        push_page(&mut qb, page);
        tracing::debug!(sql = %qb.sql(), "query");
        Ok(qb.build_query_as::<Reader>().fetch_all(&self.pool).await?)
    }

    async fn update_reader(&self, reader: &Reader) -> AppResult<Option<Reader>> {
        let sql = format!(
            "UPDATE readers SET name = $2, id_card = $3, phone = $4, email = $5, reader_type = $6, \
             valid_until = $7, status = $8 WHERE reader_id = $1 RETURNING {}",
            READER_COLUMNS
        );
        tracing::debug!(sql = %sql, reader_id = %reader.reader_id, "query");
        sqlx::query_as::<_, Reader>(&sql)
            .bind(&reader.reader_id)
            .bind(&reader.name)
            .bind(&reader.id_card)
            .bind(&reader.phone)
            .bind(&reader.email)
            .bind(reader.reader_type)
            .bind(reader.valid_until)
            .bind(reader.status)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_unique(format!("reader {}", reader.reader_id)))
    }

    async fn adjust_credit_score(&self, reader_id: &str, delta: i32) -> AppResult<Option<Reader>> {
        let sql = format!(
            "UPDATE readers SET credit_score = LEAST(GREATEST(credit_score + $2, 0), $3) \
             WHERE reader_id = $1 RETURNING {}",
            READER_COLUMNS
        );
        tracing::debug!(sql = %sql, reader_id, delta, "query");
        Ok(sqlx::query_as::<_, Reader>(&sql)
            .bind(reader_id)
            .bind(delta)
            .bind(MAX_CREDIT_SCORE)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn count_readers(&self) -> AppResult<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM readers WHERE status <> 'deleted'")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn open_borrow(&self, record: &BorrowRecord) -> AppResult<BorrowRecord> {
        let mut tx = self.pool.begin().await?;
        let taken = sqlx::query(
            "UPDATE books SET available_quantity = available_quantity - 1 \
             WHERE isbn = $1 AND status = 'available' AND available_quantity > 0",
        )
        .bind(&record.isbn)
        .execute(&mut *tx)
        .await?;
        if taken.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, String>("SELECT isbn FROM books WHERE isbn = $1")
                .bind(&record.isbn)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => AppError::Rejected(format!("book {} is not available", record.isbn)),
                None => AppError::NotFound(format!("book {}", record.isbn)),
            });
        }
        let sql = format!(
            "INSERT INTO borrow_records ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {cols}",
            cols = BORROW_COLUMNS
        );
        tracing::debug!(sql = %sql, borrow_id = %record.borrow_id, "query (tx)");
        let row = sqlx::query_as::<_, BorrowRecord>(&sql)
            .bind(&record.borrow_id)
            .bind(&record.reader_id)
            .bind(&record.isbn)
            .bind(record.borrow_date)
            .bind(record.due_date)
            .bind(record.return_date)
            .bind(record.renew_count)
            .bind(record.status)
            .bind(record.fine_cents)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_unique(format!("borrow {}", record.borrow_id)))?;
        sqlx::query(
            "UPDATE reservation_records SET status = 'completed' \
             WHERE reader_id = $1 AND isbn = $2 AND status = 'ready'",
        )
        .bind(&record.reader_id)
        .bind(&record.isbn)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn close_borrow(
        &self,
        borrow_id: &str,
        returned_at: DateTime<Utc>,
        fine_cents: i64,
    ) -> AppResult<Option<BorrowRecord>> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "UPDATE borrow_records SET status = 'returned', return_date = $2, fine_cents = $3 \
             WHERE borrow_id = $1 AND status IN ('borrowed', 'overdue') RETURNING {}",
            BORROW_COLUMNS
        );
        tracing::debug!(sql = %sql, borrow_id, "query (tx)");
        let closed = sqlx::query_as::<_, BorrowRecord>(&sql)
            .bind(borrow_id)
            .bind(returned_at)
            .bind(fine_cents)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(closed) = closed else {
            let exists =
                sqlx::query_scalar::<_, String>("SELECT borrow_id FROM borrow_records WHERE borrow_id = $1")
                    .bind(borrow_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return match exists {
                Some(_) => Err(AppError::Rejected(format!("borrow {} is already closed", borrow_id))),
                None => Ok(None),
            };
        };
        sqlx::query(
            "UPDATE books SET available_quantity = LEAST(available_quantity + 1, total_quantity) \
             WHERE isbn = $1",
        )
        .bind(&closed.isbn)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(closed))
    }

    async fn find_borrow(&self, borrow_id: &str) -> AppResult<Option<BorrowRecord>> {
        let sql = format!("SELECT {} FROM borrow_records WHERE borrow_id = $1", BORROW_COLUMNS);
        Ok(sqlx::query_as::<_, BorrowRecord>(&sql)
            .bind(borrow_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_borrows(&self, filter: &BorrowFilter, page: Page) -> AppResult<Vec<BorrowRecord>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM borrow_records", BORROW_COLUMNS));
        push_borrow_filter(&mut qb, filter);
        let dir = direction(filter.oldest_first);
        qb.push(format!(" ORDER BY borrow_date {dir}, borrow_id {dir}"));
        push_page(&mut qb, page);
        tracing::debug!(sql = %qb.sql(), "query");
        Ok(qb.build_query_as::<BorrowRecord>().fetch_all(&self.pool).await?)
    }

    async fn update_borrow(
        &self,
        record: &BorrowRecord,
        expected: BorrowStatus,
    ) -> AppResult<Option<BorrowRecord>> {
        let sql = format!(
            "UPDATE borrow_records SET status = $2, due_date = $3, renew_count = $4, fine_cents = $5 \
             WHERE borrow_id = $1 AND status = $6 RETURNING {}",
            BORROW_COLUMNS
        );
        tracing::debug!(sql = %sql, borrow_id = %record.borrow_id, "query");
        let row = sqlx::query_as::<_, BorrowRecord>(&sql)
            .bind(&record.borrow_id)
            .bind(record.status)
            .bind(record.due_date)
            .bind(record.renew_count)
            .bind(record.fine_cents)
            .bind(expected)
            .fetch_optional(&self.pool)
            .await?;
        if row.is_some() {
            return Ok(row);
        }
        let current = sqlx::query_scalar::<_, BorrowStatus>(
            "SELECT status FROM borrow_records WHERE borrow_id = $1",
        )
        .bind(&record.borrow_id)
        .fetch_optional(&self.pool)
        .await?;
        match current {
            Some(status) => Err(AppError::Rejected(format!(
                "borrow {} is {:?}, expected {:?}",
                record.borrow_id, status, expected
            ))),
            None => Ok(None),
        }
    }

    async fn count_borrows(&self, filter: &BorrowFilter) -> AppResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM borrow_records");
        push_borrow_filter(&mut qb, filter);
        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }

    async fn insert_reservation(&self, record: &ReservationRecord) -> AppResult<ReservationRecord> {
        let sql = format!(
            "INSERT INTO reservation_records ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {cols}",
            cols = RESERVATION_COLUMNS
        );
        tracing::debug!(sql = %sql, reservation_id = %record.reservation_id, "query");
        sqlx::query_as::<_, ReservationRecord>(&sql)
            .bind(&record.reservation_id)
            .bind(&record.reader_id)
            .bind(&record.isbn)
            .bind(record.reserve_date)
            .bind(record.status)
            .bind(record.notify_date)
            .bind(record.expire_date)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique(format!("reservation {}", record.reservation_id)))
    }

    async fn find_reservation(&self, reservation_id: &str) -> AppResult<Option<ReservationRecord>> {
        let sql = format!(
            "SELECT {} FROM reservation_records WHERE reservation_id = $1",
            RESERVATION_COLUMNS
        );
        Ok(sqlx::query_as::<_, ReservationRecord>(&sql)
            .bind(reservation_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
        page: Page,
    ) -> AppResult<Vec<ReservationRecord>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM reservation_records",
            RESERVATION_COLUMNS
        ));
        push_reservation_filter(&mut qb, filter);
        let dir = direction(filter.oldest_first);
        qb.push(format!(" ORDER BY reserve_date {dir}, reservation_id {dir}"));
        push_page(&mut qb, page);
        tracing::debug!(sql = %qb.sql(), "query");
        Ok(qb
            .build_query_as::<ReservationRecord>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_reservation(
        &self,
        record: &ReservationRecord,
        expected: ReservationStatus,
    ) -> AppResult<Option<ReservationRecord>> {
        let sql = format!(
            "UPDATE reservation_records SET status = $2, notify_date = $3, expire_date = $4 \
             WHERE reservation_id = $1 AND status = $5 RETURNING {}",
            RESERVATION_COLUMNS
        );
        tracing::debug!(sql = %sql, reservation_id = %record.reservation_id, "query");
        let row = sqlx::query_as::<_, ReservationRecord>(&sql)
            .bind(&record.reservation_id)
            .bind(record.status)
            .bind(record.notify_date)
            .bind(record.expire_date)
            .bind(expected)
            .fetch_optional(&self.pool)
            .await?;
        if row.is_some() {
            return Ok(row);
        }
        let current = sqlx::query_scalar::<_, ReservationStatus>(
            "SELECT status FROM reservation_records WHERE reservation_id = $1",
        )
        .bind(&record.reservation_id)
        .fetch_optional(&self.pool)
        .await?;
        match current {
            Some(status) => Err(AppError::Rejected(format!(
                "reservation {} is {:?}, expected {:?}",
                record.reservation_id, status, expected
            ))),
            None => Ok(None),
        }
    }

    async fn count_reservations(&self, filter: &ReservationFilter) -> AppResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM reservation_records");
        push_reservation_filter(&mut qb, filter);
        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%_x"), "%100\\%\\_x%");
    }

    #[test]
    fn borrow_filter_sql_binds_statuses() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM borrow_records");
        push_borrow_filter(
            &mut qb,
            &BorrowFilter {
                reader_id: Some("R1".into()),
                ..BorrowFilter::open()
            },
        );
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM borrow_records WHERE TRUE AND reader_id = $1 AND status IN ($2, $3)"
        );
    }
}
