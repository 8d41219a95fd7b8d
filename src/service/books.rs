//! Book catalogue: create, read, update, soft remove and availability.

use super::Validate;
use crate::error::{AppError, AppResult};
use crate::model::{
    Book, BookAvailability, BookDetails, BookFilter, BookStatus, BorrowFilter, NewBook, Page,
};
use crate::store::LibraryStore;

pub struct BookService;

impl BookService {
    pub async fn create(store: &dyn LibraryStore, new: NewBook) -> AppResult<Book> {
        new.validate()?;
        check_stock(&new.details)?;
        if store.find_book(&new.isbn).await?.is_some() {
            return Err(AppError::Duplicate(format!("isbn {} already exists", new.isbn)));
        }
        let book = store.insert_book(&Book::new(new.isbn, new.details)).await?;
        tracing::info!(isbn = %book.isbn, copies = book.total_quantity, "book created");
        Ok(book)
    }

    pub async fn get(store: &dyn LibraryStore, isbn: &str) -> AppResult<Book> {
        store
            .find_book(isbn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book {}", isbn)))
    }

    pub async fn list(store: &dyn LibraryStore, filter: &BookFilter, page: Page) -> AppResult<Vec<Book>> {
        store.list_books(filter, page).await
    }

    /// Replace every mutable field. Stock on the shelf may not exceed copies not out on loan.
    pub async fn update(store: &dyn LibraryStore, isbn: &str, details: BookDetails) -> AppResult<Book> {
        details.validate()?;
        check_stock(&details)?;
        let mut book = Self::get(store, isbn).await?;
        let on_loan = Self::open_loans(store, isbn).await?;
        if i64::from(details.available_quantity) + on_loan > i64::from(details.total_quantity) {
            return Err(AppError::Rejected(format!(
                "{} copies are on loan; total_quantity {} cannot hold available_quantity {}",
                on_loan, details.total_quantity, details.available_quantity
            )));
        }
        book.apply(details);
        store
            .update_book(&book)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book {}", isbn)))
    }

    /// Soft remove. Refused while any copy is on loan.
    pub async fn remove(store: &dyn LibraryStore, isbn: &str) -> AppResult<Book> {
        let mut book = Self::get(store, isbn).await?;
        if book.status == BookStatus::Removed {
            return Err(AppError::Rejected(format!("book {} is already removed", isbn)));
        }
        let on_loan = Self::open_loans(store, isbn).await?;
        if on_loan > 0 {
            return Err(AppError::Rejected(format!(
                "book {} has {} copies on loan",
                isbn, on_loan
            )));
        }
        book.status = BookStatus::Removed;
        let book = store
            .update_book(&book)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book {}", isbn)))?;
        tracing::info!(isbn, "book removed");
        Ok(book)
    }

    pub async fn availability(store: &dyn LibraryStore, isbn: &str) -> AppResult<BookAvailability> {
        let book = Self::get(store, isbn).await?;
        Ok(BookAvailability {
            is_available: book.is_borrowable(),
            available_quantity: book.available_quantity,
            total_quantity: book.total_quantity,
            isbn: book.isbn,
            title: book.title,
        })
    }

    pub async fn count(store: &dyn LibraryStore) -> AppResult<i64> {
        store.count_books().await
    }

    async fn open_loans(store: &dyn LibraryStore, isbn: &str) -> AppResult<i64> {
        store
            .count_borrows(&BorrowFilter {
                isbn: Some(isbn.to_string()),
                ..BorrowFilter::open()
            })
            .await
    }
}

fn check_stock(details: &BookDetails) -> AppResult<()> {
    if details.available_quantity > details.total_quantity {
        return Err(AppError::Validation(format!(
            "available_quantity {} exceeds total_quantity {}",
            details.available_quantity, details.total_quantity
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::book::fixtures::{details, new_book};
    use crate::model::{BorrowRequest, ReaderType};
    use crate::service::testkit::*;
    use crate::service::BorrowService;
    use crate::store::{MemoryStore, MockLibraryStore};
    use crate::config::LoanPolicy;

    const ISBN: &str = "9787111111111";

    #[tokio::test]
    async fn create_rejects_duplicates_and_overstock() {
        let store = MemoryStore::new();
        BookService::create(&store, new_book(ISBN, 2, 2)).await.unwrap();
        assert!(matches!(
            BookService::create(&store, new_book(ISBN, 2, 2)).await,
            Err(AppError::Duplicate(_))
        ));
        assert!(matches!(
            BookService::create(&store, new_book("9787222222222", 2, 3)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_and_remove_respect_copies_on_loan() {
        let store = MemoryStore::new();
        let policy = LoanPolicy::default();
        seed_book(&store, ISBN, 2).await;
        let reader = seed_reader(&store, ReaderType::Student).await;
        BorrowService::borrow(
            &store,
            &policy,
            BorrowRequest { reader_id: reader.reader_id, isbn: ISBN.into() },
            at(2024, 2, 1),
        )
        .await
        .unwrap();

        assert!(matches!(
            BookService::update(&store, ISBN, details(2, 2)).await,
            Err(AppError::Rejected(_))
        ));
        let updated = BookService::update(&store, ISBN, details(5, 4)).await.unwrap();
        assert_eq!(updated.total_quantity, 5);
        assert!(matches!(BookService::remove(&store, ISBN).await, Err(AppError::Rejected(_))));
    }

    #[tokio::test]
    async fn removed_book_is_hidden_and_unavailable() {
        let store = MemoryStore::new();
        seed_book(&store, ISBN, 1).await;
        BookService::remove(&store, ISBN).await.unwrap();

        assert_eq!(BookService::count(&store).await.unwrap(), 0);
        let listed = BookService::list(&store, &BookFilter::default(), Page::default())
            .await
            .unwrap();
        assert!(listed.is_empty());
        let a = BookService::availability(&store, ISBN).await.unwrap();
        assert!(!a.is_available);
        assert_eq!(a.available_quantity, 1);
    }

    #[tokio::test]
    async fn missing_book_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(BookService::get(&store, ISBN).await, Err(AppError::NotFound(_))));
        assert!(matches!(BookService::remove(&store, ISBN).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn loan_opened_after_the_precheck_still_blocks_the_update() {
        let mut store = MockLibraryStore::new();
        store
            .expect_find_book()
            .returning(|isbn| Ok(Some(Book::new(isbn.into(), details(2, 2)))));
        store.expect_count_borrows().returning(|_| Ok(0));
        store.expect_update_book().returning(|b| {
            Err(AppError::Rejected(format!("1 copies of book {} are on loan", b.isbn)))
        });

        let err = BookService::update(&store, ISBN, details(2, 2)).await.unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));
    }

    #[tokio::test]
    async fn store_failure_propagates_as_database_error() {
        let mut store = MockLibraryStore::new();
        store
            .expect_find_book()
            .returning(|_| Err(AppError::Db(sqlx::Error::PoolTimedOut)));
        store.expect_insert_book().never();
        let err = BookService::create(&store, new_book(ISBN, 1, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::Db(sqlx::Error::PoolTimedOut)));
    }
}
