use crate::error::AppResult;
use crate::service::{RequestValidator, Validate, ValidationRule};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "book_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Available,
    Removed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Book {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub publish_year: i32,
    pub category: String,
    pub total_quantity: i32,
    pub available_quantity: i32,
    pub location: String,
    pub description: Option<String>,
    pub status: BookStatus,
}

impl Book {
    pub fn new(isbn: String, details: BookDetails) -> Self {
        let mut book = Book {
            isbn,
            title: String::new(),
            author: String::new(),
            publisher: String::new(),
            publish_year: 0,
            category: String::new(),
            total_quantity: 0,
            available_quantity: 0,
            location: String::new(),
            description: None,
            status: BookStatus::Available,
        };
        book.apply(details);
        book
    }

    /// Overwrite every mutable field; isbn and status are untouched.
    pub fn apply(&mut self, details: BookDetails) {
        self.title = details.title;
        self.author = details.author;
        self.publisher = details.publisher;
        self.publish_year = details.publish_year;
        self.category = details.category;
        self.total_quantity = details.total_quantity;
        self.available_quantity = details.available_quantity;
        self.location = details.location;
        self.description = details.description;
    }

    pub fn is_borrowable(&self) -> bool {
        self.status == BookStatus::Available && self.available_quantity > 0
    }

    /// Copies currently out on loan.
    pub fn on_loan(&self) -> i32 {
        self.total_quantity - self.available_quantity
    }
}

/// Mutable book fields; the body of `PUT /books/{isbn}` and part of [`NewBook`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BookDetails {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub publish_year: i32,
    pub category: String,
    pub total_quantity: i32,
    pub available_quantity: i32,
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Validate for BookDetails {
    fn validate(&self) -> AppResult<()> {
        RequestValidator::check_str("title", &self.title, &ValidationRule::length(1, 100))?;
        RequestValidator::check_str("author", &self.author, &ValidationRule::length(1, 50))?;
        RequestValidator::check_str("publisher", &self.publisher, &ValidationRule::length(1, 50))?;
        RequestValidator::check_int(
            "publish_year",
            self.publish_year.into(),
            &ValidationRule::range(1901, 2030),
        )?;
        RequestValidator::check_str("category", &self.category, &ValidationRule::length(1, 20))?;
        RequestValidator::check_int(
            "total_quantity",
            self.total_quantity.into(),
            &ValidationRule::at_least(1),
        )?;
        RequestValidator::check_int(
            "available_quantity",
            self.available_quantity.into(),
            &ValidationRule::at_least(0),
        )?;
        RequestValidator::check_str("location", &self.location, &ValidationRule::length(1, 20))?;
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct NewBook {
    pub isbn: String,
    #[serde(flatten)]
    pub details: BookDetails,
}

impl Validate for NewBook {
    fn validate(&self) -> AppResult<()> {
        RequestValidator::check_str("isbn", &self.isbn, &ValidationRule::length(10, 20))?;
        self.details.validate()
    }
}

/// Body of `GET /books/{isbn}/availability`.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct BookAvailability {
    pub isbn: String,
    pub title: String,
    pub is_available: bool,
    pub available_quantity: i32,
    pub total_quantity: i32,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn details(total: i32, available: i32) -> BookDetails {
        BookDetails {
            title: "The Rust Programming Language".into(),
            author: "Klabnik".into(),
            publisher: "No Starch".into(),
            publish_year: 2019,
            category: "programming".into(),
            total_quantity: total,
            available_quantity: available,
            location: "A-01".into(),
            description: None,
        }
    }

    pub fn new_book(isbn: &str, total: i32, available: i32) -> NewBook {
        NewBook {
            isbn: isbn.into(),
            details: details(total, available),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn valid_book_passes() {
        assert!(new_book("9787111111111", 3, 3).validate().is_ok());
    }

    #[test]
    fn short_isbn_and_zero_stock_are_rejected() {
        assert!(new_book("123", 3, 3).validate().is_err());
        assert!(new_book("9787111111111", 0, 0).validate().is_err());
        assert!(new_book("9787111111111", 3, -1).validate().is_err());
    }

    #[test]
    fn flattened_json_body_deserializes() {
        let body = serde_json::json!({
            "isbn": "9787111111111",
            "title": "T", "author": "A", "publisher": "P", "publish_year": 2001,
            "category": "c", "total_quantity": 2, "available_quantity": 1, "location": "L"
        });
        let nb: NewBook = serde_json::from_value(body).unwrap();
        assert_eq!(nb.details.total_quantity, 2);
        assert!(nb.details.description.is_none());
    }

    #[test]
    fn borrowable_requires_stock_and_available_status() {
        let mut b = Book::new("9787111111111".into(), details(2, 1));
        assert!(b.is_borrowable());
        assert_eq!(b.on_loan(), 1);
        b.available_quantity = 0;
        assert!(!b.is_borrowable());
        b.available_quantity = 1;
        b.status = BookStatus::Removed;
        assert!(!b.is_borrowable());
    }
}
