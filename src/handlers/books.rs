//! Book handlers.

use crate::error::AppError;
use crate::extractors::{ApiKey, AppJson, AppQuery};
use crate::model::{BookDetails, BookFilter, NewBook, Page, PageParams};
use crate::response::{success_count, success_many, success_one, success_one_ok, success_with_message};
use crate::service::BookService;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub available_only: Option<bool>,
}

impl BookQuery {
    fn into_filter(self) -> BookFilter {
        BookFilter {
            title: self.title.filter(|s| !s.trim().is_empty()),
            author: self.author.filter(|s| !s.trim().is_empty()),
            category: self.category.filter(|s| !s.trim().is_empty()),
            in_stock_only: self.available_only.unwrap_or(false),
        }
    }
}

pub async fn create_book(
    State(state): State<AppState>,
    _key: ApiKey,
    AppJson(body): AppJson<NewBook>,
) -> Result<impl IntoResponse, AppError> {
    let book = BookService::create(state.store(), body).await?;
    Ok(success_one(book))
}

pub async fn list_books(
    State(state): State<AppState>,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(q): AppQuery<BookQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let rows = BookService::list(state.store(), &q.into_filter(), page).await?;
    Ok(success_many(rows))
}

/// Like `list_books` but at least one of title, author or category is required.
pub async fn search_books(
    State(state): State<AppState>,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(q): AppQuery<BookQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = q.into_filter();
    if filter.title.is_none() && filter.author.is_none() && filter.category.is_none() {
        return Err(AppError::BadRequest(
            "search needs at least one of title, author, category".into(),
        ));
    }
    let rows = BookService::list(state.store(), &filter, page).await?;
    Ok(success_many(rows))
}

pub async fn list_available_books(
    State(state): State<AppState>,
    AppQuery(page): AppQuery<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::try_from(page)?;
    let filter = BookFilter {
        in_stock_only: true,
        ..Default::default()
    };
    let rows = BookService::list(state.store(), &filter, page).await?;
    Ok(success_many(rows))
}

pub async fn count_books(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(success_count(BookService::count(state.store()).await?))
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one_ok(BookService::get(state.store(), &isbn).await?))
}

pub async fn update_book(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(isbn): Path<String>,
    AppJson(body): AppJson<BookDetails>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one_ok(BookService::update(state.store(), &isbn, body).await?))
}

pub async fn remove_book(
    State(state): State<AppState>,
    _key: ApiKey,
    Path(isbn): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let book = BookService::remove(state.store(), &isbn).await?;
    Ok(success_with_message(book, format!("book {} removed", isbn)))
}

pub async fn book_availability(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one_ok(BookService::availability(state.store(), &isbn).await?))
}
