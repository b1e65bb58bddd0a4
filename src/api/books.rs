//! Book endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{author::AuthorRef, AuthorId, Book, BookDraft, BookId, BookUpdate},
    AppState,
};

use super::SearchQuery;

/// List books, optionally filtered by title
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(SearchQuery),
    responses(
        (status = 200, description = "List of books", body = Vec<Book>)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<Book>>> {
    let books = match query.q {
        Some(q) => state.services.catalog.find_by_title(&q).await?,
        None => state.services.catalog.list().await?,
    };
    Ok(Json(books))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<BookId>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get(id).await?;
    Ok(Json(book))
}

/// Create a book written by the given author
#[utoipa::path(
    post,
    path = "/authors/{id}/books",
    tag = "books",
    params(
        ("id" = i64, Path, description = "Author ID")
    ),
    request_body = BookDraft,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid title, ISBN or year"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    Path(author_id): Path<AuthorId>,
    Json(draft): Json<BookDraft>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let created = state.services.catalog.create(author_id, draft).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Replace an existing book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body = BookUpdate,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid fields or id mismatch"),
        (status = 404, description = "Book or author not found"),
        (status = 409, description = "Too many authors")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<BookId>,
    Json(book): Json<BookUpdate>,
) -> AppResult<Json<Book>> {
    let updated = state.services.catalog.update(id, book).await?;
    Ok(Json(updated))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<BookId>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add an existing author to a book
#[utoipa::path(
    put,
    path = "/books/{id}/authors",
    tag = "books",
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body = AuthorRef,
    responses(
        (status = 200, description = "Author added", body = Book),
        (status = 404, description = "Book or author not found"),
        (status = 409, description = "Too many authors")
    )
)]
pub async fn add_book_author(
    State(state): State<AppState>,
    Path(id): Path<BookId>,
    Json(author): Json<AuthorRef>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.add_author(id, author.id).await?;
    Ok(Json(book))
}
