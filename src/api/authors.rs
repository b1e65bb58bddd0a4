//! Author endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{CreateAuthor, UpdateAuthor},
        Author, AuthorId, Book,
    },
    AppState,
};

use super::SearchQuery;

/// List authors, optionally filtered by name
#[utoipa::path(
    get,
    path = "/authors",
    tag = "authors",
    params(SearchQuery),
    responses(
        (status = 200, description = "List of authors", body = Vec<Author>)
    )
)]
pub async fn list_authors(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<Author>>> {
    let authors = match query.q {
        Some(q) => state.services.authors.search(&q).await?,
        None => state.services.authors.list().await?,
    };
    Ok(Json(authors))
}

/// Get author details by ID
#[utoipa::path(
    get,
    path = "/authors/{id}",
    tag = "authors",
    params(
        ("id" = i64, Path, description = "Author ID")
    ),
    responses(
        (status = 200, description = "Author details", body = Author),
        (status = 404, description = "Author not found")
    )
)]
pub async fn get_author(
    State(state): State<AppState>,
    Path(id): Path<AuthorId>,
) -> AppResult<Json<Author>> {
    let author = state.services.authors.get(id).await?;
    Ok(Json(author))
}

/// Create a new author
#[utoipa::path(
    post,
    path = "/authors",
    tag = "authors",
    request_body = CreateAuthor,
    responses(
        (status = 201, description = "Author created", body = Author),
        (status = 400, description = "Empty name")
    )
)]
pub async fn create_author(
    State(state): State<AppState>,
    Json(author): Json<CreateAuthor>,
) -> AppResult<(StatusCode, Json<Author>)> {
    let created = state.services.authors.create(&author.full_name).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Rename an author
#[utoipa::path(
    put,
    path = "/authors/{id}",
    tag = "authors",
    params(
        ("id" = i64, Path, description = "Author ID")
    ),
    request_body = UpdateAuthor,
    responses(
        (status = 200, description = "Author updated", body = Author),
        (status = 400, description = "Empty name or id mismatch"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn update_author(
    State(state): State<AppState>,
    Path(id): Path<AuthorId>,
    Json(author): Json<UpdateAuthor>,
) -> AppResult<Json<Author>> {
    if let Some(body_id) = author.id {
        if body_id != id {
            return Err(AppError::InvalidInput(format!(
                "Author id {} in payload does not match target id {}",
                body_id, id
            )));
        }
    }

    let updated = state.services.authors.rename(id, &author.full_name).await?;
    Ok(Json(updated))
}

/// Delete an author, and the books they wrote alone
#[utoipa::path(
    delete,
    path = "/authors/{id}",
    tag = "authors",
    params(
        ("id" = i64, Path, description = "Author ID")
    ),
    responses(
        (status = 204, description = "Author deleted"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn delete_author(
    State(state): State<AppState>,
    Path(id): Path<AuthorId>,
) -> AppResult<StatusCode> {
    state.services.authors.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the books of an author
#[utoipa::path(
    get,
    path = "/authors/{id}/books",
    tag = "authors",
    params(
        ("id" = i64, Path, description = "Author ID")
    ),
    responses(
        (status = 200, description = "Books of the author", body = Vec<Book>),
        (status = 404, description = "Author not found")
    )
)]
pub async fn list_author_books(
    State(state): State<AppState>,
    Path(id): Path<AuthorId>,
) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.authors.books(id).await?;
    Ok(Json(books))
}
