//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::author::AuthorId;

pub type BookId = i64;

/// Full book model as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub isbn: i64,
    pub year: i32,
    pub publisher: String,
    pub language: String,
    /// Authors of this book, computed from the association. Never empty.
    #[sqlx(skip)]
    #[serde(default)]
    pub authors: Vec<AuthorId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Bibliographic fields supplied when creating a book
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookDraft {
    pub title: String,
    pub isbn: i64,
    pub year: i32,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub language: String,
}

/// Full replacement of a book. `id` must match the targeted book.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookUpdate {
    pub id: BookId,
    pub title: String,
    pub isbn: i64,
    pub year: i32,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub language: String,
    pub authors: Vec<AuthorId>,
}

/// Book row handed to the store for an upsert.
/// The association is not part of the row; it is managed through links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRecord {
    pub id: Option<BookId>,
    pub title: String,
    pub isbn: i64,
    pub year: i32,
    pub publisher: String,
    pub language: String,
}

impl From<BookDraft> for BookRecord {
    fn from(draft: BookDraft) -> Self {
        Self {
            id: None,
            title: draft.title,
            isbn: draft.isbn,
            year: draft.year,
            publisher: draft.publisher,
            language: draft.language,
        }
    }
}

impl From<&BookUpdate> for BookRecord {
    fn from(update: &BookUpdate) -> Self {
        Self {
            id: Some(update.id),
            title: update.title.clone(),
            isbn: update.isbn,
            year: update.year,
            publisher: update.publisher.clone(),
            language: update.language.clone(),
        }
    }
}

/// Query predicate for book lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookFilter {
    /// Case-insensitive substring match on the title
    TitleContains(String),
    /// Books linked to the given author
    ByAuthor(AuthorId),
}
