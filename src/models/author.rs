//! Author model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::book::BookId;

pub type AuthorId = i64;

/// Full author model as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: AuthorId,
    pub full_name: String,
    /// Books this author contributed to, computed from the association
    #[sqlx(skip)]
    #[serde(default)]
    pub books: Vec<BookId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author row handed to the store for an upsert.
/// A missing id asks the store to assign one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRecord {
    pub id: Option<AuthorId>,
    pub full_name: String,
}

/// Query predicate for author lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorFilter {
    /// Case-insensitive substring match on the full name
    NameContains(String),
}

impl AuthorFilter {
    pub fn matches(&self, full_name: &str) -> bool {
        match self {
            AuthorFilter::NameContains(query) => {
                full_name.to_lowercase().contains(&query.to_lowercase())
            }
        }
    }
}

/// Create author request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuthor {
    pub full_name: String,
}

/// Update author request. When present, `id` must match the path id.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAuthor {
    pub id: Option<AuthorId>,
    pub full_name: String,
}

/// Reference to an existing author, used when associating it with a book
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorRef {
    pub id: AuthorId,
}
