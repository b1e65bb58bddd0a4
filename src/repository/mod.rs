//! Entity store abstraction and its implementations.
//!
//! Every registry operation opens a [`StoreTransaction`], works through it and
//! commits. Dropping a transaction without committing discards its changes, so a
//! failure half-way through a multi-entity mutation leaves nothing behind.
//!
//! The author <-> book association is stored once, as `(author_id, book_id)` link
//! pairs. `Author::books` and `Book::authors` are computed from those pairs each
//! time an entity is loaded.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::{
    error::AppResult,
    models::{Author, AuthorFilter, AuthorId, AuthorRecord, Book, BookFilter, BookId, BookRecord},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Source of store transactions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Opens a transaction. Conflicting transactions are serialized by the store.
    async fn begin(&self) -> AppResult<Box<dyn StoreTransaction>>;

    /// Opens a read-only transaction over the last committed state.
    ///
    /// Any number of them may run at once. Mutating calls fail and `commit`
    /// does nothing.
    async fn read(&self) -> AppResult<Box<dyn StoreTransaction>>;
}

/// Unit of work against the store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get_author(&mut self, id: AuthorId) -> AppResult<Option<Author>>;

    async fn list_authors(&mut self) -> AppResult<Vec<Author>>;

    async fn find_authors(&mut self, filter: &AuthorFilter) -> AppResult<Vec<Author>>;

    /// Inserts or updates an author row. Assigns an id when the record has none.
    async fn save_author(&mut self, record: AuthorRecord) -> AppResult<Author>;

    /// Removes an author and any link rows still referencing it.
    /// Returns `false` when no such author exists.
    async fn delete_author(&mut self, id: AuthorId) -> AppResult<bool>;

    async fn get_book(&mut self, id: BookId) -> AppResult<Option<Book>>;

    async fn list_books(&mut self) -> AppResult<Vec<Book>>;

    async fn find_books(&mut self, filter: &BookFilter) -> AppResult<Vec<Book>>;

    /// Inserts or updates a book row. Links are left untouched.
    async fn save_book(&mut self, record: BookRecord) -> AppResult<Book>;

    /// Removes a book and every link row referencing it.
    /// Returns `false` when no such book exists.
    async fn delete_book(&mut self, id: BookId) -> AppResult<bool>;

    /// Links an author to a book. Returns `false` if the pair was already linked.
    async fn link(&mut self, author_id: AuthorId, book_id: BookId) -> AppResult<bool>;

    /// Unlinks an author from a book. Returns `false` if the pair was not linked.
    async fn unlink(&mut self, author_id: AuthorId, book_id: BookId) -> AppResult<bool>;

    /// Makes every change of this transaction visible to other transactions.
    async fn commit(&mut self) -> AppResult<()>;
}

/// Shared handle to an entity store
pub type EntityStoreArc = Arc<dyn EntityStore>;
