//! Business logic services

pub mod authors;
pub mod catalog;
pub mod validation;

use crate::{
    config::CatalogConfig,
    error::{AppError, AppResult},
    models::{Author, AuthorId, Book, BookId},
    repository::{EntityStoreArc, StoreTransaction},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub authors: authors::AuthorRegistry,
    pub catalog: catalog::CatalogRegistry,
}

impl Services {
    /// Create all services on top of the given store
    pub fn new(store: EntityStoreArc, catalog_config: &CatalogConfig) -> Self {
        Self {
            authors: authors::AuthorRegistry::new(store.clone()),
            catalog: catalog::CatalogRegistry::new(store, catalog_config),
        }
    }
}

async fn require_author(tx: &mut dyn StoreTransaction, id: AuthorId) -> AppResult<Author> {
    tx.get_author(id)
        .await?
        .ok_or_else(|| AppError::author_not_found(id))
}

async fn require_book(tx: &mut dyn StoreTransaction, id: BookId) -> AppResult<Book> {
    tx.get_book(id)
        .await?
        .ok_or_else(|| AppError::book_not_found(id))
}
