//! Author registry

use crate::{
    error::{AppError, AppResult},
    models::{Author, AuthorFilter, AuthorId, AuthorRecord, Book, BookFilter},
    repository::EntityStoreArc,
    services::{catalog, require_author, validation},
};

#[derive(Clone)]
pub struct AuthorRegistry {
    store: EntityStoreArc,
}

impl AuthorRegistry {
    pub fn new(store: EntityStoreArc) -> Self {
        Self { store }
    }

    /// All authors
    pub async fn list(&self) -> AppResult<Vec<Author>> {
        let mut tx = self.store.read().await?;
        tx.list_authors().await
    }

    /// Authors whose name contains `query`, ignoring case
    pub async fn search(&self, query: &str) -> AppResult<Vec<Author>> {
        let mut tx = self.store.read().await?;
        tx.find_authors(&AuthorFilter::NameContains(query.to_string())).await
    }

    pub async fn get(&self, id: AuthorId) -> AppResult<Author> {
        let mut tx = self.store.read().await?;
        require_author(tx.as_mut(), id).await
    }

    pub async fn create(&self, full_name: &str) -> AppResult<Author> {
        validation::validate_full_name(full_name)?;

        let mut tx = self.store.begin().await?;
        let author = tx
            .save_author(AuthorRecord {
                id: None,
                full_name: full_name.to_string(),
            })
            .await?;
        tx.commit().await?;

        tracing::info!("Author create: id={}", author.id);
        Ok(author)
    }

    pub async fn rename(&self, id: AuthorId, new_full_name: &str) -> AppResult<Author> {
        let mut tx = self.store.begin().await?;
        require_author(tx.as_mut(), id).await?;
        validation::validate_full_name(new_full_name)?;

        let author = tx
            .save_author(AuthorRecord {
                id: Some(id),
                full_name: new_full_name.to_string(),
            })
            .await?;
        tx.commit().await?;

        tracing::info!("Author rename: id={}", id);
        Ok(author)
    }

    /// Delete an author together with the books only they wrote.
    ///
    /// Co-authored books lose this author and survive. The whole cascade runs in
    /// one transaction; on any failure nothing is applied.
    pub async fn delete(&self, id: AuthorId) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let author = require_author(tx.as_mut(), id).await?;
        let release = catalog::release_author(tx.as_mut(), &author).await?;

        if !tx.delete_author(id).await? {
            return Err(AppError::InconsistentState(format!(
                "author {} disappeared during delete",
                id
            )));
        }
        tx.commit().await?;

        tracing::info!(
            "Author delete: id={} ({} book(s) detached, {} book(s) deleted)",
            id,
            release.detached.len(),
            release.deleted.len()
        );
        Ok(())
    }

    /// Books the author contributed to
    pub async fn books(&self, id: AuthorId) -> AppResult<Vec<Book>> {
        let mut tx = self.store.read().await?;
        require_author(tx.as_mut(), id).await?;
        tx.find_books(&BookFilter::ByAuthor(id)).await
    }
}
