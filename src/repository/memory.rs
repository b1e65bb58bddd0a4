//! In-memory entity store

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::{
    error::{AppError, AppResult},
    models::{Author, AuthorFilter, AuthorId, AuthorRecord, Book, BookFilter, BookId, BookRecord},
    repository::{EntityStore, StoreTransaction},
};

#[derive(Debug, Clone)]
struct AuthorRow {
    full_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct BookRow {
    title: String,
    isbn: i64,
    year: i32,
    publisher: String,
    language: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct CatalogState {
    authors: BTreeMap<AuthorId, AuthorRow>,
    books: BTreeMap<BookId, BookRow>,
    links: BTreeSet<(AuthorId, BookId)>,
    last_author_id: AuthorId,
    last_book_id: BookId,
}

impl CatalogState {
    fn author(&self, id: AuthorId) -> Option<Author> {
        let row = self.authors.get(&id)?;
        Some(Author {
            id,
            full_name: row.full_name.clone(),
            books: self
                .links
                .range((id, BookId::MIN)..=(id, BookId::MAX))
                .map(|(_, book_id)| *book_id)
                .collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn book(&self, id: BookId) -> Option<Book> {
        let row = self.books.get(&id)?;
        Some(Book {
            id,
            title: row.title.clone(),
            isbn: row.isbn,
            year: row.year,
            publisher: row.publisher.clone(),
            language: row.language.clone(),
            authors: self
                .links
                .iter()
                .filter(|(_, book_id)| *book_id == id)
                .map(|(author_id, _)| *author_id)
                .collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn authors_where(&self, keep: impl Fn(AuthorId, &AuthorRow) -> bool) -> Vec<Author> {
        self.authors
            .iter()
            .filter(|(id, row)| keep(**id, *row))
            .filter_map(|(id, _)| self.author(*id))
            .collect()
    }

    fn books_where(&self, keep: impl Fn(BookId, &BookRow) -> bool) -> Vec<Book> {
        self.books
            .iter()
            .filter(|(id, row)| keep(**id, *row))
            .filter_map(|(id, _)| self.book(*id))
            .collect()
    }

    fn find_authors(&self, filter: &AuthorFilter) -> Vec<Author> {
        self.authors_where(|_, row| filter.matches(&row.full_name))
    }

    fn find_books(&self, filter: &BookFilter) -> Vec<Book> {
        match filter {
            BookFilter::TitleContains(query) => {
                let query = query.to_lowercase();
                self.books_where(|_, row| row.title.to_lowercase().contains(&query))
            }
            BookFilter::ByAuthor(author_id) => {
                self.books_where(|id, _| self.links.contains(&(*author_id, id)))
            }
        }
    }
}

/// Catalog held in process memory.
///
/// A transaction takes the exclusive lock for its whole lifetime and mutates a
/// private copy of the catalog, which replaces the shared one on commit.
/// Read-only transactions share the lock and read the committed catalog in
/// place, so they never see a transaction that is still running.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<CatalogState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().write_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            committed: false,
        }))
    }

    async fn read(&self) -> AppResult<Box<dyn StoreTransaction>> {
        let state = self.state.clone().read_owned().await;
        Ok(Box::new(MemorySnapshot { state }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedRwLockWriteGuard<CatalogState>,
    working: CatalogState,
    committed: bool,
}

impl MemoryTransaction {
    fn state(&self) -> AppResult<&CatalogState> {
        if self.committed {
            return Err(AppError::Internal("transaction already committed".to_string()));
        }
        Ok(&self.working)
    }

    fn state_mut(&mut self) -> AppResult<&mut CatalogState> {
        if self.committed {
            return Err(AppError::Internal("transaction already committed".to_string()));
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get_author(&mut self, id: AuthorId) -> AppResult<Option<Author>> {
        Ok(self.state()?.author(id))
    }

    async fn list_authors(&mut self) -> AppResult<Vec<Author>> {
        Ok(self.state()?.authors_where(|_, _| true))
    }

    async fn find_authors(&mut self, filter: &AuthorFilter) -> AppResult<Vec<Author>> {
        Ok(self.state()?.find_authors(filter))
    }

    async fn save_author(&mut self, record: AuthorRecord) -> AppResult<Author> {
        let state = self.state_mut()?;
        let now = Utc::now();
        let id = match record.id {
            Some(id) => id,
            None => state.last_author_id + 1,
        };
        state.last_author_id = state.last_author_id.max(id);

        state
            .authors
            .entry(id)
            .and_modify(|row| {
                row.full_name = record.full_name.clone();
                row.updated_at = now;
            })
            .or_insert_with(|| AuthorRow {
                full_name: record.full_name.clone(),
                created_at: now,
                updated_at: now,
            });

        state
            .author(id)
            .ok_or_else(|| AppError::Internal(format!("author {} vanished after save", id)))
    }

    async fn delete_author(&mut self, id: AuthorId) -> AppResult<bool> {
        let state = self.state_mut()?;
        if state.authors.remove(&id).is_none() {
            return Ok(false);
        }
        state.links.retain(|(author_id, _)| *author_id != id);
        Ok(true)
    }

    async fn get_book(&mut self, id: BookId) -> AppResult<Option<Book>> {
        Ok(self.state()?.book(id))
    }

    async fn list_books(&mut self) -> AppResult<Vec<Book>> {
        Ok(self.state()?.books_where(|_, _| true))
    }

    async fn find_books(&mut self, filter: &BookFilter) -> AppResult<Vec<Book>> {
        Ok(self.state()?.find_books(filter))
    }

    async fn save_book(&mut self, record: BookRecord) -> AppResult<Book> {
        let state = self.state_mut()?;
        let now = Utc::now();
        let id = match record.id {
            Some(id) => id,
            None => state.last_book_id + 1,
        };
        state.last_book_id = state.last_book_id.max(id);

        let created_at = state.books.get(&id).map_or(now, |row| row.created_at);
        state.books.insert(
            id,
            BookRow {
                title: record.title,
                isbn: record.isbn,
                year: record.year,
                publisher: record.publisher,
                language: record.language,
                created_at,
                updated_at: now,
            },
        );

        state
            .book(id)
            .ok_or_else(|| AppError::Internal(format!("book {} vanished after save", id)))
    }

    async fn delete_book(&mut self, id: BookId) -> AppResult<bool> {
        let state = self.state_mut()?;
        if state.books.remove(&id).is_none() {
            return Ok(false);
        }
        state.links.retain(|(_, book_id)| *book_id != id);
        Ok(true)
    }

    async fn link(&mut self, author_id: AuthorId, book_id: BookId) -> AppResult<bool> {
        let state = self.state_mut()?;
        if !state.authors.contains_key(&author_id) || !state.books.contains_key(&book_id) {
            return Err(AppError::InconsistentState(format!(
                "cannot link author {} to book {}: missing entity",
                author_id, book_id
            )));
        }
        Ok(state.links.insert((author_id, book_id)))
    }

    async fn unlink(&mut self, author_id: AuthorId, book_id: BookId) -> AppResult<bool> {
        Ok(self.state_mut()?.links.remove(&(author_id, book_id)))
    }

    async fn commit(&mut self) -> AppResult<()> {
        let working = std::mem::take(self.state_mut()?);
        *self.guard = working;
        self.committed = true;
        Ok(())
    }
}

/// Read-only view of the committed catalog, holding the shared lock
pub struct MemorySnapshot {
    state: OwnedRwLockReadGuard<CatalogState>,
}

fn read_only<T>() -> AppResult<T> {
    Err(AppError::Internal("read-only transaction".to_string()))
}

#[async_trait]
impl StoreTransaction for MemorySnapshot {
    async fn get_author(&mut self, id: AuthorId) -> AppResult<Option<Author>> {
        Ok(self.state.author(id))
    }

    async fn list_authors(&mut self) -> AppResult<Vec<Author>> {
        Ok(self.state.authors_where(|_, _| true))
    }

    async fn find_authors(&mut self, filter: &AuthorFilter) -> AppResult<Vec<Author>> {
        Ok(self.state.find_authors(filter))
    }

    async fn save_author(&mut self, _record: AuthorRecord) -> AppResult<Author> {
        read_only()
    }

    async fn delete_author(&mut self, _id: AuthorId) -> AppResult<bool> {
        read_only()
    }

    async fn get_book(&mut self, id: BookId) -> AppResult<Option<Book>> {
        Ok(self.state.book(id))
    }

    async fn list_books(&mut self) -> AppResult<Vec<Book>> {
        Ok(self.state.books_where(|_, _| true))
    }

    async fn find_books(&mut self, filter: &BookFilter) -> AppResult<Vec<Book>> {
        Ok(self.state.find_books(filter))
    }

    async fn save_book(&mut self, _record: BookRecord) -> AppResult<Book> {
        read_only()
    }

    async fn delete_book(&mut self, _id: BookId) -> AppResult<bool> {
        read_only()
    }

    async fn link(&mut self, _author_id: AuthorId, _book_id: BookId) -> AppResult<bool> {
        read_only()
    }

    async fn unlink(&mut self, _author_id: AuthorId, _book_id: BookId) -> AppResult<bool> {
        read_only()
    }

    async fn commit(&mut self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn author(name: &str) -> AuthorRecord {
        AuthorRecord {
            id: None,
            full_name: name.to_string(),
        }
    }

    fn book(title: &str) -> BookRecord {
        BookRecord {
            id: None,
            title: title.to_string(),
            isbn: 9782070409228,
            year: 1862,
            publisher: "Gallimard".to_string(),
            language: "fr".to_string(),
        }
    }

    #[tokio::test]
    async fn test_links_are_visible_from_both_sides() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let hugo = tx.save_author(author("Victor Hugo")).await.unwrap();
        let novel = tx.save_book(book("Les Misérables")).await.unwrap();
        assert!(tx.link(hugo.id, novel.id).await.unwrap());
        assert!(!tx.link(hugo.id, novel.id).await.unwrap());

        let hugo = tx.get_author(hugo.id).await.unwrap().unwrap();
        let novel = tx.get_book(novel.id).await.unwrap().unwrap();
        assert_eq!(hugo.books, vec![novel.id]);
        assert_eq!(novel.authors, vec![hugo.id]);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.save_author(author("Emile Zola")).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_authors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let zola = tx.save_author(author("Emile Zola")).await.unwrap();
        tx.commit().await.unwrap();
        assert!(tx.get_author(zola.id).await.is_err());
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.get_author(zola.id).await.unwrap().unwrap().full_name, "Emile Zola");
    }

    #[tokio::test]
    async fn test_delete_book_removes_its_links() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let zola = tx.save_author(author("Emile Zola")).await.unwrap();
        let germinal = tx.save_book(book("Germinal")).await.unwrap();
        tx.link(zola.id, germinal.id).await.unwrap();

        assert!(tx.delete_book(germinal.id).await.unwrap());
        assert!(!tx.delete_book(germinal.id).await.unwrap());
        assert!(tx.get_author(zola.id).await.unwrap().unwrap().books.is_empty());
    }

    #[tokio::test]
    async fn test_find_books_by_author_and_title() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let zola = tx.save_author(author("Emile Zola")).await.unwrap();
        let hugo = tx.save_author(author("Victor Hugo")).await.unwrap();
        let germinal = tx.save_book(book("Germinal")).await.unwrap();
        let nana = tx.save_book(book("Nana")).await.unwrap();
        let notre_dame = tx.save_book(book("Notre-Dame de Paris")).await.unwrap();
        tx.link(zola.id, germinal.id).await.unwrap();
        tx.link(zola.id, nana.id).await.unwrap();
        tx.link(hugo.id, notre_dame.id).await.unwrap();

        let by_zola = tx.find_books(&BookFilter::ByAuthor(zola.id)).await.unwrap();
        assert_eq!(
            by_zola.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![germinal.id, nana.id]
        );

        let titled = tx
            .find_books(&BookFilter::TitleContains("NA".to_string()))
            .await
            .unwrap();
        assert_eq!(
            titled.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![germinal.id, nana.id]
        );
    }

    #[tokio::test]
    async fn test_link_to_missing_book_is_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let zola = tx.save_author(author("Emile Zola")).await.unwrap();
        let err = tx.link(zola.id, 42).await.unwrap_err();
        assert!(matches!(err, AppError::InconsistentState(_)));
    }

    #[tokio::test]
    async fn test_readers_share_the_committed_state() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let zola = tx.save_author(author("Emile Zola")).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let mut first = store.read().await.unwrap();
        let mut second = tokio::time::timeout(Duration::from_secs(1), store.read())
            .await
            .expect("second reader blocked by the first")
            .unwrap();
        assert_eq!(first.list_authors().await.unwrap().len(), 1);
        assert_eq!(
            second.get_author(zola.id).await.unwrap().unwrap().full_name,
            "Emile Zola"
        );

        let writer = tokio::time::timeout(Duration::from_millis(50), store.begin()).await;
        assert!(writer.is_err(), "writer must wait for open readers");
    }

    #[tokio::test]
    async fn test_reader_rejects_mutations() {
        let store = MemoryStore::new();
        let mut snapshot = store.read().await.unwrap();
        assert!(matches!(
            snapshot.save_author(author("Emile Zola")).await.unwrap_err(),
            AppError::Internal(_)
        ));
        assert!(snapshot.link(1, 1).await.is_err());
        snapshot.commit().await.unwrap();
        drop(snapshot);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_authors().await.unwrap().is_empty());
    }
}
