//! Catalog registry: books and the author <-> book association

use std::collections::BTreeSet;

use crate::{
    config::CatalogConfig,
    error::{AppError, AppResult},
    models::{Author, AuthorId, Book, BookDraft, BookFilter, BookId, BookRecord, BookUpdate},
    repository::{EntityStoreArc, StoreTransaction},
    services::{require_author, require_book, validation},
};

/// What happened to an author's books when the author was released from them
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Release {
    /// Co-authored books the author was detached from
    pub detached: Vec<BookId>,
    /// Books the author wrote alone, deleted with the author
    pub deleted: Vec<BookId>,
}

/// Detach `author` from all of its books inside `tx`.
///
/// Books with other authors survive without this one; books left authorless
/// are deleted. Nothing is committed here.
pub(crate) async fn release_author(
    tx: &mut dyn StoreTransaction,
    author: &Author,
) -> AppResult<Release> {
    let mut release = Release::default();

    for &book_id in &author.books {
        let book = tx.get_book(book_id).await?.ok_or_else(|| {
            AppError::InconsistentState(format!(
                "author {} is linked to missing book {}",
                author.id, book_id
            ))
        })?;

        if !book.authors.contains(&author.id) {
            return Err(AppError::InconsistentState(format!(
                "book {} does not list author {} back",
                book_id, author.id
            )));
        }

        if book.authors.len() > 1 {
            tx.unlink(author.id, book_id).await?;
            tracing::debug!("Detached author {} from book {}", author.id, book_id);
            release.detached.push(book_id);
        } else {
            tx.delete_book(book_id).await?;
            tracing::debug!("Deleted book {} with its sole author {}", book_id, author.id);
            release.deleted.push(book_id);
        }
    }

    Ok(release)
}

#[derive(Clone)]
pub struct CatalogRegistry {
    store: EntityStoreArc,
    max_authors_per_book: usize,
}

impl CatalogRegistry {
    pub fn new(store: EntityStoreArc, config: &CatalogConfig) -> Self {
        Self {
            store,
            max_authors_per_book: config.max_authors_per_book,
        }
    }

    /// All books
    pub async fn list(&self) -> AppResult<Vec<Book>> {
        let mut tx = self.store.read().await?;
        tx.list_books().await
    }

    /// Books whose title contains `query`, ignoring case
    pub async fn find_by_title(&self, query: &str) -> AppResult<Vec<Book>> {
        let mut tx = self.store.read().await?;
        tx.find_books(&BookFilter::TitleContains(query.to_string())).await
    }

    pub async fn get(&self, id: BookId) -> AppResult<Book> {
        let mut tx = self.store.read().await?;
        require_book(tx.as_mut(), id).await
    }

    /// Create a book written by `author_id`
    pub async fn create(&self, author_id: AuthorId, draft: BookDraft) -> AppResult<Book> {
        let mut tx = self.store.begin().await?;
        require_author(tx.as_mut(), author_id).await?;
        validation::validate_book(&draft.title, draft.isbn, draft.year)?;

        let book = tx.save_book(BookRecord::from(draft)).await?;
        tx.link(author_id, book.id).await?;
        let book = require_book(tx.as_mut(), book.id).await?;
        tx.commit().await?;

        tracing::info!("Catalog create: book id={} by author id={}", book.id, author_id);
        Ok(book)
    }

    /// Replace every field of a book, its author set included.
    ///
    /// `data.id` must equal `id`. Create-time validation applies again, and the
    /// new author set must be non-empty, within the cap, and reference existing
    /// authors.
    pub async fn update(&self, id: BookId, data: BookUpdate) -> AppResult<Book> {
        let authors: BTreeSet<AuthorId> = data.authors.iter().copied().collect();

        let mut tx = self.store.begin().await?;
        // authors before the book, ascending
        for &author_id in &authors {
            require_author(tx.as_mut(), author_id).await?;
        }
        let current = require_book(tx.as_mut(), id).await?;

        if data.id != id {
            return Err(AppError::InvalidInput(format!(
                "Book id {} in payload does not match target id {}",
                data.id, id
            )));
        }
        validation::validate_book(&data.title, data.isbn, data.year)?;

        if authors.is_empty() {
            return Err(AppError::InvalidInput(
                "A book must have at least one author".to_string(),
            ));
        }
        if authors.len() > self.max_authors_per_book {
            return Err(AppError::TooManyAuthors {
                book_id: id,
                cap: self.max_authors_per_book,
            });
        }

        tx.save_book(BookRecord::from(&data)).await?;
        for &author_id in current.authors.iter().filter(|a| !authors.contains(*a)) {
            tx.unlink(author_id, id).await?;
        }
        for &author_id in &authors {
            tx.link(author_id, id).await?;
        }

        let book = require_book(tx.as_mut(), id).await?;
        if book.authors.is_empty() {
            return Err(AppError::InconsistentState(format!(
                "book {} lost all of its authors during update",
                id
            )));
        }
        tx.commit().await?;

        tracing::info!("Catalog update: book id={}", id);
        Ok(book)
    }

    /// Delete a book and detach it from all of its authors
    pub async fn delete(&self, id: BookId) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_book(id).await? {
            return Err(AppError::book_not_found(id));
        }
        tx.commit().await?;

        tracing::info!("Catalog delete: book id={}", id);
        Ok(())
    }

    /// Add an existing author to a book.
    ///
    /// Adding an author already on the book changes nothing. A book holding the
    /// maximum number of authors rejects any newcomer with `TooManyAuthors`.
    pub async fn add_author(&self, book_id: BookId, author_id: AuthorId) -> AppResult<Book> {
        let mut tx = self.store.begin().await?;
        require_author(tx.as_mut(), author_id).await?;
        let book = require_book(tx.as_mut(), book_id).await?;

        if book.authors.contains(&author_id) {
            return Ok(book);
        }
        if book.authors.len() >= self.max_authors_per_book {
            return Err(AppError::TooManyAuthors {
                book_id,
                cap: self.max_authors_per_book,
            });
        }

        tx.link(author_id, book_id).await?;
        let book = require_book(tx.as_mut(), book_id).await?;
        tx.commit().await?;

        tracing::info!("Catalog: author id={} added to book id={}", author_id, book_id);
        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use mockall::{predicate::eq, Sequence};

    use super::*;
    use crate::{
        repository::{MemoryStore, MockEntityStore, MockStoreTransaction},
        services::{authors::AuthorRegistry, Services},
    };

    const ISBN: i64 = 9_782_070_409_228;

    fn services() -> Services {
        Services::new(Arc::new(MemoryStore::new()), &CatalogConfig::default())
    }

    fn draft(title: &str) -> BookDraft {
        BookDraft {
            title: title.to_string(),
            isbn: ISBN,
            year: 1885,
            publisher: "Gallimard".to_string(),
            language: "fr".to_string(),
        }
    }

    async fn author(authors: &AuthorRegistry, name: &str) -> AuthorId {
        authors.create(name).await.unwrap().id
    }

    #[tokio::test]
    async fn test_create_links_requesting_author() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;

        let book = s.catalog.create(zola, draft("Germinal")).await.unwrap();
        assert_eq!(book.authors, vec![zola]);
        assert_eq!(book.title, "Germinal");
        assert_eq!(s.authors.get(zola).await.unwrap().books, vec![book.id]);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_isbn() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;

        for isbn in [978_207_040_922, 97_820_704_092_281] {
            let mut bad = draft("Germinal");
            bad.isbn = isbn;
            let err = s.catalog.create(zola, bad).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "isbn {}", isbn);
        }
        assert!(s.catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title_and_long_year() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;

        let err = s.catalog.create(zola, draft("   ")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let mut bad = draft("Germinal");
        bad.year = 18850;
        let err = s.catalog.create(zola, bad).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_create_for_unknown_author() {
        let s = services();
        let err = s.catalog.create(7, draft("Germinal")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_find_by_title() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;
        s.catalog.create(zola, draft("Germinal")).await.unwrap();
        s.catalog.create(zola, draft("L'Assommoir")).await.unwrap();

        let found = s.catalog.find_by_title("germ").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Germinal");
    }

    #[tokio::test]
    async fn test_add_author_up_to_cap() {
        let s = services();
        let a = author(&s.authors, "Goscinny").await;
        let b = author(&s.authors, "Uderzo").await;
        let c = author(&s.authors, "Ferri").await;
        let d = author(&s.authors, "Conrad").await;
        let book = s.catalog.create(a, draft("Astérix le Gaulois")).await.unwrap();

        s.catalog.add_author(book.id, b).await.unwrap();
        let book = s.catalog.add_author(book.id, c).await.unwrap();
        assert_eq!(book.authors, vec![a, b, c]);

        let err = s.catalog.add_author(book.id, d).await.unwrap_err();
        assert!(matches!(err, AppError::TooManyAuthors { cap: 3, .. }));
        assert_eq!(s.catalog.get(book.id).await.unwrap().authors, vec![a, b, c]);
        assert!(s.authors.get(d).await.unwrap().books.is_empty());
    }

    #[tokio::test]
    async fn test_add_existing_author_is_noop() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;
        let book = s.catalog.create(zola, draft("Germinal")).await.unwrap();

        let again = s.catalog.add_author(book.id, zola).await.unwrap();
        assert_eq!(again.authors, vec![zola]);
    }

    #[tokio::test]
    async fn test_add_author_unknown_ids() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;
        let book = s.catalog.create(zola, draft("Germinal")).await.unwrap();

        assert!(matches!(
            s.catalog.add_author(book.id + 1, zola).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            s.catalog.add_author(book.id, zola + 1).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_update_round_trip() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;
        let hugo = author(&s.authors, "Victor Hugo").await;
        let book = s.catalog.create(zola, draft("Germinal")).await.unwrap();

        let data = BookUpdate {
            id: book.id,
            title: "Les Misérables".to_string(),
            isbn: 9_782_253_096_344,
            year: 1862,
            publisher: "Le Livre de Poche".to_string(),
            language: "french".to_string(),
            authors: vec![hugo],
        };
        s.catalog.update(book.id, data.clone()).await.unwrap();

        let stored = s.catalog.get(book.id).await.unwrap();
        assert_eq!(stored.title, data.title);
        assert_eq!(stored.isbn, data.isbn);
        assert_eq!(stored.year, data.year);
        assert_eq!(stored.publisher, data.publisher);
        assert_eq!(stored.language, data.language);
        assert_eq!(stored.authors, vec![hugo]);
        assert!(s.authors.get(zola).await.unwrap().books.is_empty());
        assert_eq!(s.authors.get(hugo).await.unwrap().books, vec![book.id]);
    }

    #[tokio::test]
    async fn test_update_with_mismatched_id_changes_nothing() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;
        let book = s.catalog.create(zola, draft("Germinal")).await.unwrap();

        let data = BookUpdate {
            id: book.id + 1,
            title: "Nana".to_string(),
            isbn: ISBN,
            year: 1880,
            publisher: String::new(),
            language: String::new(),
            authors: vec![zola],
        };
        let err = s.catalog.update(book.id, data).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(s.catalog.get(book.id).await.unwrap(), book);
    }

    #[tokio::test]
    async fn test_update_rejects_empty_or_oversized_author_set() {
        let s = services();
        let ids = [
            author(&s.authors, "A").await,
            author(&s.authors, "B").await,
            author(&s.authors, "C").await,
            author(&s.authors, "D").await,
        ];
        let book = s.catalog.create(ids[0], draft("Germinal")).await.unwrap();
        let data = |authors: Vec<AuthorId>| BookUpdate {
            id: book.id,
            title: "Germinal".to_string(),
            isbn: ISBN,
            year: 1885,
            publisher: String::new(),
            language: String::new(),
            authors,
        };

        assert!(matches!(
            s.catalog.update(book.id, data(vec![])).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));
        assert!(matches!(
            s.catalog.update(book.id, data(ids.to_vec())).await.unwrap_err(),
            AppError::TooManyAuthors { .. }
        ));
        assert!(matches!(
            s.catalog.update(book.id, data(vec![ids[0], 99])).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert_eq!(s.catalog.get(book.id).await.unwrap().authors, vec![ids[0]]);
    }

    #[tokio::test]
    async fn test_update_unknown_book() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;
        let data = BookUpdate {
            id: 5,
            title: "Germinal".to_string(),
            isbn: ISBN,
            year: 1885,
            publisher: String::new(),
            language: String::new(),
            authors: vec![zola],
        };
        assert!(matches!(
            s.catalog.update(5, data).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_detaches_authors() {
        let s = services();
        let zola = author(&s.authors, "Emile Zola").await;
        let book = s.catalog.create(zola, draft("Germinal")).await.unwrap();

        s.catalog.delete(book.id).await.unwrap();
        assert!(matches!(
            s.catalog.get(book.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(s.authors.get(zola).await.unwrap().books.is_empty());
        assert!(matches!(
            s.catalog.delete(book.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    fn stored_author(id: AuthorId, books: Vec<BookId>) -> Author {
        Author {
            id,
            full_name: format!("Author {}", id),
            books,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn stored_book(id: BookId, authors: Vec<AuthorId>) -> Book {
        Book {
            id,
            title: format!("Book {}", id),
            isbn: ISBN,
            year: 1900,
            publisher: String::new(),
            language: String::new(),
            authors,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn registry_over(tx: MockStoreTransaction) -> CatalogRegistry {
        let tx: Box<dyn StoreTransaction> = Box::new(tx);
        let mut store = MockEntityStore::new();
        store.expect_begin().return_once(move || Ok(tx));
        CatalogRegistry::new(Arc::new(store), &CatalogConfig::default())
    }

    #[tokio::test]
    async fn test_add_author_locks_author_before_book() {
        let mut seq = Sequence::new();
        let mut tx = MockStoreTransaction::new();
        tx.expect_get_author()
            .with(eq(2))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(Some(stored_author(id, vec![10]))));
        tx.expect_get_book()
            .with(eq(10))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(Some(stored_book(id, vec![1, 2]))));
        tx.expect_link().never();
        tx.expect_commit().never();

        let book = registry_over(tx).add_author(10, 2).await.unwrap();
        assert_eq!(book.authors, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_update_locks_authors_in_order_before_book() {
        let mut seq = Sequence::new();
        let mut tx = MockStoreTransaction::new();
        for author_id in [1, 2] {
            tx.expect_get_author()
                .with(eq(author_id))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|id| Ok(Some(stored_author(id, vec![]))));
        }
        tx.expect_get_book()
            .with(eq(10))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(Some(stored_book(id, vec![1]))));
        tx.expect_save_book().never();
        tx.expect_commit().never();

        let data = BookUpdate {
            id: 11,
            title: "Germinal".to_string(),
            isbn: ISBN,
            year: 1885,
            publisher: String::new(),
            language: String::new(),
            authors: vec![2, 1],
        };
        let err = registry_over(tx).update(10, data).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
