//! PostgreSQL entity store.
//!
//! In a read-write transaction, rows fetched by id are locked `FOR UPDATE`, so
//! two transactions touching the same author or book run one after the other.
//!
//! Lock order: every caller locks author rows before book rows, and rows of one
//! kind by ascending id. A transaction that already holds a book row never
//! waits on an author row, which keeps `add_author` and `update` from
//! deadlocking against a cascading author delete.
//!
//! Read-only transactions run `REPEATABLE READ, READ ONLY` and take no row
//! locks. All of their statements see one snapshot, so a book list never mixes
//! rows from before a cascade with links from after it.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::{Author, AuthorFilter, AuthorId, AuthorRecord, Book, BookFilter, BookId, BookRecord},
    repository::{EntityStore, StoreTransaction},
};

const AUTHOR_COLUMNS: &str = "id, full_name, created_at, updated_at";
const BOOK_COLUMNS: &str =
    "id, title, isbn, year, publisher, language, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction {
            tx: Some(tx),
            lock_rows: true,
        }))
    }

    async fn read(&self) -> AppResult<Box<dyn StoreTransaction>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTransaction {
            tx: Some(tx),
            lock_rows: false,
        }))
    }
}

pub struct PgTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    lock_rows: bool,
}

impl PgTransaction {
    fn conn(&mut self) -> AppResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal("transaction already committed".to_string()))
    }

    fn lock_clause(&self) -> &'static str {
        if self.lock_rows {
            " FOR UPDATE"
        } else {
            ""
        }
    }
}

/// Load link pairs for the given ids, grouped by `key_column`
async fn links_by(
    conn: &mut PgConnection,
    key_column: &str,
    ids: &[i64],
) -> AppResult<HashMap<i64, Vec<i64>>> {
    let value_column = if key_column == "author_id" { "book_id" } else { "author_id" };
    let query = format!(
        "SELECT {key_column}, {value_column} FROM book_authors \
         WHERE {key_column} = ANY($1) ORDER BY {value_column}"
    );
    let rows: Vec<(i64, i64)> = sqlx::query_as(&query)
        .bind(ids.to_vec())
        .fetch_all(conn)
        .await?;

    let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
    for (key, value) in rows {
        grouped.entry(key).or_default().push(value);
    }
    Ok(grouped)
}

async fn with_books(conn: &mut PgConnection, mut authors: Vec<Author>) -> AppResult<Vec<Author>> {
    let ids: Vec<AuthorId> = authors.iter().map(|a| a.id).collect();
    let mut links = links_by(conn, "author_id", &ids).await?;
    for author in &mut authors {
        author.books = links.remove(&author.id).unwrap_or_default();
    }
    Ok(authors)
}

async fn with_authors(conn: &mut PgConnection, mut books: Vec<Book>) -> AppResult<Vec<Book>> {
    let ids: Vec<BookId> = books.iter().map(|b| b.id).collect();
    let mut links = links_by(conn, "book_id", &ids).await?;
    for book in &mut books {
        book.authors = links.remove(&book.id).unwrap_or_default();
    }
    Ok(books)
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn get_author(&mut self, id: AuthorId) -> AppResult<Option<Author>> {
        let lock = self.lock_clause();
        let conn = self.conn()?;
        let author = sqlx::query_as::<_, Author>(&format!(
            "SELECT {AUTHOR_COLUMNS} FROM authors WHERE id = $1{lock}"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match author {
            Some(author) => Ok(with_books(conn, vec![author]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_authors(&mut self) -> AppResult<Vec<Author>> {
        let conn = self.conn()?;
        let authors = sqlx::query_as::<_, Author>(&format!(
            "SELECT {AUTHOR_COLUMNS} FROM authors ORDER BY id"
        ))
        .fetch_all(&mut *conn)
        .await?;
        with_books(conn, authors).await
    }

    async fn find_authors(&mut self, filter: &AuthorFilter) -> AppResult<Vec<Author>> {
        let conn = self.conn()?;
        let authors = match filter {
            AuthorFilter::NameContains(query) => {
                sqlx::query_as::<_, Author>(&format!(
                    "SELECT {AUTHOR_COLUMNS} FROM authors \
                     WHERE POSITION(LOWER($1) IN LOWER(full_name)) > 0 ORDER BY id"
                ))
                .bind(query)
                .fetch_all(&mut *conn)
                .await?
            }
        };
        with_books(conn, authors).await
    }

    async fn save_author(&mut self, record: AuthorRecord) -> AppResult<Author> {
        let conn = self.conn()?;
        let author = match record.id {
            None => {
                sqlx::query_as::<_, Author>(&format!(
                    "INSERT INTO authors (full_name) VALUES ($1) RETURNING {AUTHOR_COLUMNS}"
                ))
                .bind(&record.full_name)
                .fetch_one(&mut *conn)
                .await?
            }
            Some(id) => {
                sqlx::query_as::<_, Author>(&format!(
                    r#"
                    INSERT INTO authors (id, full_name) VALUES ($1, $2)
                    ON CONFLICT (id) DO UPDATE
                        SET full_name = EXCLUDED.full_name, updated_at = NOW()
                    RETURNING {AUTHOR_COLUMNS}
                    "#
                ))
                .bind(id)
                .bind(&record.full_name)
                .fetch_one(&mut *conn)
                .await?
            }
        };

        with_books(conn, vec![author])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("author vanished after save".to_string()))
    }

    async fn delete_author(&mut self, id: AuthorId) -> AppResult<bool> {
        // book_authors rows go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(self.conn()?)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_book(&mut self, id: BookId) -> AppResult<Option<Book>> {
        let lock = self.lock_clause();
        let conn = self.conn()?;
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1{lock}"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match book {
            Some(book) => Ok(with_authors(conn, vec![book]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_books(&mut self) -> AppResult<Vec<Book>> {
        let conn = self.conn()?;
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY id"
        ))
        .fetch_all(&mut *conn)
        .await?;
        with_authors(conn, books).await
    }

    async fn find_books(&mut self, filter: &BookFilter) -> AppResult<Vec<Book>> {
        let conn = self.conn()?;
        let books = match filter {
            BookFilter::TitleContains(query) => {
                sqlx::query_as::<_, Book>(&format!(
                    "SELECT {BOOK_COLUMNS} FROM books \
                     WHERE POSITION(LOWER($1) IN LOWER(title)) > 0 ORDER BY id"
                ))
                .bind(query)
                .fetch_all(&mut *conn)
                .await?
            }
            BookFilter::ByAuthor(author_id) => {
                sqlx::query_as::<_, Book>(&format!(
                    "SELECT {BOOK_COLUMNS} FROM books \
                     WHERE id IN (SELECT book_id FROM book_authors WHERE author_id = $1) \
                     ORDER BY id"
                ))
                .bind(author_id)
                .fetch_all(&mut *conn)
                .await?
            }
        };
        with_authors(conn, books).await
    }

    async fn save_book(&mut self, record: BookRecord) -> AppResult<Book> {
        let conn = self.conn()?;
        let book = match record.id {
            None => {
                sqlx::query_as::<_, Book>(&format!(
                    r#"
                    INSERT INTO books (title, isbn, year, publisher, language)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING {BOOK_COLUMNS}
                    "#
                ))
                .bind(&record.title)
                .bind(record.isbn)
                .bind(record.year)
                .bind(&record.publisher)
                .bind(&record.language)
                .fetch_one(&mut *conn)
                .await?
            }
            Some(id) => {
                sqlx::query_as::<_, Book>(&format!(
                    r#"
                    INSERT INTO books (id, title, isbn, year, publisher, language)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (id) DO UPDATE SET
                        title = EXCLUDED.title,
                        isbn = EXCLUDED.isbn,
                        year = EXCLUDED.year,
                        publisher = EXCLUDED.publisher,
                        language = EXCLUDED.language,
                        updated_at = NOW()
                    RETURNING {BOOK_COLUMNS}
                    "#
                ))
                .bind(id)
                .bind(&record.title)
                .bind(record.isbn)
                .bind(record.year)
                .bind(&record.publisher)
                .bind(&record.language)
                .fetch_one(&mut *conn)
                .await?
            }
        };

        with_authors(conn, vec![book])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("book vanished after save".to_string()))
    }

    async fn delete_book(&mut self, id: BookId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(self.conn()?)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn link(&mut self, author_id: AuthorId, book_id: BookId) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO book_authors (author_id, book_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(author_id)
        .bind(book_id)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unlink(&mut self, author_id: AuthorId, book_id: BookId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM book_authors WHERE author_id = $1 AND book_id = $2")
            .bind(author_id)
            .bind(book_id)
            .execute(self.conn()?)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(&mut self) -> AppResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| AppError::Internal("transaction already committed".to_string()))?;
        tx.commit().await?;
        Ok(())
    }
}
