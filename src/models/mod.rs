//! Data models for the catalog

pub mod author;
pub mod book;

// Re-export commonly used types
pub use author::{Author, AuthorFilter, AuthorId, AuthorRecord};
pub use book::{Book, BookDraft, BookFilter, BookId, BookRecord, BookUpdate};
