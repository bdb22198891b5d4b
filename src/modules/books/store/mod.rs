//! Document store seam for the catalog.

pub mod memory;
pub mod mongo;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use thiserror::Error;

use super::models::{Book, BookPatch, BookView, OrderedGroup};
use super::query::{Filter, SortKey};

pub use memory::InMemoryBookStore;
pub use mongo::MongoBookStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("'{0}' is not a valid id")]
    InvalidId(String),

    #[error("a book with this {field} already exists")]
    Duplicate { field: &'static str },

    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),

    #[error("malformed document: {0}")]
    Decode(#[from] mongodb::bson::de::Error),

    #[error("cannot encode document: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),
}

/// The ways a single book can be looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookKey {
    /// Store-assigned id
    Id(String),
    /// Catalog number
    BookId(String),
    Slug(String),
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookKey::Id(id) => write!(f, "id: {id}"),
            BookKey::BookId(book_id) => write!(f, "bookId: {book_id}"),
            BookKey::Slug(slug) => write!(f, "slug: {slug}"),
        }
    }
}

/// Storage operations the catalog service needs. Every read that returns
/// [`BookView`] expands author, publisher and genres.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Books matching `filter`, sorted, then `skip`/`limit` applied.
    /// `limit: None` returns everything after `skip`.
    async fn find(
        &self,
        filter: &Filter,
        sort: &[SortKey],
        skip: u64,
        limit: Option<u64>,
    ) -> StoreResult<Vec<BookView>>;

    async fn count(&self, filter: &Filter) -> StoreResult<u64>;

    async fn find_one(&self, key: &BookKey) -> StoreResult<Option<BookView>>;

    /// The stored record without expansion.
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Book>>;

    /// Distinct order-line product ids equal to `book_id`.
    async fn ordered_groups(&self, book_id: &str) -> StoreResult<Vec<OrderedGroup>>;

    async fn insert(&self, book: Book) -> StoreResult<Book>;

    /// Apply `patch` and stamp `updated_at`; returns the updated record.
    async fn update(
        &self,
        id: &str,
        patch: &BookPatch,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Book>>;

    /// Remove the book and return what was removed.
    async fn delete(&self, id: &str) -> StoreResult<Option<Book>>;
}

pub(crate) fn parse_object_id(id: &str) -> StoreResult<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

/// Lower-case hex form of a valid id, as the database returns it.
pub(crate) fn canonical_id(id: &str) -> StoreResult<String> {
    Ok(parse_object_id(id)?.to_hex())
}
