//! Catalog operations on top of a [`BookStore`] and a [`MediaStore`].

use std::sync::Arc;

use bookstore_media::MediaStore;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use thiserror::Error;

use super::models::{Book, BookPatch, BookView, NewBook, OrderedGroup};
use super::query::{total_pages, ListQuery, SearchQuery, SEARCH_RESULT_CAP};
use super::store::{parse_object_id, BookKey, BookStore, StoreError};
use crate::utils::slugify;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("No book found with {0}")]
    NotFound(BookKey),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: u64,
    pub page: u64,
    pub limit: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        total_pages(self.count, self.limit)
    }
}

pub struct CatalogService {
    store: Arc<dyn BookStore>,
    media: Arc<dyn MediaStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn BookStore>, media: Arc<dyn MediaStore>) -> Self {
        Self { store, media }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page<BookView>, CatalogError> {
        let filter = query.filter();
        let (items, count) = tokio::try_join!(
            self.store
                .find(&filter, &query.sort, query.skip(), query.page_limit()),
            self.store.count(&filter),
        )?;

        Ok(Page {
            items,
            count,
            page: query.page,
            limit: query.limit,
        })
    }

    pub async fn get(&self, key: BookKey) -> Result<BookView, CatalogError> {
        let found = self.store.find_one(&key).await?;
        found.ok_or(CatalogError::NotFound(key))
    }

    /// Distinct order-line groupings for `book_id`; empty when never ordered.
    pub async fn check_is_ordered(&self, book_id: &str) -> Result<Vec<OrderedGroup>, CatalogError> {
        Ok(self.store.ordered_groups(book_id).await?)
    }

    /// Books whose name or author name contains the key, at most
    /// [`SEARCH_RESULT_CAP`] of them.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<BookView>, CatalogError> {
        Ok(self
            .store
            .find(&query.filter(), &[], query.skip(), Some(SEARCH_RESULT_CAP))
            .await?)
    }

    pub async fn create(&self, new_book: NewBook) -> Result<Book, CatalogError> {
        let book_id = new_book.book_id.trim();
        if book_id.is_empty() {
            return Err(CatalogError::Invalid("bookId is required".into()));
        }
        let name = new_book.name.trim();
        if name.is_empty() {
            return Err(CatalogError::Invalid("name is required".into()));
        }

        let id = ObjectId::new().to_hex();
        let slug = match new_book.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => self.derive_slug(name, book_id, &id).await?,
        };

        let now = Utc::now();
        let book = Book {
            id,
            book_id: book_id.to_string(),
            slug,
            name: name.to_string(),
            year: new_book.year,
            description: new_book.description,
            pages: new_book.pages,
            size: new_book.size,
            price: new_book.price,
            discount: new_book.discount,
            image_url: new_book.image_url,
            public_id: new_book.public_id,
            author: new_book.author,
            publisher: new_book.publisher,
            genre: new_book.genre,
            created_at: now,
            updated_at: now,
        };

        let created = self.store.insert(book).await?;
        tracing::info!(id = %created.id, book_id = %created.book_id, "book created");
        Ok(created)
    }

    /// Slug from `name`; when another book already uses it, the catalog
    /// number (or the new id) is appended so editions of one title coexist.
    async fn derive_slug(&self, name: &str, book_id: &str, id: &str) -> Result<String, CatalogError> {
        let base = slugify(name);
        if base.is_empty() {
            return Err(CatalogError::Invalid(format!(
                "cannot derive a slug from name '{name}'"
            )));
        }
        if self.store.find_one(&BookKey::Slug(base.clone())).await?.is_none() {
            return Ok(base);
        }

        let suffix = match slugify(book_id) {
            suffix if suffix.is_empty() => id.to_string(),
            suffix => suffix,
        };
        Ok(format!("{base}-{suffix}"))
    }

    /// Apply a partial update. The cover is replaced only when the patch
    /// carries both `imageUrl` and `publicId`; the previous asset is then
    /// deleted from the media service before the record is written.
    pub async fn update_by_id(&self, id: &str, patch: BookPatch) -> Result<Book, CatalogError> {
        let not_found = || CatalogError::NotFound(BookKey::Id(id.to_string()));

        let patch = if patch.replaces_image() {
            // Reject malformed references before the old cover goes.
            check_references(&patch)?;
            let current = self.store.find_by_id(id).await?.ok_or_else(not_found)?;
            match current.cover_asset() {
                Some(previous) if Some(previous) != patch.public_id.as_deref() => {
                    self.discard_asset(previous, id).await;
                }
                _ => {}
            }
            patch
        } else {
            patch.without_image()
        };

        let updated = self
            .store
            .update(id, &patch, Utc::now())
            .await?
            .ok_or_else(not_found)?;
        tracing::info!(id = %updated.id, "book updated");
        Ok(updated)
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<Book, CatalogError> {
        let deleted = self
            .store
            .delete(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(BookKey::Id(id.to_string())))?;
        tracing::info!(id = %deleted.id, "book deleted");

        if let Some(asset) = deleted.cover_asset() {
            self.discard_asset(asset, id).await;
        }
        Ok(deleted)
    }

    /// Best-effort removal of a cover asset. A failure leaves the asset
    /// orphaned and is only logged.
    async fn discard_asset(&self, public_id: &str, book: &str) {
        match self.media.delete_asset(public_id).await {
            Ok(outcome) => {
                tracing::info!(public_id, book, result = %outcome.result, "cover asset deleted");
            }
            Err(error) => {
                tracing::warn!(public_id, book, %error, "cover asset not deleted; left orphaned");
            }
        }
    }
}

fn check_references(patch: &BookPatch) -> Result<(), CatalogError> {
    patch
        .author
        .iter()
        .chain(&patch.publisher)
        .chain(patch.genre.iter().flatten())
        .try_for_each(|id| parse_object_id(id).map(drop))?;
    Ok(())
}
