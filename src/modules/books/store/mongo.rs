//! MongoDB-backed [`BookStore`]. Relation expansion is done with explicit
//! `$lookup` stages so every read returns the same [`BookView`] shape.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};

use super::{parse_object_id, BookKey, BookStore, StoreError, StoreResult};
use crate::modules::books::models::{
    Author, Book, BookPatch, BookView, Genre, OrderedGroup, Publisher,
};
use crate::modules::books::query::{BookField, Filter, Predicate, SortDirection, SortKey};

pub const BOOKS: &str = "books";
pub const AUTHORS: &str = "authors";
pub const PUBLISHERS: &str = "publishers";
pub const GENRES: &str = "genres";
pub const ORDERS: &str = "orders";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    book_id: String,
    slug: String,
    name: String,
    year: Option<i32>,
    description: Option<String>,
    pages: Option<i32>,
    size: Option<String>,
    price: Option<f64>,
    discount: Option<f64>,
    image_url: Option<String>,
    public_id: Option<String>,
    author: Option<ObjectId>,
    publisher: Option<ObjectId>,
    #[serde(default)]
    genre: Vec<ObjectId>,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl BookDocument {
    fn from_book(book: &Book) -> StoreResult<Self> {
        Ok(Self {
            id: parse_object_id(&book.id)?,
            book_id: book.book_id.clone(),
            slug: book.slug.clone(),
            name: book.name.clone(),
            year: book.year,
            description: book.description.clone(),
            pages: book.pages,
            size: book.size.clone(),
            price: book.price,
            discount: book.discount,
            image_url: book.image_url.clone(),
            public_id: book.public_id.clone(),
            author: book.author.as_deref().map(parse_object_id).transpose()?,
            publisher: book.publisher.as_deref().map(parse_object_id).transpose()?,
            genre: object_ids(&book.genre)?,
            created_at: to_bson_date(book.created_at),
            updated_at: to_bson_date(book.updated_at),
        })
    }

    fn into_book(self) -> Book {
        Book {
            id: self.id.to_hex(),
            book_id: self.book_id,
            slug: self.slug,
            name: self.name,
            year: self.year,
            description: self.description,
            pages: self.pages,
            size: self.size,
            price: self.price,
            discount: self.discount,
            image_url: self.image_url,
            public_id: self.public_id,
            author: self.author.map(|id| id.to_hex()),
            publisher: self.publisher.map(|id| id.to_hex()),
            genre: self.genre.iter().map(|id| id.to_hex()).collect(),
            created_at: from_bson_date(self.created_at),
            updated_at: from_bson_date(self.updated_at),
        }
    }
}

/// Expanded author, publisher or genre.
#[derive(Debug, Deserialize)]
struct NamedDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookViewDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    book_id: String,
    slug: String,
    name: String,
    year: Option<i32>,
    description: Option<String>,
    pages: Option<i32>,
    size: Option<String>,
    price: Option<f64>,
    discount: Option<f64>,
    image_url: Option<String>,
    public_id: Option<String>,
    author: Option<NamedDocument>,
    publisher: Option<NamedDocument>,
    #[serde(default)]
    genre: Vec<NamedDocument>,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl From<BookViewDocument> for BookView {
    fn from(document: BookViewDocument) -> Self {
        BookView {
            id: document.id.to_hex(),
            book_id: document.book_id,
            slug: document.slug,
            name: document.name,
            year: document.year,
            description: document.description,
            pages: document.pages,
            size: document.size,
            price: document.price,
            discount: document.discount,
            image_url: document.image_url,
            public_id: document.public_id,
            author: document.author.map(|author| Author {
                id: author.id.to_hex(),
                name: author.name,
            }),
            publisher: document.publisher.map(|publisher| Publisher {
                id: publisher.id.to_hex(),
                name: publisher.name,
            }),
            genre: document
                .genre
                .into_iter()
                .map(|genre| Genre {
                    id: genre.id.to_hex(),
                    name: genre.name,
                })
                .collect(),
            created_at: from_bson_date(document.created_at),
            updated_at: from_bson_date(document.updated_at),
        }
    }
}

fn to_bson_date(value: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(value.timestamp_millis())
}

fn from_bson_date(value: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or_default()
}

fn object_ids(ids: &[String]) -> StoreResult<Vec<ObjectId>> {
    ids.iter().map(|id| parse_object_id(id)).collect()
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Translate a predicate into a MongoDB query document.
pub(crate) fn predicate_document(predicate: &Predicate) -> StoreResult<Document> {
    let mut document = Document::new();
    match predicate {
        Predicate::AnyOf { field, values } => {
            let values: Vec<Bson> = match field {
                BookField::Genre => object_ids(values)?
                    .into_iter()
                    .map(Bson::ObjectId)
                    .collect(),
                BookField::Name | BookField::AuthorName => {
                    values.iter().cloned().map(Bson::String).collect()
                }
            };
            document.insert(field.path(), doc! { "$in": values });
        }
        Predicate::Contains { field, needle } => {
            document.insert(
                field.path(),
                doc! { "$regex": regex::escape(needle), "$options": "i" },
            );
        }
        Predicate::Or(predicates) => {
            let branches = predicates
                .iter()
                .map(predicate_document)
                .collect::<StoreResult<Vec<_>>>()?;
            document.insert("$or", branches);
        }
    }
    Ok(document)
}

pub(crate) fn filter_document(filter: &Filter) -> StoreResult<Document> {
    let mut clauses = filter
        .predicates()
        .iter()
        .map(predicate_document)
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(match clauses.len() {
        0 => Document::new(),
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    })
}

pub(crate) fn sort_document(sort: &[SortKey]) -> Document {
    let mut document = Document::new();
    for key in sort {
        let direction = match key.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        document.insert(key.field.path(), direction);
    }
    document
}

/// `$lookup` of a single reference, unwound so the field holds the document
/// itself (or is removed when the reference dangles).
fn lookup_one(from: &str, field: &str) -> [Document; 2] {
    [
        doc! { "$lookup": { "from": from, "localField": field, "foreignField": "_id", "as": field } },
        doc! { "$unwind": { "path": format!("${field}"), "preserveNullAndEmptyArrays": true } },
    ]
}

fn lookup_many(from: &str, field: &str) -> Document {
    doc! { "$lookup": { "from": from, "localField": field, "foreignField": "_id", "as": field } }
}

/// Build the aggregation for a filtered, sorted, paginated read.
///
/// The author join runs before `$match` when the filter tests the author's
/// name; otherwise every join runs after pagination.
pub(crate) fn find_pipeline(
    filter: &Filter,
    sort: &[SortKey],
    skip: u64,
    limit: Option<u64>,
) -> StoreResult<Vec<Document>> {
    let author_first = filter.references(BookField::AuthorName);
    let mut pipeline = Vec::new();

    if author_first {
        pipeline.extend(lookup_one(AUTHORS, "author"));
    }
    if !filter.is_empty() {
        pipeline.push(doc! { "$match": filter_document(filter)? });
    }
    if !sort.is_empty() {
        pipeline.push(doc! { "$sort": sort_document(sort) });
    }
    if skip > 0 {
        pipeline.push(doc! { "$skip": to_i64(skip) });
    }
    if let Some(limit) = limit {
        pipeline.push(doc! { "$limit": to_i64(limit) });
    }
    if !author_first {
        pipeline.extend(lookup_one(AUTHORS, "author"));
    }
    pipeline.extend(lookup_one(PUBLISHERS, "publisher"));
    pipeline.push(lookup_many(GENRES, "genre"));

    Ok(pipeline)
}

/// The unique field named by a duplicate-key (11000) write error.
fn duplicate_key(error: &mongodb::error::Error) -> Option<&'static str> {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000 => {
            Some(if write_error.message.contains("slug") {
                "slug"
            } else {
                "bookId"
            })
        }
        _ => None,
    }
}

/// Count aggregation for filters that test the author's name, which
/// `count_documents` cannot see without the join.
pub(crate) fn count_pipeline(filter: &Filter) -> StoreResult<Vec<Document>> {
    let mut pipeline = lookup_one(AUTHORS, "author").to_vec();
    pipeline.push(doc! { "$match": filter_document(filter)? });
    pipeline.push(doc! { "$count": "count" });
    Ok(pipeline)
}

fn key_document(key: &BookKey) -> StoreResult<Document> {
    Ok(match key {
        BookKey::Id(id) => doc! { "_id": parse_object_id(id)? },
        BookKey::BookId(book_id) => doc! { "bookId": book_id.as_str() },
        BookKey::Slug(slug) => doc! { "slug": slug.as_str() },
    })
}

pub(crate) fn set_document(patch: &BookPatch, updated_at: DateTime<Utc>) -> StoreResult<Document> {
    let mut set = Document::new();
    if let Some(name) = &patch.name {
        set.insert("name", name.as_str());
    }
    if let Some(year) = patch.year {
        set.insert("year", year);
    }
    if let Some(description) = &patch.description {
        set.insert("description", description.as_str());
    }
    if let Some(pages) = patch.pages {
        set.insert("pages", pages);
    }
    if let Some(size) = &patch.size {
        set.insert("size", size.as_str());
    }
    if let Some(price) = patch.price {
        set.insert("price", price);
    }
    if let Some(discount) = patch.discount {
        set.insert("discount", discount);
    }
    if let Some(image_url) = &patch.image_url {
        set.insert("imageUrl", image_url.as_str());
    }
    if let Some(public_id) = &patch.public_id {
        set.insert("publicId", public_id.as_str());
    }
    if let Some(author) = &patch.author {
        set.insert("author", parse_object_id(author)?);
    }
    if let Some(publisher) = &patch.publisher {
        set.insert("publisher", parse_object_id(publisher)?);
    }
    if let Some(genre) = &patch.genre {
        set.insert("genre", object_ids(genre)?);
    }
    set.insert("updatedAt", to_bson_date(updated_at));
    Ok(set)
}

/// Catalog collections in one MongoDB database.
#[derive(Clone)]
pub struct MongoBookStore {
    books: Collection<BookDocument>,
    orders: Collection<Document>,
}

impl MongoBookStore {
    pub fn new(database: &Database) -> Self {
        Self {
            books: database.collection(BOOKS),
            orders: database.collection(ORDERS),
        }
    }

    async fn aggregate_views(&self, pipeline: Vec<Document>) -> StoreResult<Vec<BookView>> {
        let documents: Vec<Document> = self.books.aggregate(pipeline).await?.try_collect().await?;
        documents
            .into_iter()
            .map(|document| {
                let view: BookViewDocument = bson::from_document(document)?;
                Ok(view.into())
            })
            .collect()
    }
}

#[async_trait]
impl BookStore for MongoBookStore {
    async fn find(
        &self,
        filter: &Filter,
        sort: &[SortKey],
        skip: u64,
        limit: Option<u64>,
    ) -> StoreResult<Vec<BookView>> {
        // `$limit: 0` is rejected by the server.
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        let pipeline = find_pipeline(filter, sort, skip, limit)?;
        tracing::debug!(?pipeline, "book find pipeline");
        self.aggregate_views(pipeline).await
    }

    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        if !filter.references(BookField::AuthorName) {
            return Ok(self.books.count_documents(filter_document(filter)?).await?);
        }

        let pipeline = count_pipeline(filter)?;
        let counted: Vec<Document> = self.books.aggregate(pipeline).await?.try_collect().await?;
        Ok(counted
            .first()
            .and_then(|document| match document.get("count") {
                Some(Bson::Int32(count)) => u64::try_from(*count).ok(),
                Some(Bson::Int64(count)) => u64::try_from(*count).ok(),
                _ => None,
            })
            .unwrap_or(0))
    }

    async fn find_one(&self, key: &BookKey) -> StoreResult<Option<BookView>> {
        let mut pipeline = vec![doc! { "$match": key_document(key)? }, doc! { "$limit": 1 }];
        pipeline.extend(lookup_one(AUTHORS, "author"));
        pipeline.extend(lookup_one(PUBLISHERS, "publisher"));
        pipeline.push(lookup_many(GENRES, "genre"));

        Ok(self.aggregate_views(pipeline).await?.into_iter().next())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Book>> {
        let id = parse_object_id(id)?;
        let found = self.books.find_one(doc! { "_id": id }).await?;
        Ok(found.map(BookDocument::into_book))
    }

    async fn ordered_groups(&self, book_id: &str) -> StoreResult<Vec<OrderedGroup>> {
        let book_id = parse_object_id(book_id)?;
        let pipeline = vec![
            doc! { "$unwind": "$products" },
            doc! { "$group": { "_id": "$products.product" } },
            doc! { "$match": { "_id": book_id } },
        ];

        let groups: Vec<Document> = self.orders.aggregate(pipeline).await?.try_collect().await?;
        Ok(groups
            .iter()
            .filter_map(|group| group.get_object_id("_id").ok())
            .map(|id| OrderedGroup { id: id.to_hex() })
            .collect())
    }

    async fn insert(&self, book: Book) -> StoreResult<Book> {
        let document = BookDocument::from_book(&book)?;
        match self.books.insert_one(&document).await {
            Ok(_) => Ok(book),
            Err(error) => Err(match duplicate_key(&error) {
                Some(field) => StoreError::Duplicate { field },
                None => StoreError::Mongo(error),
            }),
        }
    }

    async fn update(
        &self,
        id: &str,
        patch: &BookPatch,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Book>> {
        let id = parse_object_id(id)?;
        let updated = self
            .books
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": set_document(patch, updated_at)? },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated.map(BookDocument::into_book))
    }

    async fn delete(&self, id: &str) -> StoreResult<Option<Book>> {
        let id = parse_object_id(id)?;
        let deleted = self.books.find_one_and_delete(doc! { "_id": id }).await?;
        Ok(deleted.map(BookDocument::into_book))
    }
}
