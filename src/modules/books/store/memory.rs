//! Process-local [`BookStore`] with the same matching, ordering and id rules
//! as the MongoDB store.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use tokio::sync::RwLock;

use super::{canonical_id, parse_object_id, BookKey, BookStore, StoreError, StoreResult};
use crate::modules::books::models::{
    Author, Book, BookPatch, BookView, Genre, Order, OrderedGroup, Publisher,
};
use crate::modules::books::query::{BookField, Filter, Predicate, SortDirection, SortField, SortKey};

#[derive(Default)]
struct Collections {
    books: Vec<Book>,
    authors: HashMap<String, Author>,
    publishers: HashMap<String, Publisher>,
    genres: HashMap<String, Genre>,
    orders: Vec<Order>,
}

impl Collections {
    fn author_of(&self, book: &Book) -> Option<&Author> {
        book.author.as_ref().and_then(|id| self.authors.get(id))
    }

    fn expand(&self, book: &Book) -> BookView {
        let genre = book
            .genre
            .iter()
            .filter_map(|id| self.genres.get(id).cloned())
            .collect();
        BookView::expand(
            book.clone(),
            self.author_of(book).cloned(),
            book.publisher
                .as_ref()
                .and_then(|id| self.publishers.get(id))
                .cloned(),
            genre,
        )
    }

    fn matching(&self, filter: &Filter) -> Vec<&Book> {
        self.books
            .iter()
            .filter(|book| {
                let author = self.author_of(book);
                filter
                    .predicates()
                    .iter()
                    .all(|predicate| matches(predicate, book, author))
            })
            .collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.books.iter().position(|book| book.id == id)
    }
}

/// In-memory catalog used for local runs and tests.
#[derive(Default)]
pub struct InMemoryBookStore {
    inner: RwLock<Collections>,
}

impl InMemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.inner
            .get_mut()
            .authors
            .insert(author.id.clone(), author);
        self
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.inner
            .get_mut()
            .publishers
            .insert(publisher.id.clone(), publisher);
        self
    }

    pub fn with_genre(mut self, genre: Genre) -> Self {
        self.inner.get_mut().genres.insert(genre.id.clone(), genre);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.inner.get_mut().orders.push(order);
        self
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .map(|pattern| pattern.is_match(haystack))
        .unwrap_or(false)
}

fn matches(predicate: &Predicate, book: &Book, author: Option<&Author>) -> bool {
    match predicate {
        Predicate::AnyOf { field, values } => match field {
            BookField::Name => values.contains(&book.name),
            BookField::Genre => book
                .genre
                .iter()
                .any(|id| values.iter().any(|value| value.eq_ignore_ascii_case(id))),
            BookField::AuthorName => author.is_some_and(|author| values.contains(&author.name)),
        },
        Predicate::Contains { field, needle } => match field {
            BookField::Name => contains_ignore_case(&book.name, needle),
            // Genres are ids; a text match never applies.
            BookField::Genre => false,
            BookField::AuthorName => {
                author.is_some_and(|author| contains_ignore_case(&author.name, needle))
            }
        },
        Predicate::Or(predicates) => predicates
            .iter()
            .any(|predicate| matches(predicate, book, author)),
    }
}

/// Genre filters hold ids; reject malformed ones the way the database does.
fn validate_filter(filter: &Filter) -> StoreResult<()> {
    fn walk(predicate: &Predicate) -> StoreResult<()> {
        match predicate {
            Predicate::AnyOf {
                field: BookField::Genre,
                values,
            } => values.iter().try_for_each(|id| parse_object_id(id).map(drop)),
            Predicate::Or(predicates) => predicates.iter().try_for_each(walk),
            _ => Ok(()),
        }
    }
    filter.predicates().iter().try_for_each(walk)
}

fn validate_references(
    author: Option<&String>,
    publisher: Option<&String>,
    genre: Option<&Vec<String>>,
) -> StoreResult<()> {
    author
        .into_iter()
        .chain(publisher)
        .chain(genre.into_iter().flatten())
        .try_for_each(|id| parse_object_id(id).map(drop))
}

fn compare(a: &Book, b: &Book, sort: &[SortKey]) -> Ordering {
    sort.iter()
        .map(|key| {
            let ordering = match key.field {
                SortField::Price => a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[async_trait]
impl BookStore for InMemoryBookStore {
    async fn find(
        &self,
        filter: &Filter,
        sort: &[SortKey],
        skip: u64,
        limit: Option<u64>,
    ) -> StoreResult<Vec<BookView>> {
        validate_filter(filter)?;
        let collections = self.inner.read().await;

        let mut books = collections.matching(filter);
        books.sort_by(|a, b| compare(a, b, sort));

        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let limit = limit
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(books
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|book| collections.expand(book))
            .collect())
    }

    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        validate_filter(filter)?;
        let collections = self.inner.read().await;
        Ok(collections.matching(filter).len() as u64)
    }

    async fn find_one(&self, key: &BookKey) -> StoreResult<Option<BookView>> {
        let key = match key {
            BookKey::Id(id) => BookKey::Id(canonical_id(id)?),
            other => other.clone(),
        };
        let collections = self.inner.read().await;
        let found = collections.books.iter().find(|book| match &key {
            BookKey::Id(id) => &book.id == id,
            BookKey::BookId(book_id) => &book.book_id == book_id,
            BookKey::Slug(slug) => &book.slug == slug,
        });
        Ok(found.map(|book| collections.expand(book)))
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Book>> {
        let id = canonical_id(id)?;
        let collections = self.inner.read().await;
        Ok(collections.books.iter().find(|book| book.id == id).cloned())
    }

    async fn ordered_groups(&self, book_id: &str) -> StoreResult<Vec<OrderedGroup>> {
        let book_id = canonical_id(book_id)?;
        let collections = self.inner.read().await;
        let ordered = collections
            .orders
            .iter()
            .flat_map(|order| &order.products)
            .any(|line| line.product == book_id);

        Ok(if ordered {
            vec![OrderedGroup {
                id: book_id,
            }]
        } else {
            Vec::new()
        })
    }

    async fn insert(&self, mut book: Book) -> StoreResult<Book> {
        book.id = canonical_id(&book.id)?;
        validate_references(book.author.as_ref(), book.publisher.as_ref(), Some(&book.genre))?;
        book.author = book.author.as_deref().map(canonical_id).transpose()?;
        book.publisher = book.publisher.as_deref().map(canonical_id).transpose()?;
        book.genre = book
            .genre
            .iter()
            .map(|id| canonical_id(id))
            .collect::<StoreResult<_>>()?;

        let mut collections = self.inner.write().await;
        if collections.books.iter().any(|b| b.book_id == book.book_id) {
            return Err(StoreError::Duplicate { field: "bookId" });
        }
        if collections.books.iter().any(|b| b.slug == book.slug) {
            return Err(StoreError::Duplicate { field: "slug" });
        }
        collections.books.push(book.clone());
        Ok(book)
    }

    async fn update(
        &self,
        id: &str,
        patch: &BookPatch,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Book>> {
        let id = canonical_id(id)?;
        validate_references(
            patch.author.as_ref(),
            patch.publisher.as_ref(),
            patch.genre.as_ref(),
        )?;
        let patch = BookPatch {
            author: patch.author.as_deref().map(canonical_id).transpose()?,
            publisher: patch.publisher.as_deref().map(canonical_id).transpose()?,
            genre: patch
                .genre
                .as_ref()
                .map(|genre| genre.iter().map(|id| canonical_id(id)).collect::<StoreResult<Vec<_>>>())
                .transpose()?,
            ..patch.clone()
        };

        let mut collections = self.inner.write().await;
        let Some(index) = collections.position(&id) else {
            return Ok(None);
        };
        let book = &mut collections.books[index];
        patch.apply(book);
        book.updated_at = updated_at;
        Ok(Some(book.clone()))
    }

    async fn delete(&self, id: &str) -> StoreResult<Option<Book>> {
        let id = canonical_id(id)?;
        let mut collections = self.inner.write().await;
        Ok(collections
            .position(&id)
            .map(|index| collections.books.remove(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::OrderLine;
    use chrono::Duration;

    const TOLKIEN: &str = "65f0000000000000000000a1";
    const MALFORMED_GENRE: &str = "65f0000000000000000000g1";
    const SCIFI: &str = "65f0000000000000000000c2";

    fn oid(n: u32) -> String {
        format!("65f0000000000000{:08x}", n)
    }

    fn book(n: u32, name: &str, price: f64, genre: &[&str]) -> Book {
        let created = DateTime::<Utc>::UNIX_EPOCH + Duration::days(i64::from(n));
        Book {
            id: oid(n),
            book_id: format!("B-{n}"),
            slug: format!("book-{n}"),
            name: name.to_string(),
            year: None,
            description: None,
            pages: None,
            size: None,
            price: Some(price),
            discount: None,
            image_url: None,
            public_id: None,
            author: None,
            publisher: None,
            genre: genre.iter().map(|g| g.to_string()).collect(),
            created_at: created,
            updated_at: created,
        }
    }

    async fn seeded() -> InMemoryBookStore {
        let store = InMemoryBookStore::new()
            .with_author(Author {
                id: TOLKIEN.into(),
                name: "J.R.R. Tolkien".into(),
            })
            .with_genre(Genre {
                id: SCIFI.into(),
                name: "Science fiction".into(),
            });

        let mut hobbit = book(1, "The Hobbit", 8.0, &[]);
        hobbit.author = Some(TOLKIEN.into());
        store.insert(hobbit).await.unwrap();
        store.insert(book(2, "Dune", 12.0, &[SCIFI])).await.unwrap();
        store.insert(book(3, "Hyperion", 10.0, &[SCIFI])).await.unwrap();
        store
    }

    #[tokio::test]
    async fn sorts_by_price_then_paginates() {
        let store = seeded().await;
        let sort = [SortKey {
            field: SortField::Price,
            direction: SortDirection::Desc,
        }];

        let page = store.find(&Filter::new(), &sort, 1, Some(1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "Hyperion");
    }

    #[tokio::test]
    async fn genre_filter_expands_genres() {
        let store = seeded().await;
        let filter = Filter::new().and(Predicate::AnyOf {
            field: BookField::Genre,
            values: vec![SCIFI.into()],
        });

        let books = store.find(&filter, &[], 0, None).await.unwrap();
        assert_eq!(books.len(), 2);
        assert!(books.iter().all(|b| b.genre[0].name == "Science fiction"));
        assert_eq!(store.count(&filter).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn malformed_genre_id_is_an_error() {
        let store = seeded().await;
        let filter = Filter::new().and(Predicate::AnyOf {
            field: BookField::Genre,
            values: vec![MALFORMED_GENRE.into()],
        });
        assert!(matches!(
            store.count(&filter).await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn author_name_match_uses_join() {
        let store = seeded().await;
        let filter = Filter::new().and(Predicate::Contains {
            field: BookField::AuthorName,
            needle: "TOLKIEN".into(),
        });

        let books = store.find(&filter, &[], 0, None).await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].author.as_ref().unwrap().id, TOLKIEN);
    }

    #[tokio::test]
    async fn regex_metacharacters_are_literal() {
        let store = seeded().await;
        let filter = Filter::new().and(Predicate::Contains {
            field: BookField::Name,
            needle: ".*".into(),
        });
        assert_eq!(store.count(&filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let store = seeded().await;
        let mut clash = book(9, "Dune again", 1.0, &[]);
        clash.slug = "book-2".into();
        assert!(matches!(
            store.insert(clash).await,
            Err(StoreError::Duplicate { field: "slug" })
        ));
    }

    #[tokio::test]
    async fn ordered_groups_are_distinct() {
        let dune = oid(2);
        let line = OrderLine {
            product: dune.clone(),
            quantity: Some(1),
        };
        let store = InMemoryBookStore::new()
            .with_order(Order {
                id: oid(100),
                products: vec![line.clone()],
            })
            .with_order(Order {
                id: oid(101),
                products: vec![line],
            });

        let groups = store.ordered_groups(&dune).await.unwrap();
        assert_eq!(groups, vec![OrderedGroup { id: dune }]);
        assert!(store.ordered_groups(&oid(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_books() {
        let store = seeded().await;
        let patch = BookPatch {
            price: Some(1.0),
            ..BookPatch::default()
        };
        assert!(store
            .update(&oid(42), &patch, Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(store.delete(&oid(42)).await.unwrap().is_none());
        assert!(matches!(
            store.delete("not-an-id").await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn upper_case_ids_find_the_same_book() {
        let store = seeded().await;
        let upper = oid(2).to_ascii_uppercase();

        let view = store.find_one(&BookKey::Id(upper.clone())).await.unwrap();
        assert_eq!(view.map(|book| book.name).as_deref(), Some("Dune"));
        assert_eq!(
            store.find_by_id(&upper).await.unwrap().map(|book| book.id),
            Some(oid(2))
        );

        let filter = Filter::new().and(Predicate::AnyOf {
            field: BookField::Genre,
            values: vec![SCIFI.to_ascii_uppercase()],
        });
        assert_eq!(store.count(&filter).await.unwrap(), 2);

        let deleted = store.delete(&upper).await.unwrap();
        assert_eq!(deleted.map(|book| book.id), Some(oid(2)));
    }
}
