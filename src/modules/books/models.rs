use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A book as stored: relations are kept as ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Store-assigned identifier (24 hex chars)
    #[serde(rename = "_id")]
    pub id: String,
    /// Human-facing catalog number
    pub book_id: String,
    /// URL-friendly name, unique
    pub slug: String,
    pub name: String,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub pages: Option<i32>,
    pub size: Option<String>,
    pub price: Option<f64>,
    pub discount: Option<f64>,
    pub image_url: Option<String>,
    /// Media asset handle of the cover image
    pub public_id: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// The cover asset id, if one is set.
    pub fn cover_asset(&self) -> Option<&str> {
        non_empty(self.public_id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publisher {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

/// A book with its author, publisher and genres expanded in place of their ids.
///
/// Dangling references expand to `None` (or are dropped from `genre`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    #[serde(rename = "_id")]
    pub id: String,
    pub book_id: String,
    pub slug: String,
    pub name: String,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub pages: Option<i32>,
    pub size: Option<String>,
    pub price: Option<f64>,
    pub discount: Option<f64>,
    pub image_url: Option<String>,
    pub public_id: Option<String>,
    pub author: Option<Author>,
    pub publisher: Option<Publisher>,
    pub genre: Vec<Genre>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookView {
    pub fn expand(
        book: Book,
        author: Option<Author>,
        publisher: Option<Publisher>,
        genre: Vec<Genre>,
    ) -> Self {
        Self {
            id: book.id,
            book_id: book.book_id,
            slug: book.slug,
            name: book.name,
            year: book.year,
            description: book.description,
            pages: book.pages,
            size: book.size,
            price: book.price,
            discount: book.discount,
            image_url: book.image_url,
            public_id: book.public_id,
            author,
            publisher,
            genre,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

/// Request body for creating a book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub book_id: String,
    pub name: String,
    /// Derived from `name` when omitted
    pub slug: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub pages: Option<i32>,
    pub size: Option<String>,
    pub price: Option<f64>,
    pub discount: Option<f64>,
    pub image_url: Option<String>,
    pub public_id: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
}

/// Request body for updating a book. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub pages: Option<i32>,
    pub size: Option<String>,
    pub price: Option<f64>,
    pub discount: Option<f64>,
    pub image_url: Option<String>,
    pub public_id: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<Vec<String>>,
}

impl BookPatch {
    /// A patch replaces the cover only when it carries both a new image url
    /// and a new asset id.
    pub fn replaces_image(&self) -> bool {
        non_empty(self.image_url.as_deref()).is_some()
            && non_empty(self.public_id.as_deref()).is_some()
    }

    /// The same patch with the image fields dropped.
    pub fn without_image(&self) -> Self {
        Self {
            image_url: None,
            public_id: None,
            ..self.clone()
        }
    }

    /// Apply every present field to `book`.
    pub fn apply(&self, book: &mut Book) {
        if let Some(name) = &self.name {
            book.name = name.clone();
        }
        if self.year.is_some() {
            book.year = self.year;
        }
        if self.description.is_some() {
            book.description = self.description.clone();
        }
        if self.pages.is_some() {
            book.pages = self.pages;
        }
        if self.size.is_some() {
            book.size = self.size.clone();
        }
        if self.price.is_some() {
            book.price = self.price;
        }
        if self.discount.is_some() {
            book.discount = self.discount;
        }
        if self.image_url.is_some() {
            book.image_url = self.image_url.clone();
        }
        if self.public_id.is_some() {
            book.public_id = self.public_id.clone();
        }
        if self.author.is_some() {
            book.author = self.author.clone();
        }
        if self.publisher.is_some() {
            book.publisher = self.publisher.clone();
        }
        if let Some(genre) = &self.genre {
            book.genre = genre.clone();
        }
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Id of the ordered book
    pub product: String,
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub products: Vec<OrderLine>,
}

/// A distinct book id found among order lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedGroup {
    #[serde(rename = "_id")]
    pub id: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Book {
        let now = Utc::now();
        Book {
            id: "65f000000000000000000001".into(),
            book_id: "B-1".into(),
            slug: "dune".into(),
            name: "Dune".into(),
            year: Some(1965),
            description: None,
            pages: Some(412),
            size: None,
            price: Some(9.5),
            discount: None,
            image_url: Some("https://img.example/dune.jpg".into()),
            public_id: Some("covers/dune".into()),
            author: None,
            publisher: None,
            genre: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn image_replacement_needs_both_fields() {
        let mut patch = BookPatch {
            image_url: Some("https://img.example/new.jpg".into()),
            ..BookPatch::default()
        };
        assert!(!patch.replaces_image());

        patch.public_id = Some(String::new());
        assert!(!patch.replaces_image());

        patch.public_id = Some("covers/new".into());
        assert!(patch.replaces_image());
    }

    #[test]
    fn apply_keeps_absent_fields() {
        let mut target = book();
        let patch = BookPatch {
            price: Some(12.0),
            genre: Some(vec!["65f0000000000000000000aa".into()]),
            ..BookPatch::default()
        }
        .without_image();

        patch.apply(&mut target);

        assert_eq!(target.price, Some(12.0));
        assert_eq!(target.name, "Dune");
        assert_eq!(target.public_id.as_deref(), Some("covers/dune"));
        assert_eq!(target.genre.len(), 1);
    }

    #[test]
    fn book_serializes_with_wire_names() {
        let value = serde_json::to_value(book()).unwrap();
        assert_eq!(value["_id"], "65f000000000000000000001");
        assert_eq!(value["bookId"], "B-1");
        assert_eq!(value["publicId"], "covers/dune");
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn cover_asset_ignores_empty_ids() {
        let mut target = book();
        assert_eq!(target.cover_asset(), Some("covers/dune"));
        target.public_id = Some(String::new());
        assert_eq!(target.cover_asset(), None);
    }
}
