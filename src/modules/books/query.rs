//! Query parameters for listing and searching books, and the predicate model
//! the stores translate into their own query languages.

use thiserror::Error;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIST_LIMIT: u64 = 2;
/// Search skips `(page - 1) * limit`; with the default of 0 it never skips.
pub const DEFAULT_SEARCH_LIMIT: u64 = 0;
/// Search never returns more than this many books.
pub const SEARCH_RESULT_CAP: u64 = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("query parameter '{param}' must be a non-negative integer, got '{value}'")]
    InvalidNumber { param: &'static str, value: String },
}

/// Fields a predicate may test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookField {
    Name,
    Genre,
    /// Name of the expanded author; only usable after the author join.
    AuthorName,
}

impl BookField {
    /// Dotted document path of the field.
    pub fn path(self) -> &'static str {
        match self {
            BookField::Name => "name",
            BookField::Genre => "genre",
            BookField::AuthorName => "author.name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Field (scalar or array) holds at least one of the ids.
    AnyOf {
        field: BookField,
        values: Vec<String>,
    },
    /// Case-insensitive substring match; `needle` is literal text.
    Contains { field: BookField, needle: String },
    /// At least one of the predicates holds.
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn references(&self, target: BookField) -> bool {
        match self {
            Predicate::AnyOf { field, .. } | Predicate::Contains { field, .. } => *field == target,
            Predicate::Or(predicates) => predicates.iter().any(|p| p.references(target)),
        }
    }
}

/// Conjunction of predicates; empty matches every book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn references(&self, field: BookField) -> bool {
        self.predicates.iter().any(|p| p.references(field))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// `asc` sorts ascending; any other value sorts descending.
    fn from_param(value: &str) -> Self {
        if value == "asc" {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Price,
    CreatedAt,
}

impl SortField {
    pub fn path(self) -> &'static str {
        match self {
            SortField::Price => "price",
            SortField::CreatedAt => "createdAt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Parameters of the paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub genres: Vec<String>,
    pub key: Option<String>,
    pub page: u64,
    /// 0 means no limit.
    pub limit: u64,
    /// Applied in order: price before date.
    pub sort: Vec<SortKey>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            genres: Vec::new(),
            key: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIST_LIMIT,
            sort: Vec::new(),
        }
    }
}

impl ListQuery {
    /// Parse `page`, `limit`, `genre` (repeatable, also as `genre[]`), `key`,
    /// `sortByPrice` and `sortByDate` from a raw query string.
    pub fn parse(raw: Option<&str>) -> Result<Self, QueryError> {
        let mut query = Self::default();
        let mut sort_by_price = None;
        let mut sort_by_date = None;

        for (name, value) in pairs(raw) {
            match name.as_str() {
                "page" => query.page = parse_number("page", &value)?,
                "limit" => query.limit = parse_number("limit", &value)?,
                "genre" | "genre[]" if !value.is_empty() => query.genres.push(value),
                "key" if !value.is_empty() => query.key = Some(value),
                "sortByPrice" if !value.is_empty() => {
                    sort_by_price = Some(SortDirection::from_param(&value))
                }
                "sortByDate" if !value.is_empty() => {
                    sort_by_date = Some(SortDirection::from_param(&value))
                }
                _ => {}
            }
        }

        query.page = query.page.max(1);
        query.sort = [
            sort_by_price.map(|direction| SortKey {
                field: SortField::Price,
                direction,
            }),
            sort_by_date.map(|direction| SortKey {
                field: SortField::CreatedAt,
                direction,
            }),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(query)
    }

    pub fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        if !self.genres.is_empty() {
            filter = filter.and(Predicate::AnyOf {
                field: BookField::Genre,
                values: self.genres.clone(),
            });
        }
        if let Some(key) = &self.key {
            filter = filter.and(Predicate::Contains {
                field: BookField::Name,
                needle: key.clone(),
            });
        }
        filter
    }

    pub fn skip(&self) -> u64 {
        skip_for(self.page, self.limit)
    }

    pub fn page_limit(&self) -> Option<u64> {
        (self.limit > 0).then_some(self.limit)
    }
}

/// Parameters of the typeahead search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub key: Option<String>,
    pub page: u64,
    pub limit: u64,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            key: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl SearchQuery {
    pub fn parse(raw: Option<&str>) -> Result<Self, QueryError> {
        let mut query = Self::default();
        for (name, value) in pairs(raw) {
            match name.as_str() {
                "page" => query.page = parse_number("page", &value)?,
                "limit" => query.limit = parse_number("limit", &value)?,
                "key" if !value.is_empty() => query.key = Some(value),
                _ => {}
            }
        }
        query.page = query.page.max(1);
        Ok(query)
    }

    /// Book name or author name contains the key. Without a key every book matches.
    pub fn filter(&self) -> Filter {
        match &self.key {
            Some(key) => Filter::new().and(Predicate::Or(vec![
                Predicate::Contains {
                    field: BookField::Name,
                    needle: key.clone(),
                },
                Predicate::Contains {
                    field: BookField::AuthorName,
                    needle: key.clone(),
                },
            ])),
            None => Filter::new(),
        }
    }

    pub fn skip(&self) -> u64 {
        skip_for(self.page, self.limit)
    }
}

/// `ceil(count / limit)`; an unbounded page (limit 0) is a single page.
pub fn total_pages(count: u64, limit: u64) -> u64 {
    if limit == 0 {
        return u64::from(count > 0);
    }
    count.div_ceil(limit)
}

fn skip_for(page: u64, limit: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(limit)
}

fn pairs(raw: Option<&str>) -> impl Iterator<Item = (String, String)> + '_ {
    url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
}

fn parse_number(param: &'static str, value: &str) -> Result<u64, QueryError> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryError::InvalidNumber {
            param,
            value: value.to_string(),
        })
}
