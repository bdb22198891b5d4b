//! HTTP handlers for the books module.
//!
//! Queries report not-found and failures in the body with status 200;
//! mutations report them with status 400.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, RawQuery, State},
    routing::get,
    Json, Router,
};
use bookstore_http::{ApiError, Envelope, Pagination, Surface};

use super::models::{Book, BookPatch, BookView, NewBook, OrderedGroup};
use super::query::{ListQuery, SearchQuery};
use super::service::{CatalogError, CatalogService};
use super::store::BookKey;

type Reply<T> = Result<Envelope<T>, ApiError>;

pub fn router(service: Arc<CatalogService>) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/search", get(search_books))
        .route("/bookId/{book_id}", get(get_by_book_id))
        .route("/slug/{slug}", get(get_by_slug))
        .route("/check-ordered/{book_id}", get(check_is_ordered))
        .route(
            "/{id}",
            get(get_by_id)
                .put(update_book)
                .patch(update_book)
                .delete(delete_book),
        )
        .with_state(service)
}

fn api_error(surface: Surface) -> impl Fn(CatalogError) -> ApiError {
    move |error| match error {
        CatalogError::NotFound(_) => ApiError::not_found(surface, error.to_string()),
        CatalogError::Invalid(_) | CatalogError::Store(_) => {
            ApiError::failure(surface, error.to_string())
        }
    }
}

async fn list_books(
    State(service): State<Arc<CatalogService>>,
    RawQuery(raw): RawQuery,
) -> Reply<Vec<BookView>> {
    let query = ListQuery::parse(raw.as_deref())
        .map_err(|error| ApiError::failure(Surface::Read, error.to_string()))?;
    let page = service.list(&query).await.map_err(api_error(Surface::Read))?;

    let pagination = Pagination {
        page: page.page,
        limit: page.limit,
        total_page: page.total_pages(),
    };
    Ok(Envelope::success(page.items)
        .with_count(page.count)
        .with_pagination(pagination))
}

async fn search_books(
    State(service): State<Arc<CatalogService>>,
    RawQuery(raw): RawQuery,
) -> Reply<Vec<BookView>> {
    let query = SearchQuery::parse(raw.as_deref())
        .map_err(|error| ApiError::failure(Surface::Read, error.to_string()))?;
    let books = service.search(&query).await.map_err(api_error(Surface::Read))?;
    Ok(Envelope::success(books))
}

async fn get_book(service: &CatalogService, key: BookKey) -> Reply<BookView> {
    let book = service.get(key).await.map_err(api_error(Surface::Read))?;
    Ok(Envelope::success(book))
}

async fn get_by_id(
    State(service): State<Arc<CatalogService>>,
    Path(id): Path<String>,
) -> Reply<BookView> {
    get_book(&service, BookKey::Id(id)).await
}

async fn get_by_book_id(
    State(service): State<Arc<CatalogService>>,
    Path(book_id): Path<String>,
) -> Reply<BookView> {
    get_book(&service, BookKey::BookId(book_id)).await
}

async fn get_by_slug(
    State(service): State<Arc<CatalogService>>,
    Path(slug): Path<String>,
) -> Reply<BookView> {
    get_book(&service, BookKey::Slug(slug)).await
}

async fn check_is_ordered(
    State(service): State<Arc<CatalogService>>,
    Path(book_id): Path<String>,
) -> Reply<Vec<OrderedGroup>> {
    let groups = service
        .check_is_ordered(&book_id)
        .await
        .map_err(api_error(Surface::Read))?;
    Ok(Envelope::success(groups))
}

async fn create_book(
    State(service): State<Arc<CatalogService>>,
    payload: Result<Json<NewBook>, JsonRejection>,
) -> Reply<Book> {
    let Json(new_book) =
        payload.map_err(|rejection| ApiError::failure(Surface::Write, rejection.body_text()))?;
    let book = service
        .create(new_book)
        .await
        .map_err(api_error(Surface::Write))?;
    Ok(Envelope::success(book))
}

async fn update_book(
    State(service): State<Arc<CatalogService>>,
    Path(id): Path<String>,
    payload: Result<Json<BookPatch>, JsonRejection>,
) -> Reply<Book> {
    let Json(patch) =
        payload.map_err(|rejection| ApiError::failure(Surface::Write, rejection.body_text()))?;
    let book = service
        .update_by_id(&id, patch)
        .await
        .map_err(api_error(Surface::Write))?;
    Ok(Envelope::success(book))
}

async fn delete_book(
    State(service): State<Arc<CatalogService>>,
    Path(id): Path<String>,
) -> Reply<Book> {
    let book = service
        .delete_by_id(&id)
        .await
        .map_err(api_error(Surface::Write))?;
    Ok(Envelope::success(book))
}
