use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bookstore_app::modules::books::models::{Author, Genre, Order, OrderLine};
use bookstore_app::modules::books::store::InMemoryBookStore;
use bookstore_kernel::settings::Settings;
use bookstore_kernel::ModuleRegistry;
use bookstore_media::{MediaDeletion, MediaError, MediaStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const TOLKIEN: &str = "65f0000000000000000000a1";
const SCIFI: &str = "65f0000000000000000000c2";
const FANTASY: &str = "65f0000000000000000000c3";
const ORDERED: &str = "65f0000000000000000000b1";

#[derive(Default)]
struct RecordingMedia {
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaStore for RecordingMedia {
    async fn delete_asset(&self, public_id: &str) -> Result<MediaDeletion, MediaError> {
        self.deleted.lock().unwrap().push(public_id.to_string());
        Ok(MediaDeletion {
            result: "ok".into(),
        })
    }
}

fn app(media: Arc<RecordingMedia>) -> Router {
    let store = InMemoryBookStore::new()
        .with_author(Author {
            id: TOLKIEN.into(),
            name: "J. R. R. Tolkien".into(),
        })
        .with_genre(Genre {
            id: SCIFI.into(),
            name: "Science fiction".into(),
        })
        .with_genre(Genre {
            id: FANTASY.into(),
            name: "Fantasy".into(),
        })
        .with_order(Order {
            id: "65f0000000000000000000d1".into(),
            products: vec![OrderLine {
                product: ORDERED.into(),
                quantity: Some(2),
            }],
        });

    let mut registry = ModuleRegistry::new();
    bookstore_app::register_all(&mut registry, Arc::new(store), media);
    bookstore_http::build_router(&registry, &Settings::default())
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn create(app: &Router, book: Value) -> Value {
    let (status, body) = call(app, "POST", "/api/books", Some(book)).await;
    assert_eq!(status, StatusCode::OK, "create failed: {body}");
    body["data"].clone()
}

#[tokio::test]
async fn genre_listing_paginates_across_pages() {
    let app = app(Arc::default());
    for n in 0..5 {
        create(
            &app,
            json!({ "bookId": format!("SF-{n}"), "name": format!("Star {n}"), "genre": [SCIFI], "price": n }),
        )
        .await;
    }
    create(&app, json!({ "bookId": "F-1", "name": "Earthsea", "genre": [FANTASY] })).await;

    let uri = format!("/api/books?genre%5B%5D={SCIFI}&page=3&limit=2&sortByPrice=asc");
    let (status, body) = call(&app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], 0);
    assert_eq!(body["count"], 5);
    assert_eq!(body["pagination"], json!({ "page": 3, "limit": 2, "totalPage": 3 }));
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|book| book["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Star 4"]);
}

#[tokio::test]
async fn search_finds_books_by_author_name() {
    let app = app(Arc::default());
    create(&app, json!({ "bookId": "T-1", "name": "The Silmarillion", "author": TOLKIEN })).await;
    create(&app, json!({ "bookId": "D-1", "name": "Dune" })).await;

    let (status, body) = call(&app, "GET", "/api/books/search?key=TOLKIEN", None).await;
    assert_eq!(status, StatusCode::OK);
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["name"], "The Silmarillion");
    assert_eq!(found[0]["author"]["name"], "J. R. R. Tolkien");
}

#[tokio::test]
async fn reads_report_missing_books_with_status_ok() {
    let app = app(Arc::default());
    for uri in [
        "/api/books/65f0000000000000000000ff",
        "/api/books/bookId/missing",
        "/api/books/slug/missing",
    ] {
        let (status, body) = call(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["error"], 1, "{uri}");
        assert_eq!(body["data"], json!({}), "{uri}");
    }

    let (status, body) = call(&app, "GET", "/api/books/not-an-id", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], 1);
}

#[tokio::test]
async fn check_ordered_lists_matching_groups() {
    let app = app(Arc::default());

    let (_, ordered) = call(&app, "GET", &format!("/api/books/check-ordered/{ORDERED}"), None).await;
    assert_eq!(ordered["error"], 0);
    assert_eq!(ordered["data"], json!([{ "_id": ORDERED }]));

    let (_, never) = call(&app, "GET", "/api/books/check-ordered/65f0000000000000000000b2", None).await;
    assert_eq!(never["data"], json!([]));
}

#[tokio::test]
async fn cover_lifecycle_cleans_up_media() {
    let media = Arc::new(RecordingMedia::default());
    let app = app(media.clone());
    let book = create(
        &app,
        json!({
            "bookId": "H-1",
            "name": "The Hobbit",
            "imageUrl": "https://img.example/hobbit-1.jpg",
            "publicId": "covers/hobbit-1"
        }),
    )
    .await;
    let id = book["_id"].as_str().unwrap();

    let (status, updated) = call(
        &app,
        "PUT",
        &format!("/api/books/{id}"),
        Some(json!({
            "imageUrl": "https://img.example/hobbit-2.jpg",
            "publicId": "covers/hobbit-2"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["publicId"], "covers/hobbit-2");

    let (status, deleted) = call(&app, "DELETE", &format!("/api/books/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["data"]["_id"], id);

    assert_eq!(
        *media.deleted.lock().unwrap(),
        vec!["covers/hobbit-1".to_string(), "covers/hobbit-2".to_string()]
    );

    let (status, again) = call(&app, "DELETE", &format!("/api/books/{id}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(again["error"], 1);
    assert!(again["data"].is_null());
}

#[tokio::test]
async fn create_rejects_duplicates_and_missing_name() {
    let app = app(Arc::default());
    create(&app, json!({ "bookId": "B-1", "name": "Emma" })).await;

    let (status, duplicate) =
        call(&app, "POST", "/api/books", Some(json!({ "bookId": "B-1", "name": "Emma II" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(duplicate["error"], 1);

    let (status, unnamed) = call(&app, "POST", "/api/books", Some(json!({ "bookId": "B-2" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(unnamed["error"], 1);
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = app(Arc::default());
    let response = app
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, spec) = call(&app, "GET", "/docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(spec["paths"]["/api/books/search"]["get"].is_object());
    assert!(spec["components"]["schemas"]["Book"].is_object());
}
