pub mod models;
pub mod query;
pub mod routes;
pub mod service;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::get, Router};
use bookstore_kernel::{InitCtx, Migration, Module};
use bookstore_media::MediaStore;
use serde_json::json;

use service::CatalogService;
use store::BookStore;

/// Book catalog: listing, lookup, search and maintenance.
pub struct BooksModule {
    service: Arc<CatalogService>,
}

impl BooksModule {
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            backend = ?ctx.settings.database.backend,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.service.clone()).route("/health", get(health_check))
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_book_indexes",
            command: json!({
                "createIndexes": store::mongo::BOOKS,
                "indexes": [
                    { "key": { "bookId": 1 }, "name": "book_id_unique", "unique": true },
                    { "key": { "slug": 1 }, "name": "slug_unique", "unique": true },
                    { "key": { "genre": 1 }, "name": "genre" }
                ]
            }),
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

async fn health_check() -> &'static str {
    "books module is healthy"
}

fn envelope_of(data: serde_json::Value) -> serde_json::Value {
    json!({
        "allOf": [
            { "$ref": "#/components/schemas/Envelope" },
            { "type": "object", "properties": { "data": data } }
        ]
    })
}

fn json_response(description: &str, schema: serde_json::Value) -> serde_json::Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": schema } }
    })
}

fn openapi_fragment() -> serde_json::Value {
    let book = json!({ "$ref": "#/components/schemas/Book" });
    let books = json!({ "type": "array", "items": book });
    let id_param = |name: &str| {
        json!({ "name": name, "in": "path", "required": true, "schema": { "type": "string" } })
    };
    let query_param = |name: &str, kind: &str| {
        json!({ "name": name, "in": "query", "required": false, "schema": { "type": kind } })
    };
    let write_body = |schema: &str| {
        json!({
            "required": true,
            "content": { "application/json": { "schema": { "$ref": format!("#/components/schemas/{schema}") } } }
        })
    };
    let failed = json_response("Not found or failed", json!({ "$ref": "#/components/schemas/Envelope" }));

    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "parameters": [
                        { "name": "genre", "in": "query", "required": false, "schema": { "type": "array", "items": { "type": "string" } }, "style": "form", "explode": true },
                        query_param("key", "string"),
                        query_param("page", "integer"),
                        query_param("limit", "integer"),
                        query_param("sortByPrice", "string"),
                        query_param("sortByDate", "string")
                    ],
                    "responses": { "200": json_response("Page of books", envelope_of(books.clone())) }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": write_body("NewBook"),
                    "responses": {
                        "200": json_response("Created book", envelope_of(book.clone())),
                        "400": failed.clone()
                    }
                }
            },
            "/search": {
                "get": {
                    "summary": "Search by book or author name (at most 5 results)",
                    "tags": ["Books"],
                    "parameters": [
                        query_param("key", "string"),
                        query_param("page", "integer"),
                        query_param("limit", "integer")
                    ],
                    "responses": { "200": json_response("Matching books", envelope_of(books)) }
                }
            },
            "/bookId/{bookId}": {
                "get": {
                    "summary": "Get a book by catalog number",
                    "tags": ["Books"],
                    "parameters": [id_param("bookId")],
                    "responses": { "200": json_response("Book or not found", envelope_of(book.clone())) }
                }
            },
            "/slug/{slug}": {
                "get": {
                    "summary": "Get a book by slug",
                    "tags": ["Books"],
                    "parameters": [id_param("slug")],
                    "responses": { "200": json_response("Book or not found", envelope_of(book.clone())) }
                }
            },
            "/check-ordered/{bookId}": {
                "get": {
                    "summary": "Whether a book appears in any order",
                    "tags": ["Books"],
                    "parameters": [id_param("bookId")],
                    "responses": {
                        "200": json_response("Order groupings", envelope_of(json!({
                            "type": "array",
                            "items": { "type": "object", "properties": { "_id": { "type": "string" } } }
                        })))
                    }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Get a book by id",
                    "tags": ["Books"],
                    "parameters": [id_param("id")],
                    "responses": { "200": json_response("Book or not found", envelope_of(book.clone())) }
                },
                "put": {
                    "summary": "Update a book",
                    "tags": ["Books"],
                    "parameters": [id_param("id")],
                    "requestBody": write_body("BookPatch"),
                    "responses": {
                        "200": json_response("Updated book", envelope_of(book.clone())),
                        "400": failed.clone()
                    }
                },
                "patch": {
                    "summary": "Update a book",
                    "tags": ["Books"],
                    "parameters": [id_param("id")],
                    "requestBody": write_body("BookPatch"),
                    "responses": {
                        "200": json_response("Updated book", envelope_of(book.clone())),
                        "400": failed.clone()
                    }
                },
                "delete": {
                    "summary": "Delete a book and its cover image",
                    "tags": ["Books"],
                    "parameters": [id_param("id")],
                    "responses": {
                        "200": json_response("Deleted book", envelope_of(book)),
                        "400": failed
                    }
                }
            },
            "/health": {
                "get": {
                    "summary": "Books health check",
                    "tags": ["Books"],
                    "responses": {
                        "200": {
                            "description": "OK",
                            "content": { "text/plain": { "schema": { "type": "string" } } }
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "_id": { "type": "string" },
                        "bookId": { "type": "string" },
                        "slug": { "type": "string" },
                        "name": { "type": "string" },
                        "year": { "type": "integer" },
                        "description": { "type": "string" },
                        "pages": { "type": "integer" },
                        "size": { "type": "string" },
                        "price": { "type": "number" },
                        "discount": { "type": "number" },
                        "imageUrl": { "type": "string" },
                        "publicId": { "type": "string" },
                        "author": {},
                        "publisher": {},
                        "genre": { "type": "array", "items": {} },
                        "createdAt": { "type": "string", "format": "date-time" },
                        "updatedAt": { "type": "string", "format": "date-time" }
                    },
                    "required": ["_id", "bookId", "slug", "name"]
                },
                "NewBook": {
                    "type": "object",
                    "properties": {
                        "bookId": { "type": "string" },
                        "name": { "type": "string" },
                        "slug": { "type": "string" },
                        "year": { "type": "integer" },
                        "description": { "type": "string" },
                        "pages": { "type": "integer" },
                        "size": { "type": "string" },
                        "price": { "type": "number" },
                        "discount": { "type": "number" },
                        "imageUrl": { "type": "string" },
                        "publicId": { "type": "string" },
                        "author": { "type": "string" },
                        "publisher": { "type": "string" },
                        "genre": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["bookId", "name"]
                },
                "BookPatch": {
                    "type": "object",
                    "description": "Absent fields are left unchanged; the cover is replaced only when imageUrl and publicId are both given",
                    "properties": {
                        "name": { "type": "string" },
                        "year": { "type": "integer" },
                        "description": { "type": "string" },
                        "pages": { "type": "integer" },
                        "size": { "type": "string" },
                        "price": { "type": "number" },
                        "discount": { "type": "number" },
                        "imageUrl": { "type": "string" },
                        "publicId": { "type": "string" },
                        "author": { "type": "string" },
                        "publisher": { "type": "string" },
                        "genre": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}

/// Create the books module over the given store and media client
pub fn create_module(store: Arc<dyn BookStore>, media: Arc<dyn MediaStore>) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(Arc::new(CatalogService::new(store, media))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::store::InMemoryBookStore;

    #[test]
    fn migration_creates_unique_indexes() {
        let module = create_module(
            Arc::new(InMemoryBookStore::new()),
            Arc::new(bookstore_media::DisabledMedia),
        );
        let migrations = module.migrations();
        assert_eq!(migrations.len(), 1);

        let indexes = migrations[0].command["indexes"].as_array().unwrap();
        let unique: Vec<&str> = indexes
            .iter()
            .filter(|index| index["unique"] == true)
            .filter_map(|index| index["name"].as_str())
            .collect();
        assert_eq!(unique, vec!["book_id_unique", "slug_unique"]);
    }

    #[test]
    fn openapi_documents_every_route() {
        let fragment = openapi_fragment();
        for path in ["/", "/search", "/bookId/{bookId}", "/slug/{slug}", "/check-ordered/{bookId}", "/{id}", "/health"] {
            assert!(fragment["paths"][path].is_object(), "missing {path}");
        }
        assert!(fragment["paths"]["/{id}"]["patch"].is_object());
    }
}
