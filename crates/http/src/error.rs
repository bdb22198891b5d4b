//! Response envelope and error mapping for the HTTP layer.
//!
//! Every endpoint answers with the same JSON shape:
//! `{ message, error: 0 | 1, data?, count?, pagination? }`.
//! Whether a not-found or failed request is reported with status 200 or 400
//! depends on the [`Surface`] the operation belongs to.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Generic success message.
pub const SUCCESS: &str = "success";

/// Which family of endpoints an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Queries: errors are reported in the body with status 200.
    Read,
    /// Mutations: errors are reported with status 400.
    Write,
}

impl Surface {
    pub fn error_status(self) -> StatusCode {
        match self {
            Surface::Read => StatusCode::OK,
            Surface::Write => StatusCode::BAD_REQUEST,
        }
    }
}

/// Pagination block attached to list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total_page: u64,
}

/// Successful response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub message: String,
    pub error: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            message: SUCCESS.to_string(),
            error: 0,
            data: Some(data),
            count: None,
            pagination: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Errors that map to an `error: 1` envelope.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The query ran but matched nothing.
    #[error("not found: {message}")]
    NotFound { surface: Surface, message: String },

    /// The request could not be carried out (bad input, store failure).
    #[error("request failed: {detail}")]
    Failure { surface: Surface, detail: String },
}

impl ApiError {
    pub fn not_found(surface: Surface, message: impl Into<String>) -> Self {
        Self::NotFound {
            surface,
            message: message.into(),
        }
    }

    pub fn failure(surface: Surface, detail: impl Into<String>) -> Self {
        Self::Failure {
            surface,
            detail: detail.into(),
        }
    }

    pub fn surface(&self) -> Surface {
        match self {
            ApiError::NotFound { surface, .. } | ApiError::Failure { surface, .. } => *surface,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let surface = self.surface();
        let status = surface.error_status();

        let body = match self {
            ApiError::NotFound { message, .. } => {
                tracing::info!(status_code = %status.as_u16(), %message, "resource not found");
                // Reads answer with an empty object, writes with null.
                let data = match surface {
                    Surface::Read => json!({}),
                    Surface::Write => serde_json::Value::Null,
                };
                json!({ "message": message, "error": 1, "data": data })
            }
            ApiError::Failure { detail, .. } => {
                let error_id = Uuid::new_v4();
                tracing::error!(
                    error_id = %error_id,
                    status_code = %status.as_u16(),
                    error = %detail,
                    "request failed"
                );
                json!({ "message": failure_message(&detail, error_id), "error": 1 })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Client-facing failure text. Release builds keep the underlying error in
/// the logs only.
fn failure_message(detail: &str, error_id: Uuid) -> String {
    if cfg!(debug_assertions) {
        format!("An error occurred! {detail}")
    } else {
        format!("An error occurred (ref {error_id})")
    }
}
