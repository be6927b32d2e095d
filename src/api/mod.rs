//! HTTP API
//!
//! Accounts, history, exports, favorites and read receipts. Every handler
//! reaches storage through the shared `ChatStore`.

mod accounts;
mod error;
mod extract;
mod favorites;
mod history;
mod messages;
mod receipts;

pub use error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::store::ChatStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/register", post(accounts::register))
        .route("/api/login", post(accounts::login))
        .route("/api/history/{room}", get(history::history))
        .route("/api/export/{room}", get(history::export))
        .route("/api/favorites", post(favorites::add).delete(favorites::remove))
        .route("/api/favorites/{username}", get(favorites::list))
        .route("/api/read-receipt", post(receipts::create))
        .route("/api/read-receipts/{message_id}", get(receipts::list))
        .route("/api/messages/search", get(messages::search))
        .route("/api/messages/export", get(messages::export))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Treat missing and blank parameters alike
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Plain-text download
pub(crate) fn text_attachment(file_name: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}
