use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::{CredentialError, StoreError};

pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP API errors, rendered as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Same answer for unknown users and wrong passwords
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Unreadable or mistyped JSON body
    #[error("{}", .0.body_text())]
    Json(#[from] JsonRejection),

    #[error("{}", .0.body_text())]
    Query(#[from] QueryRejection),

    #[error("{}", .0.body_text())]
    Path(#[from] PathRejection),

    #[error("{0}")]
    Internal(#[from] StoreError),

    #[error("{0}")]
    Credentials(#[from] CredentialError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::InvalidCredentials
            | ApiError::Json(_)
            | ApiError::Query(_)
            | ApiError::Path(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) | ApiError::Credentials(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            error!("Request failed: {}", self);
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
