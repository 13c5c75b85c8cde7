//! HTTP error mapping shared by every route.
//!
//! Errors are rendered as Twirp-style JSON bodies (`{"code": .., "msg": ..}`)
//! so existing RPC clients can decode them.

use crate::core::ServerError;
use crate::db::DbError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub msg: String,
}

#[derive(Debug)]
pub enum WebError {
    Database(DbError),
    Unauthenticated(String),
    Input(String),
    Internal(String),
}

impl From<DbError> for WebError {
    fn from(err: DbError) -> Self {
        WebError::Database(err)
    }
}

impl From<ServerError> for WebError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Database(err) => WebError::Database(err),
            other => WebError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match self {
            WebError::Database(DbError::NotOpen) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                DbError::NotOpen.to_string(),
            ),
            WebError::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string()),
            WebError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg),
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, "invalid_argument", msg),
            WebError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };

        let body = Json(ErrorResponse {
            code: code.to_string(),
            msg,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
