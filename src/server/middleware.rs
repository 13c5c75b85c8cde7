//! Request middleware: shared-secret check first, then the admission gate.

use crate::server::gate::AdmissionGate;
use crate::web::WebError;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

/// Shared-secret header check. An empty token disables it.
#[derive(Debug, Clone)]
pub struct TokenAuth {
    token: Arc<str>,
    header: HeaderName,
}

impl TokenAuth {
    pub fn new(token: &str, header: &str) -> Result<Self, String> {
        let header = header
            .parse::<HeaderName>()
            .map_err(|err| format!("invalid token header '{}': {}", header, err))?;
        Ok(Self {
            token: Arc::from(token),
            header,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.token.is_empty()
    }

    pub fn check(&self, headers: &HeaderMap) -> bool {
        if !self.is_enabled() {
            return true;
        }
        headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == &*self.token)
    }
}

pub async fn require_token(State(auth): State<TokenAuth>, request: Request, next: Next) -> Response {
    if !auth.check(request.headers()) {
        debug!(path = %request.uri().path(), "Rejected request with invalid token");
        return WebError::Unauthenticated("invalid token".to_string()).into_response();
    }
    next.run(request).await
}

/// Holds an admission permit for the whole handler. The permit is released
/// when the handler returns, errors, panics or is cancelled.
pub async fn admit_request(State(gate): State<AdmissionGate>, request: Request, next: Next) -> Response {
    let permit = gate.enter_request().await;
    let response = next.run(request).await;
    permit.leave();
    response
}
