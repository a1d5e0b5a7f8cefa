use crate::error::ServerError;
use crate::state::ServerState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use std::time::Instant;

const API_KEY_HEADER: &str = "x-api-key";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request correlation id, stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The key a client presented: `X-API-Key`, else `Authorization` with an
/// optional `Bearer ` prefix.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let value = headers
        .get(API_KEY_HEADER)
        .or_else(|| headers.get(AUTHORIZATION))?
        .to_str()
        .ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

/// API key authentication
///
/// Resolves the key to a [`Principal`](crate::auth::Principal) and attaches
/// it to the request. Scope checks happen in the handlers, which know the
/// database and collection.
pub async fn api_key_auth(
    State(state): State<Arc<ServerState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(key) = presented_key(request.headers()) else {
        return Err(ServerError::Authentication(
            "API key required. Provide it in 'X-API-Key' or 'Authorization: Bearer <key>' header"
                .to_string(),
        ));
    };
    let Some(principal) = state.principal_for(key) else {
        return Err(ServerError::Authentication("Invalid API key".to_string()));
    };

    if !state.check_rate_limit(key) {
        tracing::warn!(key_id = %principal.key_id, "rate limit exceeded");
        return Err(ServerError::RateLimitExceeded);
    }

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Tags the request with the client's `X-Request-Id`, or a fresh uuid, and
/// echoes it on the response.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();
    tracing::debug!(%method, %uri, %request_id, "request started");

    let response = next.run(request).await;

    tracing::info!(
        %method,
        %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        %request_id,
        "request completed"
    );
    response
}
