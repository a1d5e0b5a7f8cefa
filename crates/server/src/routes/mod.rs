//! API route handlers
//!
//! - `health`: liveness, readiness and metrics
//! - `objects`: single-object CRUD and whole-collection reads/drops
//! - `query`: find, search, count, distinct and aggregate
//! - `bulk`: multi-object inserts from JSON arrays and CSV uploads

pub mod bulk;
pub mod health;
pub mod objects;
pub mod query;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// Prefix of every data route.
pub const API_BASE: &str = "/api/1.0";

/// Response body listing affected object ids.
#[derive(Debug, Serialize)]
pub struct IdsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<usize>,
    pub ids: Vec<String>,
}

impl IdsResponse {
    pub fn inserted(ids: Vec<String>) -> Self {
        Self {
            inserted: Some(ids.len()),
            updated: None,
            ids,
        }
    }

    pub fn updated(ids: Vec<String>) -> Self {
        Self {
            inserted: None,
            updated: Some(ids.len()),
            ids,
        }
    }
}

/// API version and base info
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "objgate",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "1.0",
        "endpoints": [
            "/api/1.0/{db}/{collection}",
            "/api/1.0/{db}/{collection}/{id}",
            "/api/1.0/{db}/{collection}/find",
            "/api/1.0/{db}/{collection}/search",
            "/api/1.0/{db}/{collection}/search/explain",
            "/api/1.0/{db}/{collection}/count",
            "/api/1.0/{db}/{collection}/distinct/{field}",
            "/api/1.0/{db}/{collection}/aggregate",
            "/api/1.0/multi/{db}/{collection}",
            "/api/1.0/bulk/{db}/{collection}",
            "/health/live",
            "/health/ready",
            "/metrics"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
