//! Read-only query routes: raw JSON filters, search strings and pipelines.

use crate::auth::{Permission, Principal};
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use objgate::{Document, FindOptions, SkippedTerm, SortDirection, SortSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Paging and sort parameters shared by `find` and `search`.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// Documents to skip
    #[serde(default)]
    pub start: Option<i64>,

    /// Maximum documents to return; `-1` or `0` means no limit
    #[serde(default)]
    pub size: Option<i64>,

    /// Field to sort by
    #[serde(default)]
    pub sort: Option<String>,

    /// `asc` (default) or `desc`
    #[serde(default)]
    pub order: Option<String>,
}

impl PageQuery {
    pub fn to_options(&self) -> ServerResult<FindOptions> {
        let start = self.start.unwrap_or(0);
        let size = self.size.unwrap_or(-1);
        if start < 0 {
            return Err(ServerError::BadRequest(format!(
                "start must be 0 or greater, got {start}"
            )));
        }
        if size < -1 {
            return Err(ServerError::BadRequest(format!(
                "size must be -1 or greater, got {size}"
            )));
        }

        let mut options = FindOptions::paged(start, size);
        if let Some(field) = self.sort.as_deref().filter(|f| !f.is_empty()) {
            let direction = match self.order.as_deref() {
                Some(order) => order.parse::<SortDirection>()?,
                None => SortDirection::Ascending,
            };
            options = options.with_sort(SortSpec::new(field, direction));
        }
        Ok(options)
    }
}

/// `PageQuery` plus `qs`. Not flattened: urlencoded numbers do not survive
/// `#[serde(flatten)]`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// Plain-text search string, e.g. `status:A weight>=50`
    #[serde(default)]
    pub qs: Option<String>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
}

impl SearchQuery {
    pub fn into_parts(self) -> (Option<String>, PageQuery) {
        let page = PageQuery {
            start: self.start,
            size: self.size,
            sort: self.sort,
            order: self.order,
        };
        (self.qs, page)
    }
}

/// What a search string compiles to
#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub filter: Value,
    pub skipped: Vec<SkippedTerm>,
}

/// POST /{db}/{collection}/find; body is JSON filter text
pub async fn find(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
    Query(page): Query<PageQuery>,
    body: String,
) -> ServerResult<Json<Vec<Document>>> {
    state.authorize(&principal, &database, &collection, Permission::Read)?;
    let options = page.to_options()?;
    let docs = state
        .run(move |svc| svc.find_str(&database, &collection, &body, &options))
        .await?;
    Ok(Json(docs))
}

/// GET /{db}/{collection}/search?qs=...
pub async fn search(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
    Query(query): Query<SearchQuery>,
) -> ServerResult<Json<Vec<Document>>> {
    state.authorize(&principal, &database, &collection, Permission::Read)?;
    let (qs, page) = query.into_parts();
    let options = page.to_options()?;
    let docs = state
        .run(move |svc| svc.search(&database, &collection, qs.as_deref(), &options))
        .await?;
    Ok(Json(docs))
}

/// GET /{db}/{collection}/search/explain?qs=...
pub async fn explain(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
    Query(query): Query<SearchQuery>,
) -> ServerResult<Json<ExplainResponse>> {
    state.authorize(&principal, &database, &collection, Permission::Read)?;
    let report = state.service.explain(query.qs.as_deref());
    Ok(Json(ExplainResponse {
        filter: state.service.compiler().render(&report.filter),
        skipped: report.skipped,
    }))
}

/// POST /{db}/{collection}/count; body is JSON filter text
pub async fn count(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
    body: String,
) -> ServerResult<Json<u64>> {
    state.authorize(&principal, &database, &collection, Permission::Read)?;
    let count = state
        .run(move |svc| svc.count_str(&database, &collection, &body))
        .await?;
    Ok(Json(count))
}

/// POST /{db}/{collection}/distinct/{field}; body is JSON filter text
pub async fn distinct(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection, field)): Path<(String, String, String)>,
    body: String,
) -> ServerResult<Json<Vec<Value>>> {
    state.authorize(&principal, &database, &collection, Permission::Read)?;
    let values = state
        .run(move |svc| svc.distinct_str(&database, &collection, &field, &body))
        .await?;
    Ok(Json(values))
}

/// POST /{db}/{collection}/aggregate; body is a JSON array of stages
pub async fn aggregate(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
    body: String,
) -> ServerResult<Json<Vec<Document>>> {
    state.authorize(&principal, &database, &collection, Permission::Read)?;
    let docs = state
        .run(move |svc| svc.aggregate_str(&database, &collection, &body))
        .await?;
    Ok(Json(docs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_to_everything_unsorted() {
        let options = PageQuery::default().to_options().unwrap();
        assert_eq!(options, FindOptions::default());
    }

    #[test]
    fn page_with_sort_and_order() {
        let page = PageQuery {
            start: Some(5),
            size: Some(10),
            sort: Some("year".into()),
            order: Some("desc".into()),
        };
        assert_eq!(
            page.to_options().unwrap(),
            FindOptions::paged(5, 10).with_sort(SortSpec::descending("year"))
        );
    }

    #[test]
    fn invalid_paging_is_rejected() {
        let negative = PageQuery {
            start: Some(-1),
            ..PageQuery::default()
        };
        assert!(matches!(
            negative.to_options(),
            Err(ServerError::BadRequest(_))
        ));

        let bad_order = PageQuery {
            sort: Some("year".into()),
            order: Some("sideways".into()),
            ..PageQuery::default()
        };
        assert_eq!(
            bad_order.to_options().unwrap_err().status_code(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }
}
