//! Single-object CRUD plus whole-collection reads and drops.

use crate::auth::{Permission, Principal};
use crate::error::{ServerError, ServerResult};
use crate::routes::{IdsResponse, API_BASE};
use crate::state::ServerState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put, MethodRouter};
use axum::{Extension, Json};
use objgate::{Document, StoreError, ID_FIELD};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Shape of the body returned by insert and replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ResponseFormat {
    #[default]
    #[serde(rename = "entireObject", alias = "EntireObject", alias = "0")]
    EntireObject,
    #[serde(rename = "onlyId", alias = "OnlyId", alias = "1")]
    OnlyId,
}

#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    #[serde(default, rename = "responseFormat")]
    pub response_format: ResponseFormat,
}

pub(crate) fn parse_body(body: &[u8]) -> ServerResult<Value> {
    Ok(serde_json::from_slice(body)?)
}

fn object_id(doc: &Document) -> ServerResult<String> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServerError::Internal("stored document has no string _id".to_string()))
}

fn created(database: &str, collection: &str, id: &str, body: Value) -> Response {
    let location = format!("{API_BASE}/{database}/{collection}/{id}");
    (
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(body),
    )
        .into_response()
}

async fn insert(
    state: &ServerState,
    database: String,
    collection: String,
    id: Option<String>,
    body: Value,
    format: ResponseFormat,
) -> ServerResult<Response> {
    let (db, coll) = (database.clone(), collection.clone());
    let doc = state
        .run(move |svc| svc.insert(&db, &coll, id.as_deref(), body))
        .await?;
    let id = object_id(&doc)?;
    tracing::debug!(%database, %collection, id = %id, "object inserted");

    let body = match format {
        ResponseFormat::EntireObject => Value::Object(doc),
        ResponseFormat::OnlyId => serde_json::to_value(IdsResponse::inserted(vec![id.clone()]))?,
    };
    Ok(created(&database, &collection, &id, body))
}

/// GET /{db}/{collection}/{id}
pub async fn get_object(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection, id)): Path<(String, String, String)>,
) -> ServerResult<Json<Document>> {
    state.authorize(&principal, &database, &collection, Permission::Read)?;
    let (db, coll, key) = (database, collection.clone(), id.clone());
    state
        .run(move |svc| svc.get(&db, &coll, &key))
        .await?
        .map(Json)
        .ok_or(ServerError::ObjectNotFound { id, collection })
}

/// POST /{db}/{collection}/{id}; the route id overwrites any `_id` in the body
pub async fn insert_with_id(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection, id)): Path<(String, String, String)>,
    Query(query): Query<FormatQuery>,
    body: Bytes,
) -> ServerResult<Response> {
    state.authorize(&principal, &database, &collection, Permission::Insert)?;
    let body = parse_body(&body)?;
    insert(
        &state,
        database,
        collection,
        Some(id),
        body,
        query.response_format,
    )
    .await
}

/// POST /{db}/{collection}; keeps a string `_id` from the body or generates one
pub async fn insert_without_id(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
    Query(query): Query<FormatQuery>,
    body: Bytes,
) -> ServerResult<Response> {
    state.authorize(&principal, &database, &collection, Permission::Insert)?;
    let body = parse_body(&body)?;
    insert(&state, database, collection, None, body, query.response_format).await
}

/// PUT /{db}/{collection}/{id}
pub async fn replace_object(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection, id)): Path<(String, String, String)>,
    Query(query): Query<FormatQuery>,
    body: Bytes,
) -> ServerResult<Json<Value>> {
    state.authorize(&principal, &database, &collection, Permission::Update)?;
    let body = parse_body(&body)?;
    let (db, coll, key) = (database, collection.clone(), id.clone());
    let replaced = state
        .run(move |svc| svc.replace(&db, &coll, &key, body))
        .await?;
    let Some(doc) = replaced else {
        return Err(ServerError::ObjectNotFound { id, collection });
    };

    match query.response_format {
        ResponseFormat::EntireObject => Ok(Json(Value::Object(doc))),
        ResponseFormat::OnlyId => Ok(Json(serde_json::to_value(IdsResponse::updated(vec![
            object_id(&doc)?,
        ]))?)),
    }
}

/// DELETE /{db}/{collection}/{id}
pub async fn delete_object(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection, id)): Path<(String, String, String)>,
) -> ServerResult<StatusCode> {
    state.authorize(&principal, &database, &collection, Permission::Delete)?;
    let (db, coll, key) = (database, collection.clone(), id.clone());
    if state.run(move |svc| svc.delete(&db, &coll, &key)).await? {
        Ok(StatusCode::OK)
    } else {
        Err(ServerError::ObjectNotFound { id, collection })
    }
}

/// GET /{db}/{collection}
pub async fn get_all(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
) -> ServerResult<Json<Vec<Document>>> {
    state.authorize(&principal, &database, &collection, Permission::Read)?;
    let coll = collection.clone();
    let docs = state
        .run(move |svc| -> Result<_, StoreError> {
            if !svc.collection_exists(&database, &coll)? {
                return Ok(None);
            }
            svc.get_all(&database, &coll).map(Some)
        })
        .await?;
    docs.map(Json)
        .ok_or(ServerError::CollectionNotFound(collection))
}

/// DELETE /{db}/{collection}
pub async fn delete_collection(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    state.authorize(&principal, &database, &collection, Permission::Delete)?;
    let (db, coll) = (database.clone(), collection.clone());
    let dropped = state
        .run(move |svc| {
            Ok::<_, StoreError>(
                svc.collection_exists(&db, &coll)? && svc.drop_collection(&db, &coll)?,
            )
        })
        .await?;
    if dropped {
        tracing::info!(%database, %collection, "collection dropped");
        Ok(StatusCode::OK)
    } else {
        Err(ServerError::CollectionNotFound(collection))
    }
}

type Shared = State<Arc<ServerState>>;
type Caller = Extension<Principal>;

/// GET, PUT and DELETE for an object whose id is a fixed segment (`count`,
/// `find`, ...) of a query route at `/{db}/{collection}/<id>`.
pub fn reserved_id(id: &'static str) -> MethodRouter<Arc<ServerState>> {
    reserved_id_writes(id).get(
        move |state: Shared, principal: Caller, Path((db, coll)): Path<(String, String)>| {
            get_object(state, principal, Path((db, coll, id.to_string())))
        },
    )
}

/// PUT and DELETE only, for segments whose GET is taken by the query route.
pub fn reserved_id_writes(id: &'static str) -> MethodRouter<Arc<ServerState>> {
    put(
        move |state: Shared,
              principal: Caller,
              Path((db, coll)): Path<(String, String)>,
              query: Query<FormatQuery>,
              body: Bytes| {
            replace_object(state, principal, Path((db, coll, id.to_string())), query, body)
        },
    )
    .delete(
        move |state: Shared, principal: Caller, Path((db, coll)): Path<(String, String)>| {
            delete_object(state, principal, Path((db, coll, id.to_string())))
        },
    )
}

/// GET, PUT and DELETE on objects of a database named like a fixed prefix
/// route (`multi`, `bulk`) at `/<database>/{collection}/{id}`.
pub fn reserved_database(database: &'static str) -> MethodRouter<Arc<ServerState>> {
    get(
        move |state: Shared, principal: Caller, Path((coll, id)): Path<(String, String)>| {
            get_object(state, principal, Path((database.to_string(), coll, id)))
        },
    )
    .put(
        move |state: Shared,
              principal: Caller,
              Path((coll, id)): Path<(String, String)>,
              query: Query<FormatQuery>,
              body: Bytes| {
            replace_object(state, principal, Path((database.to_string(), coll, id)), query, body)
        },
    )
    .delete(
        move |state: Shared, principal: Caller, Path((coll, id)): Path<(String, String)>| {
            delete_object(state, principal, Path((database.to_string(), coll, id)))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_format_accepts_names_and_numbers() {
        let parse = |q: &str| -> ResponseFormat {
            serde_json::from_value::<FormatQuery>(serde_json::json!({ "responseFormat": q }))
                .unwrap()
                .response_format
        };
        assert_eq!(parse("onlyId"), ResponseFormat::OnlyId);
        assert_eq!(parse("1"), ResponseFormat::OnlyId);
        assert_eq!(parse("entireObject"), ResponseFormat::EntireObject);
        assert_eq!(FormatQuery::default().response_format, ResponseFormat::EntireObject);
    }

    #[test]
    fn ids_response_shapes() {
        assert_eq!(
            serde_json::to_value(IdsResponse::inserted(vec!["a".into()])).unwrap(),
            serde_json::json!({"inserted": 1, "ids": ["a"]})
        );
        assert_eq!(
            serde_json::to_value(IdsResponse::updated(vec!["a".into()])).unwrap(),
            serde_json::json!({"updated": 1, "ids": ["a"]})
        );
    }
}
