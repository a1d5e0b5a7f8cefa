//! Multi-object inserts: a JSON array body, or a CSV upload whose header
//! row names the fields.

use crate::auth::{Permission, Principal};
use crate::error::{ServerError, ServerResult};
use crate::routes::objects::parse_body;
use crate::routes::IdsResponse;
use crate::state::ServerState;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::{Extension, Json};
use objgate::{Document, QueryCompiler};
use serde_json::Value;
use std::sync::Arc;

/// Multipart field carrying the CSV file.
pub const CSV_FIELD: &str = "csv";

/// POST /multi/{db}/{collection}; body is a JSON array of objects
pub async fn multi_insert(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
    body: Bytes,
) -> ServerResult<Json<IdsResponse>> {
    state.authorize(&principal, &database, &collection, Permission::Insert)?;
    let Value::Array(items) = parse_body(&body)? else {
        return Err(ServerError::BadRequest(
            "multi-insert body must be a JSON array".to_string(),
        ));
    };

    let (db, coll) = (database.clone(), collection.clone());
    let ids = state
        .run(move |svc| svc.insert_many(&db, &coll, items))
        .await?;
    tracing::info!(%database, %collection, inserted = ids.len(), "multi insert");
    Ok(Json(IdsResponse::inserted(ids)))
}

/// POST /bulk/{db}/{collection}; multipart upload with a `csv` field
pub async fn bulk_insert_csv(
    State(state): State<Arc<ServerState>>,
    Extension(principal): Extension<Principal>,
    Path((database, collection)): Path<(String, String)>,
    mut multipart: Multipart,
) -> ServerResult<Json<IdsResponse>> {
    state.authorize(&principal, &database, &collection, Permission::Insert)?;

    let mut csv_bytes = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(CSV_FIELD) {
            csv_bytes = Some(field.bytes().await?);
            break;
        }
    }
    let Some(csv_bytes) = csv_bytes else {
        return Err(ServerError::BadRequest(format!(
            "multipart field '{CSV_FIELD}' is required"
        )));
    };

    let rows = csv_to_documents(&csv_bytes, &state.csv_typing)?;
    if rows.is_empty() {
        return Err(ServerError::BadRequest("Csv file has no data".to_string()));
    }

    let bodies = rows.into_iter().map(Value::Object).collect();
    let (db, coll) = (database.clone(), collection.clone());
    let ids = state
        .run(move |svc| svc.insert_many(&db, &coll, bodies))
        .await?;
    tracing::info!(%database, %collection, inserted = ids.len(), "bulk csv insert");
    Ok(Json(IdsResponse::inserted(ids)))
}

/// One document per data row, keyed by the header row. Cells are typed
/// like search-string literals.
pub fn csv_to_documents(data: &[u8], typing: &QueryCompiler) -> ServerResult<Vec<Document>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    let mut documents = Vec::new();
    for record in reader.records() {
        let record = record?;
        let doc: Document = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.to_string(), typing.infer_literal(cell).to_json()))
            .collect();
        documents.push(doc);
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgate::{CompilerConfig, MatchMode};
    use serde_json::json;

    fn anchored() -> QueryCompiler {
        QueryCompiler::new(CompilerConfig::default().with_matching(MatchMode::Anchored)).unwrap()
    }

    #[test]
    fn csv_cells_are_typed() {
        let data = b"title,pages,in_print,code\nDune,412,true,v2\nEmma, 474 ,false,007\n";
        let docs = csv_to_documents(data, &anchored()).unwrap();
        assert_eq!(
            docs.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![
                json!({"title": "Dune", "pages": 412, "in_print": true, "code": "v2"}),
                json!({"title": "Emma", "pages": 474, "in_print": false, "code": 7}),
            ]
        );
    }

    #[test]
    fn header_only_csv_has_no_rows() {
        assert!(csv_to_documents(b"a,b\n", &anchored()).unwrap().is_empty());
        assert!(csv_to_documents(b"", &anchored()).unwrap().is_empty());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = csv_to_documents(b"a,b\n1,2,3\n", &anchored()).unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }
}
