//! # objgate document store
//!
//! Schemaless JSON documents grouped into `database/collection` namespaces,
//! persisted through a pluggable [`StorageBackend`].
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: an in-memory ordered map (ideal for testing) and
//!   a Redb backend for persistent, on-disk storage (`backend-redb` feature,
//!   on by default).
//! - **Compression**: documents are serialized to JSON and compressed with
//!   Zstd by default before being written.
//! - **Queries**: [`Filter`] evaluates Mongo-style filter documents,
//!   [`FindOptions`] pages and sorts results, [`Pipeline`] runs aggregation
//!   stages.
//! - **Write policy**: collections listed in [`ImmutableCollections`] reject
//!   every insert, replace, delete and drop.
//!
//! ## Example Usage
//!
//! ```
//! use serde_json::json;
//! use store::{DocumentStore, Filter, FindOptions, StoreConfig};
//!
//! let store = DocumentStore::new(StoreConfig::default()).unwrap();
//! store
//!     .insert("shop", "orders", Some("o-1"), json!({"status": "A", "qty": 3}))
//!     .unwrap();
//!
//! let filter = Filter::parse(&json!({"qty": {"$gte": 2}})).unwrap();
//! let found = store
//!     .find("shop", "orders", &filter, &FindOptions::default())
//!     .unwrap();
//! assert_eq!(found[0]["_id"], "o-1");
//! ```

mod aggregate;
mod backend;
mod codec;
mod error;
mod filter;
mod immutable;
mod order;

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use aggregate::{Accumulator, Pipeline, Stage};
pub use backend::{BackendConfig, InMemoryBackend, StorageBackend};
pub use codec::{CompressionCodec, CompressionConfig};
pub use error::StoreError;
pub use filter::{compare_same_kind, resolve_path, values_equal, Filter, Predicate};
pub use immutable::ImmutableCollections;
pub use order::{sort_documents, total_cmp, FindOptions, SortDirection, SortSpec};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

/// A stored document: a JSON object carrying a string `_id`.
pub type Document = Map<String, Value>;

/// Field every document is keyed by.
pub const ID_FIELD: &str = "_id";

/// Configuration for the document store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub compression: CompressionConfig,
    pub immutable_collections: ImmutableCollections,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_immutable_collections(mut self, immutable: ImmutableCollections) -> Self {
        self.immutable_collections = immutable;
        self
    }
}

/// Document store over a [`StorageBackend`].
pub struct DocumentStore {
    backend: Box<dyn StorageBackend>,
    compression: CompressionConfig,
    immutable: ImmutableCollections,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("compression", &self.compression)
            .field("immutable", &self.immutable)
            .finish_non_exhaustive()
    }
}

fn namespace(database: &str, collection: &str) -> String {
    format!("{database}/{collection}")
}

/// Database and collection names must be non-empty, must not contain `/`
/// or NUL, and must not start with `$`.
pub fn validate_name(kind: &str, name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidName(format!("{kind} name is empty")));
    }
    if name.contains('/') || name.contains('\0') || name.starts_with('$') {
        return Err(StoreError::InvalidName(format!(
            "{kind} name '{name}' must not contain '/' or NUL or start with '$'"
        )));
    }
    Ok(())
}

fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.contains('\0') {
        return Err(StoreError::InvalidDocument(format!(
            "'{id}' is not a valid document id"
        )));
    }
    Ok(())
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn into_document(body: Value) -> Result<Document, StoreError> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            filter::kind_name(&other)
        ))),
    }
}

/// Rebuild `doc` with `_id` set to `id` as its first field.
fn with_id(id: &str, doc: Document) -> Document {
    let mut out = Document::with_capacity(doc.len() + 1);
    out.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    out.extend(doc.into_iter().filter(|(k, _)| k != ID_FIELD));
    out
}

/// The `_id` a document brings with it, if any.
fn body_id(doc: &Document) -> Result<Option<String>, StoreError> {
    match doc.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => {
            validate_id(id)?;
            Ok(Some(id.clone()))
        }
        Some(other) => Err(StoreError::InvalidDocument(format!(
            "'_id' must be a string, got {}",
            filter::kind_name(other)
        ))),
    }
}

impl DocumentStore {
    /// Build the store and its backend from configuration.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let backend = config.backend.build()?;
        Self::with_backend(config, backend)
    }

    /// Use an already constructed backend; `config.backend` is ignored.
    pub fn with_backend(
        config: StoreConfig,
        backend: Box<dyn StorageBackend>,
    ) -> Result<Self, StoreError> {
        config.compression.validate()?;
        Ok(Self {
            backend,
            compression: config.compression,
            immutable: config.immutable_collections,
        })
    }

    pub fn immutable_collections(&self) -> &ImmutableCollections {
        &self.immutable
    }

    fn checked_namespace(&self, database: &str, collection: &str) -> Result<String, StoreError> {
        validate_name("database", database)?;
        validate_name("collection", collection)?;
        Ok(namespace(database, collection))
    }

    fn writable_namespace(&self, database: &str, collection: &str) -> Result<String, StoreError> {
        let ns = self.checked_namespace(database, collection)?;
        self.immutable.check(database, collection)?;
        Ok(ns)
    }

    /// Decode every document in a namespace, in id order, keeping those
    /// `keep` accepts.
    fn load(
        &self,
        ns: &str,
        mut keep: impl FnMut(&Document) -> bool,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs = Vec::new();
        self.backend.scan(ns, &mut |bytes| {
            let doc = self.compression.decode(bytes)?;
            if keep(&doc) {
                docs.push(doc);
            }
            Ok(())
        })?;
        Ok(docs)
    }

    pub fn get(
        &self,
        database: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let ns = self.checked_namespace(database, collection)?;
        match self.backend.get(&ns, id)? {
            Some(bytes) => Ok(Some(self.compression.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every document in the collection, in id order.
    pub fn get_all(&self, database: &str, collection: &str) -> Result<Vec<Document>, StoreError> {
        let ns = self.checked_namespace(database, collection)?;
        self.load(&ns, |_| true)
    }

    /// Insert one document.
    ///
    /// An explicit `id` overrides any `_id` in the body. Without one, a
    /// string `_id` from the body is kept, otherwise a fresh id is
    /// generated. Returns the stored document.
    pub fn insert(
        &self,
        database: &str,
        collection: &str,
        id: Option<&str>,
        body: Value,
    ) -> Result<Document, StoreError> {
        let ns = self.writable_namespace(database, collection)?;
        let doc = into_document(body)?;
        let id = match id {
            Some(id) => {
                validate_id(id)?;
                id.to_string()
            }
            None => body_id(&doc)?.unwrap_or_else(new_id),
        };
        let doc = with_id(&id, doc);
        let bytes = self.compression.encode(&doc)?;
        self.backend.insert_new(&ns, vec![(id.clone(), bytes)])?;
        debug!(database, collection, id = %id, "document inserted");
        Ok(doc)
    }

    /// Insert several documents atomically; returns their ids in input order.
    ///
    /// Every id is resolved and checked before anything is written.
    pub fn insert_many(
        &self,
        database: &str,
        collection: &str,
        bodies: Vec<Value>,
    ) -> Result<Vec<String>, StoreError> {
        let ns = self.writable_namespace(database, collection)?;
        let mut ids: Vec<String> = Vec::with_capacity(bodies.len());
        let mut entries = Vec::with_capacity(bodies.len());
        for (i, body) in bodies.into_iter().enumerate() {
            let doc = into_document(body).map_err(|e| match e {
                StoreError::InvalidDocument(msg) => {
                    StoreError::InvalidDocument(format!("item {i}: {msg}"))
                }
                other => other,
            })?;
            let id = body_id(&doc)?.unwrap_or_else(new_id);
            if ids.contains(&id) {
                return Err(StoreError::DuplicateId {
                    id,
                    collection: collection.to_string(),
                });
            }
            let doc = with_id(&id, doc);
            entries.push((id.clone(), self.compression.encode(&doc)?));
            ids.push(id);
        }
        if entries.is_empty() {
            return Ok(ids);
        }
        self.backend.insert_new(&ns, entries)?;
        debug!(database, collection, count = ids.len(), "documents inserted");
        Ok(ids)
    }

    /// Replace an existing document. Returns `None` when `id` is absent.
    pub fn replace(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<Option<Document>, StoreError> {
        let ns = self.writable_namespace(database, collection)?;
        validate_id(id)?;
        let doc = with_id(id, into_document(body)?);
        let bytes = self.compression.encode(&doc)?;
        if !self.backend.replace(&ns, id, &bytes)? {
            return Ok(None);
        }
        debug!(database, collection, id, "document replaced");
        Ok(Some(doc))
    }

    /// Delete a document. Returns `false` when `id` is absent.
    pub fn delete(&self, database: &str, collection: &str, id: &str) -> Result<bool, StoreError> {
        let ns = self.writable_namespace(database, collection)?;
        let deleted = self.backend.delete(&ns, id)?;
        if deleted {
            debug!(database, collection, id, "document deleted");
        }
        Ok(deleted)
    }

    /// Documents matching `filter`, sorted then paged per `options`.
    ///
    /// Without a sort, results come back in id order.
    pub fn find(
        &self,
        database: &str,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let ns = self.checked_namespace(database, collection)?;
        let mut docs = self.load(&ns, |doc| filter.matches(doc))?;
        if let Some(sort) = &options.sort {
            sort_documents(&mut docs, std::slice::from_ref(sort));
        }
        Ok(options.page(docs))
    }

    pub fn count(
        &self,
        database: &str,
        collection: &str,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        let ns = self.checked_namespace(database, collection)?;
        let mut count = 0u64;
        self.backend.scan(&ns, &mut |bytes| {
            if filter.matches(&self.compression.decode(bytes)?) {
                count += 1;
            }
            Ok(())
        })?;
        Ok(count)
    }

    /// Unique values of `field` among matching documents, in order of first
    /// appearance. Array values contribute their elements.
    pub fn distinct(
        &self,
        database: &str,
        collection: &str,
        field: &str,
        filter: &Filter,
    ) -> Result<Vec<Value>, StoreError> {
        let ns = self.checked_namespace(database, collection)?;
        let mut values: Vec<Value> = Vec::new();
        let mut push = |value: &Value| {
            if !values.iter().any(|seen| values_equal(seen, value)) {
                values.push(value.clone());
            }
        };
        self.backend.scan(&ns, &mut |bytes| {
            let doc = self.compression.decode(bytes)?;
            if !filter.matches(&doc) {
                return Ok(());
            }
            match resolve_path(&doc, field) {
                Some(Value::Array(items)) => items.iter().for_each(&mut push),
                Some(value) => push(value),
                None => {}
            }
            Ok(())
        })?;
        Ok(values)
    }

    pub fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.get_all(database, collection)?;
        Ok(pipeline.run(docs))
    }

    /// A collection exists while it holds at least one document.
    pub fn collection_exists(&self, database: &str, collection: &str) -> Result<bool, StoreError> {
        let ns = self.checked_namespace(database, collection)?;
        self.backend.contains_namespace(&ns)
    }

    /// Remove a collection. Returns `false` when it held no documents.
    pub fn drop_collection(&self, database: &str, collection: &str) -> Result<bool, StoreError> {
        let ns = self.writable_namespace(database, collection)?;
        let dropped = self.backend.drop_namespace(&ns)?;
        if dropped {
            debug!(database, collection, "collection dropped");
        }
        Ok(dropped)
    }

    /// Collections of `database` that hold documents, sorted.
    pub fn list_collections(&self, database: &str) -> Result<Vec<String>, StoreError> {
        validate_name("database", database)?;
        let prefix = format!("{database}/");
        Ok(self
            .backend
            .namespaces()?
            .into_iter()
            .filter_map(|ns| ns.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.flush()
    }
}
