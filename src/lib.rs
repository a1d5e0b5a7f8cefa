//! Workspace umbrella crate for objgate.
//!
//! [`ObjectService`] is the single entry point the HTTP gateway calls: it
//! owns a [`DocumentStore`] and a [`QueryCompiler`], routes plain-text
//! search strings through the compiler, and reports every operation to an
//! optional [`ServiceMetrics`] observer.
//!
//! ```
//! use objgate::{FindOptions, ObjectService, ServiceConfig};
//! use serde_json::json;
//!
//! let service = ObjectService::new(&ServiceConfig::default()).unwrap();
//! service
//!     .insert("shop", "orders", None, json!({"status": "A", "weight": 70}))
//!     .unwrap();
//!
//! let hits = service
//!     .search("shop", "orders", Some("status:A weight>=50"), &FindOptions::default())
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

mod config;

pub use crate::config::{ConfigLoadError, HealthConfig, ServiceConfig};
pub use query::{
    CompileReport, CompilerConfig, FieldFilter, FilterExpression, MatchMode, QueryCompiler,
    QueryError, ScalarValue, SkipReason, SkippedTerm, DEFAULT_OPERATOR_PREFIX,
};
pub use store::{
    BackendConfig, CompressionCodec, CompressionConfig, Document, DocumentStore, Filter,
    FindOptions, ImmutableCollections, Pipeline, SortDirection, SortSpec, StoreConfig, StoreError,
    ID_FIELD,
};

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while assembling an [`ObjectService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigLoadError),
    #[error("compiler setup failed: {0}")]
    Compiler(#[from] QueryError),
    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),
}

/// Metrics observer for service operations.
///
/// `operation` is a stable name such as `"find"` or `"search"`.
pub trait ServiceMetrics: Send + Sync {
    fn record_operation(&self, operation: &'static str, latency: Duration, success: bool);
}

struct MetricsSpan<'a> {
    recorder: &'a dyn ServiceMetrics,
    operation: &'static str,
    start: Instant,
}

impl<'a> MetricsSpan<'a> {
    fn start(recorder: Option<&'a Arc<dyn ServiceMetrics>>, operation: &'static str) -> Option<Self> {
        recorder.map(|recorder| Self {
            recorder: recorder.as_ref(),
            operation,
            start: Instant::now(),
        })
    }

    fn finish(self, success: bool) {
        self.recorder
            .record_operation(self.operation, self.start.elapsed(), success);
    }
}

/// Outcome of a readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Document operations plus search-string compilation.
pub struct ObjectService {
    store: DocumentStore,
    compiler: QueryCompiler,
    health: HealthConfig,
    metrics: Option<Arc<dyn ServiceMetrics>>,
    probes: AtomicU64,
}

impl fmt::Debug for ObjectService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectService")
            .field("store", &self.store)
            .field("compiler", &self.compiler)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

/// Store-native rendering of a compiled filter. The evaluator only reads
/// `$`-prefixed operators, whatever prefix the compiler renders for display.
fn store_filter(expression: &FilterExpression) -> Result<Filter, StoreError> {
    Filter::parse(&expression.to_document(DEFAULT_OPERATOR_PREFIX))
}

impl ObjectService {
    /// Validate the configuration and build the store it describes.
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let store = DocumentStore::new(config.store.clone())?;
        Self::with_store(config, store)
    }

    /// Use an already built store; `config.store` is ignored.
    pub fn with_store(config: &ServiceConfig, store: DocumentStore) -> Result<Self, ServiceError> {
        let compiler = QueryCompiler::new(config.compiler.clone())?;
        Ok(Self {
            store,
            compiler,
            health: config.health.clone(),
            metrics: None,
            probes: AtomicU64::new(0),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn is_immutable(&self, database: &str, collection: &str) -> bool {
        self.store
            .immutable_collections()
            .contains(database, collection)
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        database: &str,
        collection: &str,
        call: impl FnOnce(&DocumentStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let span = MetricsSpan::start(self.metrics.as_ref(), operation);
        let result = call(&self.store);
        if let Some(span) = span {
            span.finish(result.is_ok());
        }
        if let Err(err) = &result {
            if err.is_client_error() {
                debug!(operation, database, collection, error = %err, "request rejected");
            } else {
                warn!(operation, database, collection, error = %err, "store operation failed");
            }
        }
        result
    }

    pub fn get(
        &self,
        database: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.observe("get", database, collection, |s| s.get(database, collection, id))
    }

    pub fn get_all(&self, database: &str, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.observe("get_all", database, collection, |s| {
            s.get_all(database, collection)
        })
    }

    pub fn insert(
        &self,
        database: &str,
        collection: &str,
        id: Option<&str>,
        body: Value,
    ) -> Result<Document, StoreError> {
        self.observe("insert", database, collection, |s| {
            s.insert(database, collection, id, body)
        })
    }

    pub fn insert_many(
        &self,
        database: &str,
        collection: &str,
        bodies: Vec<Value>,
    ) -> Result<Vec<String>, StoreError> {
        self.observe("insert_many", database, collection, |s| {
            s.insert_many(database, collection, bodies)
        })
    }

    pub fn replace(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<Option<Document>, StoreError> {
        self.observe("replace", database, collection, |s| {
            s.replace(database, collection, id, body)
        })
    }

    pub fn delete(&self, database: &str, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.observe("delete", database, collection, |s| {
            s.delete(database, collection, id)
        })
    }

    pub fn find(
        &self,
        database: &str,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.observe("find", database, collection, |s| {
            s.find(database, collection, filter, options)
        })
    }

    /// [`find`](Self::find) over raw filter text; empty text matches all.
    pub fn find_str(
        &self,
        database: &str,
        collection: &str,
        filter: &str,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.observe("find", database, collection, |s| {
            s.find(database, collection, &Filter::parse_str(filter)?, options)
        })
    }

    pub fn count(
        &self,
        database: &str,
        collection: &str,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        self.observe("count", database, collection, |s| {
            s.count(database, collection, filter)
        })
    }

    pub fn count_str(
        &self,
        database: &str,
        collection: &str,
        filter: &str,
    ) -> Result<u64, StoreError> {
        self.observe("count", database, collection, |s| {
            s.count(database, collection, &Filter::parse_str(filter)?)
        })
    }

    pub fn distinct(
        &self,
        database: &str,
        collection: &str,
        field: &str,
        filter: &Filter,
    ) -> Result<Vec<Value>, StoreError> {
        self.observe("distinct", database, collection, |s| {
            s.distinct(database, collection, field, filter)
        })
    }

    pub fn distinct_str(
        &self,
        database: &str,
        collection: &str,
        field: &str,
        filter: &str,
    ) -> Result<Vec<Value>, StoreError> {
        self.observe("distinct", database, collection, |s| {
            s.distinct(database, collection, field, &Filter::parse_str(filter)?)
        })
    }

    /// Run a pipeline given as JSON text (an array of stages).
    pub fn aggregate_str(
        &self,
        database: &str,
        collection: &str,
        pipeline: &str,
    ) -> Result<Vec<Document>, StoreError> {
        self.observe("aggregate", database, collection, |s| {
            s.aggregate(database, collection, &Pipeline::parse_str(pipeline)?)
        })
    }

    pub fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, StoreError> {
        self.observe("aggregate", database, collection, |s| {
            s.aggregate(database, collection, pipeline)
        })
    }

    /// Compile `qs` and find the matching documents.
    pub fn search(
        &self,
        database: &str,
        collection: &str,
        qs: Option<&str>,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let expression = self.compiler.compile_opt(qs);
        debug!(database, collection, filter = %expression, "compiled search string");
        self.observe("search", database, collection, |s| {
            s.find(database, collection, &store_filter(&expression)?, options)
        })
    }

    /// Compile `qs` and count the matching documents.
    pub fn search_count(
        &self,
        database: &str,
        collection: &str,
        qs: Option<&str>,
    ) -> Result<u64, StoreError> {
        let expression = self.compiler.compile_opt(qs);
        self.observe("search_count", database, collection, |s| {
            s.count(database, collection, &store_filter(&expression)?)
        })
    }

    /// What `qs` compiles to and which terms were dropped.
    pub fn explain(&self, qs: Option<&str>) -> CompileReport {
        self.compiler
            .compile_with_diagnostics(qs.unwrap_or_default())
    }

    pub fn collection_exists(&self, database: &str, collection: &str) -> Result<bool, StoreError> {
        self.observe("collection_exists", database, collection, |s| {
            s.collection_exists(database, collection)
        })
    }

    pub fn drop_collection(&self, database: &str, collection: &str) -> Result<bool, StoreError> {
        self.observe("drop_collection", database, collection, |s| {
            s.drop_collection(database, collection)
        })
    }

    pub fn list_collections(&self, database: &str) -> Result<Vec<String>, StoreError> {
        self.observe("list_collections", database, "", |s| {
            s.list_collections(database)
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.store.flush()
    }

    /// Round-trip a document through the health-check collection.
    ///
    /// Slower than `degraded_after` reports `Degraded`; slower than
    /// `timeout`, or any store error, reports `Unhealthy`.
    pub fn probe_health(&self) -> HealthReport {
        let start = Instant::now();
        let outcome = self.health_round_trip();
        let elapsed = start.elapsed();
        let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let (status, detail) = match outcome {
            Err(err) => (HealthStatus::Unhealthy, Some(err.to_string())),
            Ok(()) if elapsed > self.health.timeout() => (
                HealthStatus::Unhealthy,
                Some(format!("probe took {latency_ms}ms")),
            ),
            Ok(()) if elapsed > self.health.degraded_after() => (
                HealthStatus::Degraded,
                Some(format!("probe took {latency_ms}ms")),
            ),
            Ok(()) => (HealthStatus::Healthy, None),
        };
        if status != HealthStatus::Healthy {
            warn!(%status, latency_ms, detail = detail.as_deref().unwrap_or(""), "health probe");
        }
        HealthReport {
            status,
            latency_ms,
            detail,
        }
    }

    fn health_round_trip(&self) -> Result<(), StoreError> {
        let (database, collection) = (&self.health.database, &self.health.collection);
        let id = format!("probe-{}", self.probes.fetch_add(1, Ordering::Relaxed));
        let body = serde_json::json!({ "probe": true });

        self.observe("health_probe", database, collection, |s| {
            s.insert(database, collection, Some(id.as_str()), body)?;
            let read = s.get(database, collection, &id);
            // Remove the probe even when the read failed.
            let deleted = s.delete(database, collection, &id);
            match read? {
                Some(_) => {}
                None => {
                    return Err(StoreError::backend(format!(
                        "probe document '{id}' was not readable after insert"
                    )));
                }
            }
            deleted.map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(&'static str, bool)>>,
    }

    impl ServiceMetrics for Recorder {
        fn record_operation(&self, operation: &'static str, _latency: Duration, success: bool) {
            self.calls.lock().unwrap().push((operation, success));
        }
    }

    fn service() -> ObjectService {
        ObjectService::new(&ServiceConfig::default()).unwrap()
    }

    #[test]
    fn search_uses_compiled_filter() {
        let service = service();
        service
            .insert_many(
                "db",
                "c",
                vec![
                    json!({"_id": "1", "status": "A", "weight": 70}),
                    json!({"_id": "2", "status": "A", "weight": 20}),
                    json!({"_id": "3", "status": "B", "weight": 90}),
                ],
            )
            .unwrap();
        let hits = service
            .search("db", "c", Some("status:A weight>=50"), &FindOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["_id"], "1");
        assert_eq!(service.search_count("db", "c", None).unwrap(), 3);
        assert_eq!(service.search_count("db", "c", Some("status!:A")).unwrap(), 1);
    }

    #[test]
    fn custom_prefix_does_not_change_search_semantics() {
        let config = ServiceConfig::default()
            .with_compiler(CompilerConfig::default().with_operator_prefix("@"));
        let service = ObjectService::new(&config).unwrap();
        service.insert("db", "c", None, json!({"n": 5})).unwrap();
        assert_eq!(service.search_count("db", "c", Some("n>1")).unwrap(), 1);
        assert_eq!(
            service.compiler().compile_to_string(Some("n>1")),
            r#"{"n":{"@gt":1}}"#
        );
    }

    #[test]
    fn explain_reports_dropped_terms() {
        let report = service().explain(Some("name>John status:A"));
        assert_eq!(report.filter.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(service().explain(None).filter.is_empty());
    }

    #[test]
    fn raw_filter_text_variants() {
        let service = service();
        service
            .insert_many(
                "db",
                "c",
                vec![json!({"_id": "1", "t": "x"}), json!({"_id": "2", "t": "y"})],
            )
            .unwrap();
        assert_eq!(service.count_str("db", "c", "").unwrap(), 2);
        assert_eq!(service.count_str("db", "c", r#"{"t":"x"}"#).unwrap(), 1);
        assert_eq!(
            service.distinct_str("db", "c", "t", "{}").unwrap(),
            vec![json!("x"), json!("y")]
        );
        assert!(matches!(
            service.find_str("db", "c", "{bad", &FindOptions::default()),
            Err(StoreError::InvalidFilter(_))
        ));
        assert!(matches!(
            service.aggregate_str("db", "c", r#"{"$match":{}}"#),
            Err(StoreError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn metrics_observer_sees_every_operation() {
        let recorder = Arc::new(Recorder::default());
        let service = service().with_metrics(recorder.clone());
        service.insert("db", "c", Some("a"), json!({})).unwrap();
        let _ = service.insert("db", "c", Some("a"), json!({}));
        service.search("db", "c", Some("x:1"), &FindOptions::default()).unwrap();
        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![("insert", true), ("insert", false), ("search", true)]
        );
    }

    #[test]
    fn health_probe_is_healthy_and_leaves_no_trace() {
        let service = service();
        let report = service.probe_health();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.detail.is_none());
        let health = HealthConfig::default();
        assert!(!service
            .collection_exists(&health.database, &health.collection)
            .unwrap());
    }

    #[test]
    fn health_probe_reports_unhealthy_store() {
        let config = ServiceConfig::default().with_store(
            StoreConfig::default().with_immutable_collections(
                ImmutableCollections::new().with("_healthcheckdatabase_", "_healthcheckcollection_"),
            ),
        );
        let report = ObjectService::new(&config).unwrap().probe_health();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.detail.unwrap().contains("immutable"));
    }

    #[test]
    fn health_status_serializes_lowercase() {
        let report = HealthReport {
            status: HealthStatus::Degraded,
            latency_ms: 1200,
            detail: None,
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"status": "degraded", "latency_ms": 1200})
        );
    }
}
