use crate::auth::{self, Permission, Principal};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use objgate::{CompilerConfig, MatchMode, ObjectService, QueryCompiler, ServiceMetrics};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Rate limit tracking: API key -> (count, window_start)
    pub rate_limiter: Arc<DashMap<String, (u32, std::time::Instant)>>,

    /// Document operations and search compilation (shared across requests)
    pub service: Arc<ObjectService>,

    /// Types CSV cells during bulk upload; anchored so `v2` stays a string
    pub csv_typing: Arc<QueryCompiler>,

    /// Prometheus render handle, present once a recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let mut service = ObjectService::new(&config.service)
            .map_err(|e| ServerError::Internal(format!("service setup failed: {e}")))?;
        if config.metrics_enabled {
            service = service.with_metrics(Arc::new(RecorderMetrics));
        }

        let csv_typing = QueryCompiler::new(
            CompilerConfig::default().with_matching(MatchMode::Anchored),
        )
        .map_err(|e| ServerError::Internal(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(DashMap::new()),
            service: Arc::new(service),
            csv_typing: Arc::new(csv_typing),
            metrics_handle: None,
        })
    }

    pub fn with_metrics_handle(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Resolve an API key to its principal
    pub fn principal_for(&self, key: &str) -> Option<Principal> {
        self.config
            .scopes_for(key)
            .map(|scopes| Principal::new(key_id(key), scopes))
    }

    /// Check that `principal` may perform `permission` on the collection
    pub fn authorize(
        &self,
        principal: &Principal,
        database: &str,
        collection: &str,
        permission: Permission,
    ) -> ServerResult<()> {
        // A dotted database name would make scopes ambiguous
        if database.contains('.') {
            return Err(ServerError::BadRequest(format!(
                "database name '{database}' must not contain '.'"
            )));
        }
        auth::authorize(
            principal,
            &self.config.system_name,
            &self.config.service_name,
            database,
            collection,
            permission,
        )
    }

    /// Run a service call on the blocking pool; the store does synchronous I/O
    pub async fn run<T, E, F>(&self, op: F) -> ServerResult<T>
    where
        F: FnOnce(&ObjectService) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<ServerError> + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || op(&service))
            .await
            .map_err(|e| ServerError::Internal(format!("store task failed: {e}")))?
            .map_err(Into::into)
    }

    /// Check rate limit for API key
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = std::time::Instant::now();
        let window = Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;

        let mut entry = self.rate_limiter.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        // Reset if window has passed
        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }

        // Check limit
        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }
}

/// Log-safe identifier for an API key: its first few characters.
fn key_id(key: &str) -> String {
    let prefix: String = key.chars().take(6).collect();
    format!("{prefix}…")
}

/// Reports service operations to the global `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderMetrics;

impl ServiceMetrics for RecorderMetrics {
    fn record_operation(&self, operation: &'static str, latency: Duration, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        metrics::counter!("objgate_operations_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        metrics::histogram!("objgate_operation_duration_seconds", "operation" => operation)
            .record(latency.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(limit: u32) -> ServerState {
        let mut config = ServerConfig::default().with_api_key("test-key", &["a.b.c.d.read"]);
        config.rate_limit_per_minute = limit;
        ServerState::new(config).unwrap()
    }

    #[test]
    fn rate_limit_counts_per_key() {
        let state = state(2);
        assert!(state.check_rate_limit("test-key"));
        assert!(state.check_rate_limit("test-key"));
        assert!(!state.check_rate_limit("test-key"));
        assert!(state.check_rate_limit("other-key"));
    }

    #[test]
    fn principal_lookup() {
        let state = state(10);
        let principal = state.principal_for("test-key").unwrap();
        assert!(principal.has_scope("a.b.c.d.read"));
        assert_eq!(principal.key_id, "test-k…");
        assert!(state.principal_for("nope").is_none());
    }

    #[test]
    fn authorize_uses_configured_names() {
        let state = ServerState::new(
            ServerConfig::default().with_api_key("k", &["objgate.objects.db.c.read"]),
        )
        .unwrap();
        let principal = state.principal_for("k").unwrap();
        assert!(state.authorize(&principal, "db", "c", Permission::Read).is_ok());
        assert!(state.authorize(&principal, "db", "c", Permission::Delete).is_err());
        assert!(matches!(
            state.authorize(&principal, "d.b", "c", Permission::Read),
            Err(ServerError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn run_moves_store_calls_off_the_runtime() {
        let state = state(10);
        let inserted = state
            .run(|svc| svc.insert("db", "c", Some("a"), serde_json::json!({"n": 1})))
            .await
            .unwrap();
        assert_eq!(inserted["n"], 1);

        let err = state
            .run(|svc| svc.insert("db", "c", Some("a"), serde_json::json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_ID");
    }
}
