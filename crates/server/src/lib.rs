//! objgate server - HTTP REST gateway for the objgate document store
//!
//! Exposes document CRUD, raw JSON filters, plain-text search strings and
//! aggregation pipelines over HTTP. Every data route is authorized per
//! collection and action.
//!
//! # Features
//!
//! - **Authentication**: API keys mapped to scopes, with per-key rate limiting
//! - **Authorization**: `{system}.{service}.{db}.{collection}.{action}` scopes
//! - **Middleware**: Compression, CORS, request ID tracking, structured logging
//! - **Configuration**: Environment variable and file-based configuration
//! - **Graceful Shutdown**: Proper signal handling for production deployments
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! ## Public Endpoints (No Authentication)
//!
//! - `GET /` - API information
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe (store round trip)
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Protected Endpoints (API Key + Scope Required)
//!
//! All under `/api/1.0`:
//!
//! - `GET|POST|DELETE /{db}/{collection}` - List, insert with generated id, drop
//! - `GET|POST|PUT|DELETE /{db}/{collection}/{id}` - Object CRUD
//! - `POST /{db}/{collection}/find` - Find with a JSON filter
//! - `GET /{db}/{collection}/search?qs=` - Find with a search string
//! - `GET /{db}/{collection}/search/explain?qs=` - Show the compiled filter
//! - `POST /{db}/{collection}/count` - Count with a JSON filter
//! - `POST /{db}/{collection}/distinct/{field}` - Distinct values
//! - `POST /{db}/{collection}/aggregate` - Aggregation pipeline
//! - `POST /multi/{db}/{collection}` - Insert a JSON array
//! - `POST /bulk/{db}/{collection}` - Insert rows of an uploaded CSV

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use auth::{Permission, Principal};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
