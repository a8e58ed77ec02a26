//! CDN Director - a load-directing front door for a fleet of CDN backends.
//!
//! The director answers `/dl/{hash}/{path}` and `/watch/{hash}/{path}`
//! requests by picking the least-loaded healthy backend and redirecting (or
//! proxying) the client to it. It follows a **hexagonal architecture**: the
//! routing, registry and selection logic live in `core`, storage and HTTP
//! concerns behind `ports` traits with concrete `adapters`.
//!
//! # Features
//! - Shared CDN registry with per-backend load, health and failure tracking
//! - Active health polling of each backend's `/status` endpoint, with
//!   eviction after a configurable grace period
//! - Least-loaded selection with a tolerance band and a short-lived cache
//! - Sliding-window per-client per-hash rate limiting with an idle-key janitor
//! - Special-hash overrides and referrer trust derived from the registry
//! - Admin endpoints for registering backends, flagging hashes, and stats
//! - Metrics via the `metrics` facade & structured tracing via `tracing`
//! - Graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use cdn_director::config::{DirectorConfig, DirectorConfigValidator};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! // Load a configuration (YAML, JSON or TOML by extension)
//! let cfg: DirectorConfig = cdn_director::config::loader::load_config("config.toml").await?;
//! DirectorConfigValidator::validate(&cfg)?;
//! // You would normally wire this into the router and poller (see binary crate)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping business logic inside `core`. End users should prefer the
//! re-exports documented below instead of reaching into internal modules
//! directly.
//!
//! # Error Handling
//! All fallible APIs return `eyre::Result<T>` or a domain specific error type.
//! A custom error context is always attached using `WrapErr` for
//! debuggability.
//!
//! # Concurrency & Data Structures
//! For shared mutable maps the project uses `scc::HashMap` instead of
//! `dashmap` to maintain predictable performance characteristics under
//! contention. Read-mostly snapshots (selection cache, trusted hosts, special
//! hashes) use `arc-swap`.
//!
//! # License
//! Licensed under Apache-2.0.
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{AppState, HealthPoller, HttpClientAdapter, build_router},
    core::{CdnRegistry, DirectorService, SelectionEngine, SlidingWindowLimiter, SpecialSetCache, TrustedHosts},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
