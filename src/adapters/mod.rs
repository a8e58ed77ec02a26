pub mod http_client;
pub mod http_handler;
pub mod memory_store;
pub mod poller;

/// Re-export commonly used types from adapters
pub use http_client::HttpClientAdapter;
pub use http_handler::{AppState, build_router};
pub use memory_store::{MemoryRegistryStore, MemorySetStore};
pub use poller::HealthPoller;
