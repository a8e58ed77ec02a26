pub mod http_client;
pub mod leadership;
pub mod registry_store;
pub mod set_store;

pub use http_client::HttpClient;
pub use leadership::{LeaderCheck, StaticLeader};
pub use registry_store::{RegistryStore, StoreError, StoreResult};
pub use set_store::SetStore;
