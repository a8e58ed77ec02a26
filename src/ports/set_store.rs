use async_trait::async_trait;

use crate::ports::registry_store::StoreResult;

/// SetStore defines the port (interface) over the externally shared set store
/// used for special-hash membership.
///
/// The in-process special-set cache mirrors one named set from this store.
/// Writes go to the store first; readers work off a periodically refreshed
/// snapshot, so a slow or briefly unavailable store never blocks the request
/// path.
#[async_trait]
pub trait SetStore: Send + Sync + 'static {
    /// Add members to a named set. Adding an existing member is a no-op.
    async fn add_members(&self, set: &str, members: &[String]) -> StoreResult<()>;

    /// List all members of a named set. An unknown set is empty, not an error.
    async fn list_members(&self, set: &str) -> StoreResult<Vec<String>>;
}
