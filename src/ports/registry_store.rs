use async_trait::async_trait;
use thiserror::Error;

use crate::core::backend::CdnEntry;

/// Errors surfaced by the registry's backing key-value store.
///
/// Registry store failures are fatal to the operation that hit them: there is
/// no safe fallback for authoritative routing state, so callers propagate
/// these upward instead of guessing.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The store itself could not be reached or the I/O failed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A persisted value could not be decoded into a `CdnEntry`
    #[error("corrupt entry for key '{key}': {reason}")]
    CorruptEntry {
        /// The key whose value failed to decode
        key: String,
        /// Decoder error detail
        reason: String,
    },

    /// A persisted value decoded but carries an unsupported schema version
    #[error("unsupported schema version {found} for key '{key}' (expected {expected})")]
    UnsupportedSchema {
        /// The key whose value carried the version
        key: String,
        /// The version found in the stored value
        found: u32,
        /// The version this build understands
        expected: u32,
    },
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// RegistryStore defines the port (interface) over the embedded key-value
/// store holding one `CdnEntry` per backend URL.
///
/// Keys are normalized backend URLs; values are serialized, versioned
/// `CdnEntry` records. Implementations must serialize writes (single-writer
/// discipline) and guarantee that readers never observe a partially written
/// entry.
#[async_trait]
pub trait RegistryStore: Send + Sync + 'static {
    /// Write (insert or overwrite) the entry for a backend URL
    async fn put(&self, url: &str, entry: &CdnEntry) -> StoreResult<()>;

    /// Read the entry for a backend URL, if present
    async fn get(&self, url: &str) -> StoreResult<Option<CdnEntry>>;

    /// Remove the entry for a backend URL; removing an absent key is a no-op
    async fn delete(&self, url: &str) -> StoreResult<()>;

    /// Full ordered snapshot of all entries, keyed by URL
    async fn scan_all(&self) -> StoreResult<Vec<(String, CdnEntry)>>;
}
