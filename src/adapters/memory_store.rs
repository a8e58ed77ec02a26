//! In-process store adapters.
//!
//! These stand in for the external embedded KV store and shared set store
//! while honoring their access patterns: the registry adapter keeps an
//! ordered map of serialized, versioned `CdnEntry` values behind a
//! single-writer lock, and readers always see whole entries (snapshot at
//! entry granularity). Swapping in a real embedded store means implementing
//! the same two port traits against it.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    core::backend::{CdnEntry, ENTRY_SCHEMA_VERSION},
    ports::{
        registry_store::{RegistryStore, StoreError, StoreResult},
        set_store::SetStore,
    },
};

/// Ordered in-memory registry store keyed by backend URL.
pub struct MemoryRegistryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryRegistryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn decode(key: &str, raw: &str) -> StoreResult<CdnEntry> {
        let entry: CdnEntry =
            serde_json::from_str(raw).map_err(|e| StoreError::CorruptEntry {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if entry.version != ENTRY_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                key: key.to_string(),
                found: entry.version,
                expected: ENTRY_SCHEMA_VERSION,
            });
        }
        Ok(entry)
    }
}

impl Default for MemoryRegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn put(&self, url: &str, entry: &CdnEntry) -> StoreResult<()> {
        let raw = serde_json::to_string(entry).map_err(|e| StoreError::CorruptEntry {
            key: url.to_string(),
            reason: e.to_string(),
        })?;
        self.entries.write().await.insert(url.to_string(), raw);
        Ok(())
    }

    async fn get(&self, url: &str) -> StoreResult<Option<CdnEntry>> {
        let entries = self.entries.read().await;
        match entries.get(url) {
            Some(raw) => Ok(Some(Self::decode(url, raw)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, url: &str) -> StoreResult<()> {
        self.entries.write().await.remove(url);
        Ok(())
    }

    async fn scan_all(&self) -> StoreResult<Vec<(String, CdnEntry)>> {
        let entries = self.entries.read().await;
        let mut snapshot = Vec::with_capacity(entries.len());
        for (url, raw) in entries.iter() {
            snapshot.push((url.clone(), Self::decode(url, raw)?));
        }
        Ok(snapshot)
    }
}

/// In-memory shared-set store holding named sets of strings.
pub struct MemorySetStore {
    sets: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl MemorySetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SetStore for MemorySetStore {
    async fn add_members(&self, set: &str, members: &[String]) -> StoreResult<()> {
        let mut sets = self.sets.write().await;
        let target = sets.entry(set.to_string()).or_default();
        for member in members {
            target.insert(member.clone());
        }
        Ok(())
    }

    async fn list_members(&self, set: &str) -> StoreResult<Vec<String>> {
        let sets = self.sets.read().await;
        Ok(sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn test_put_get_delete_round_trip() {
        let store = MemoryRegistryStore::new();
        let entry = CdnEntry::registered(Utc::now());

        store.put("http://a", &entry).await.unwrap();
        assert_eq!(store.get("http://a").await.unwrap(), Some(entry));

        store.delete("http://a").await.unwrap();
        assert_eq!(store.get("http://a").await.unwrap(), None);

        // Deleting an absent key is a no-op.
        store.delete("http://a").await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_all_is_key_ordered() {
        let store = MemoryRegistryStore::new();
        let entry = CdnEntry::registered(Utc::now());
        for url in ["http://c", "http://a", "http://b"] {
            store.put(url, &entry).await.unwrap();
        }

        let keys: Vec<String> = store
            .scan_all()
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["http://a", "http://b", "http://c"]);
    }

    #[tokio::test]
    async fn test_unsupported_schema_rejected_on_load() {
        let store = MemoryRegistryStore::new();
        store.entries.write().await.insert(
            "http://a".to_string(),
            r#"{"version":2,"load":1,"healthy":true,"fail_count":0,"updated_at":"2024-01-01T00:00:00Z"}"#.to_string(),
        );

        match store.get("http://a").await {
            Err(StoreError::UnsupportedSchema { found, .. }) => assert_eq!(found, 2),
            other => panic!("expected UnsupportedSchema, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_corrupt_entry_rejected_on_load() {
        let store = MemoryRegistryStore::new();
        store
            .entries
            .write()
            .await
            .insert("http://a".to_string(), "{not json".to_string());

        assert!(matches!(
            store.get("http://a").await,
            Err(StoreError::CorruptEntry { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_store_membership() {
        let store = MemorySetStore::new();
        assert!(store.list_members("special").await.unwrap().is_empty());

        store
            .add_members("special", &["b".to_string(), "a".to_string()])
            .await
            .unwrap();
        store
            .add_members("special", &["a".to_string()])
            .await
            .unwrap();

        assert_eq!(
            store.list_members("special").await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
