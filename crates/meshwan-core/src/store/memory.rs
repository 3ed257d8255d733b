// ── In-memory document store ──
//
// Concurrent map keyed by (collection, key). Every mutation bumps a
// version counter observable through a `watch` channel.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{DocumentStore, StoreKey};
use crate::error::Result;

type Tags = BTreeMap<String, Vec<u8>>;

/// One stored document, as dumped by [`MemoryStore::records`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub collection: String,
    pub key: StoreKey,
    pub tags: Tags,
}

pub struct MemoryStore {
    docs: DashMap<(String, StoreKey), Tags>,
    version: watch::Sender<u64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            docs: DashMap::new(),
            version,
        }
    }

    pub(crate) fn from_records(records: Vec<Record>) -> Self {
        let store = Self::new();
        for record in records {
            store.docs.insert((record.collection, record.key), record.tags);
        }
        store
    }

    /// Every document, sorted by collection then key.
    pub(crate) fn records(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .docs
            .iter()
            .map(|entry| Record {
                collection: entry.key().0.clone(),
                key: entry.key().1.clone(),
                tags: entry.value().clone(),
            })
            .collect();
        records.sort_by(|a, b| (&a.collection, &a.key).cmp(&(&b.collection, &b.key)));
        records
    }

    /// Subscribe to the mutation counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub(crate) fn insert_sync(&self, collection: &str, key: &StoreKey, tag: &str, value: Vec<u8>) {
        self.docs
            .entry((collection.to_owned(), key.clone()))
            .or_default()
            .insert(tag.to_owned(), value);
        self.bump_version();
    }

    pub(crate) fn find_sync(&self, collection: &str, key: &StoreKey, tag: &str) -> Vec<Vec<u8>> {
        if !key.is_query() {
            return self
                .docs
                .get(&(collection.to_owned(), key.clone()))
                .and_then(|tags| tags.get(tag).cloned())
                .into_iter()
                .collect();
        }

        let mut hits: Vec<(StoreKey, Vec<u8>)> = self
            .docs
            .iter()
            .filter(|entry| entry.key().0 == collection && entry.key().1.matches(key))
            .filter_map(|entry| {
                entry
                    .value()
                    .get(tag)
                    .map(|v| (entry.key().1.clone(), v.clone()))
            })
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        hits.into_iter().map(|(_, v)| v).collect()
    }

    pub(crate) fn remove_sync(&self, collection: &str, key: &StoreKey) -> bool {
        let removed = self
            .docs
            .remove(&(collection.to_owned(), key.clone()))
            .is_some();
        if removed {
            self.bump_version();
        }
        removed
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        self.insert_sync(collection, key, tag, value);
        Ok(())
    }

    async fn find(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self.find_sync(collection, key, tag))
    }

    async fn remove(&self, collection: &str, key: &StoreKey) -> Result<()> {
        self.remove_sync(collection, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(overlay: &str, hub: &str) -> StoreKey {
        StoreKey::new().with("overlay", overlay).with("hub", hub)
    }

    #[tokio::test]
    async fn wildcard_find_is_key_ordered_and_scoped() {
        let store = MemoryStore::new();
        store.insert("hubs", &key("ov1", "h2"), "data", b"2".to_vec()).await.ok();
        store.insert("hubs", &key("ov1", "h1"), "data", b"1".to_vec()).await.ok();
        store.insert("hubs", &key("ov2", "h9"), "data", b"9".to_vec()).await.ok();
        store.insert("devices", &key("ov1", "h3"), "data", b"x".to_vec()).await.ok();

        let found = store.find("hubs", &key("ov1", ""), "data").await.unwrap_or_default();
        assert_eq!(found, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[tokio::test]
    async fn mutations_bump_version() {
        let store = MemoryStore::new();
        let rx = store.subscribe();
        store.insert("hubs", &key("ov1", "h1"), "data", vec![1]).await.ok();
        store.insert("hubs", &key("ov1", "h1"), "status", vec![2]).await.ok();
        assert_eq!(*rx.borrow(), 2);

        store.remove("hubs", &key("ov1", "h1")).await.ok();
        assert_eq!(store.version(), 3);
        assert!(store.is_empty());

        // removing a missing key is not a mutation
        store.remove("hubs", &key("ov1", "h1")).await.ok();
        assert_eq!(store.version(), 3);
    }
}
