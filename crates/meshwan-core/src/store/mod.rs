// ── Document persistence ──
//
// The orchestrator stores every object as JSON bytes under a composite
// `StoreKey` inside a named collection. A key field left empty in a query
// matches any value, which is how child listings ("all hubs of ov1") work.
//
// `DocumentStore` is the seam; `MemoryStore` and `FileStore` are the two
// implementations shipped here. `TypedStore` layers serde on top.

mod file;
pub mod keys;
mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Tag under which whole objects are stored.
pub const TAG_DATA: &str = "data";

// ── StoreKey ─────────────────────────────────────────────────────────

/// Composite key: ordered `field = value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreKey(BTreeMap<String, String>);

impl StoreKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.0.insert(field.to_owned(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Whether this (stored) key satisfies `query`.
    ///
    /// Both keys must have the same fields; empty query values are
    /// wildcards.
    pub fn matches(&self, query: &StoreKey) -> bool {
        self.0.len() == query.0.len()
            && query.0.iter().all(|(field, want)| {
                self.0
                    .get(field)
                    .is_some_and(|have| want.is_empty() || have == want)
            })
    }

    /// Whether any field is a wildcard.
    pub fn is_query(&self) -> bool {
        self.0.values().any(String::is_empty)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, value) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{field}={value}")?;
            first = false;
        }
        Ok(())
    }
}

// ── DocumentStore ────────────────────────────────────────────────────

/// Persistence collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace the value stored under `(collection, key, tag)`.
    async fn insert(&self, collection: &str, key: &StoreKey, tag: &str, value: Vec<u8>)
    -> Result<()>;

    /// Values under `tag` for every key matching `key`, in key order.
    async fn find(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<Vec<Vec<u8>>>;

    /// Remove every tag stored under the exact `key`.
    async fn remove(&self, collection: &str, key: &StoreKey) -> Result<()>;
}

// ── TypedStore ───────────────────────────────────────────────────────

/// Serde convenience over a [`DocumentStore`].
#[derive(Clone)]
pub struct TypedStore {
    inner: Arc<dyn DocumentStore>,
}

impl TypedStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner }
    }

    pub async fn put<T: Serialize + Sync>(
        &self,
        collection: &str,
        key: &StoreKey,
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.inner.insert(collection, key, TAG_DATA, bytes).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &StoreKey,
    ) -> Result<Option<T>> {
        let found = self.inner.find(collection, key, TAG_DATA).await?;
        match found.first() {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &StoreKey,
    ) -> Result<Vec<T>> {
        self.inner
            .find(collection, query, TAG_DATA)
            .await?
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(Into::into))
            .collect()
    }

    pub async fn exists(&self, collection: &str, key: &StoreKey) -> Result<bool> {
        Ok(!self.inner.find(collection, key, TAG_DATA).await?.is_empty())
    }

    pub async fn delete(&self, collection: &str, key: &StoreKey) -> Result<()> {
        self.inner.remove(collection, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::StoreKey;

    #[test]
    fn empty_fields_are_wildcards() {
        let stored = StoreKey::new().with("overlay", "ov1").with("hub", "h1");
        assert!(stored.matches(&StoreKey::new().with("overlay", "ov1").with("hub", "")));
        assert!(stored.matches(&StoreKey::new().with("overlay", "").with("hub", "")));
        assert!(!stored.matches(&StoreKey::new().with("overlay", "ov2").with("hub", "")));
        // different shape never matches
        assert!(!stored.matches(&StoreKey::new().with("overlay", "ov1")));
    }

    #[test]
    fn display_is_canonical() {
        let key = StoreKey::new().with("overlay", "ov1").with("device", "d1");
        assert_eq!(key.to_string(), "device=d1,overlay=ov1");
        assert!(!key.is_query());
        assert!(key.with("device", "").is_query());
    }
}
