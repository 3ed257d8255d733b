// ── JSON-file document store ──
//
// A `MemoryStore` that is written back to disk after every mutation.
// Values are JSON documents themselves, so they are embedded as JSON in
// the state file to keep it readable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::memory::{MemoryStore, Record};
use super::{DocumentStore, StoreKey};
use crate::error::{CoreError, Result};

const STATE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StateFile {
    version: u32,
    documents: Vec<StateDocument>,
}

#[derive(Serialize, Deserialize)]
struct StateDocument {
    collection: String,
    key: StoreKey,
    tags: BTreeMap<String, serde_json::Value>,
}

pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the state file at `path`, starting empty if it does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let memory = match tokio::fs::read(&path).await {
            Ok(raw) => MemoryStore::from_records(decode(&path, &raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryStore::new(),
            Err(e) => return Err(storage_error(&path, &e)),
        };
        debug!(path = %path.display(), documents = memory.len(), "opened state file");
        Ok(Self {
            path,
            memory,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let raw = encode(self.memory.records())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| storage_error(parent, &e))?;
            }
        }
        // Write-then-rename so a crash never leaves a truncated file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| storage_error(&tmp, &e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_error(&self.path, &e))
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn insert(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        self.memory.insert_sync(collection, key, tag, value);
        self.flush().await
    }

    async fn find(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self.memory.find_sync(collection, key, tag))
    }

    async fn remove(&self, collection: &str, key: &StoreKey) -> Result<()> {
        if self.memory.remove_sync(collection, key) {
            self.flush().await?;
        }
        Ok(())
    }
}

fn encode(records: Vec<Record>) -> Result<Vec<u8>> {
    let documents = records
        .into_iter()
        .map(|record| {
            let tags = record
                .tags
                .into_iter()
                .map(|(tag, bytes)| Ok((tag, serde_json::from_slice::<serde_json::Value>(&bytes)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            Ok(StateDocument {
                collection: record.collection,
                key: record.key,
                tags,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(serde_json::to_vec_pretty(&StateFile {
        version: STATE_VERSION,
        documents,
    })?)
}

fn decode(path: &Path, raw: &[u8]) -> Result<Vec<Record>> {
    let state: StateFile = serde_json::from_slice(raw).map_err(|e| CoreError::Storage {
        message: format!("{} is not a valid state file: {e}", path.display()),
    })?;
    if state.version != STATE_VERSION {
        return Err(CoreError::Storage {
            message: format!(
                "{} has state version {}, expected {STATE_VERSION}",
                path.display(),
                state.version
            ),
        });
    }
    state
        .documents
        .into_iter()
        .map(|doc| {
            let tags = doc
                .tags
                .into_iter()
                .map(|(tag, value)| Ok((tag, serde_json::to_vec(&value)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            Ok(Record {
                collection: doc.collection,
                key: doc.key,
                tags,
            })
        })
        .collect()
}

fn storage_error(path: &Path, e: &std::io::Error) -> CoreError {
    CoreError::Storage {
        message: format!("{}: {e}", path.display()),
    }
}
