// Shared state behind every manager.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::certs::{CertificateIssuer, CertificateOrchestrator};
use crate::config::OrchestratorConfig;
use crate::connections::ConnectionStore;
use crate::deploy::{ResUtil, ResourceSync};
use crate::error::{CoreError, Result};
use crate::model::{EntityKind, Overlay};
use crate::registration::{ClusterRegistry, Prober, RegistrationWorker};
use crate::store::{DocumentStore, StoreKey, TypedStore, keys};
use crate::topology::TopologyBuilder;

/// The external services the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub issuer: Arc<dyn CertificateIssuer>,
    pub sync: Arc<dyn ResourceSync>,
    pub registry: Arc<dyn ClusterRegistry>,
    pub prober: Arc<dyn Prober>,
}

pub struct ManagerContext {
    pub(crate) config: OrchestratorConfig,
    pub(crate) store: TypedStore,
    pub(crate) certs: Arc<CertificateOrchestrator>,
    pub(crate) sync: Arc<dyn ResourceSync>,
    pub(crate) registry: Arc<dyn ClusterRegistry>,
    pub(crate) prober: Arc<dyn Prober>,
    pub(crate) registrations: RegistrationWorker,
    /// Serializes address allocation per overlay.
    alloc_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Serializes read-modify-write of single stored records.
    record_locks: DashMap<(String, StoreKey), Arc<Mutex<()>>>,
}

impl ManagerContext {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn DocumentStore>,
        collaborators: Collaborators,
    ) -> Self {
        let certs = Arc::new(CertificateOrchestrator::new(
            collaborators.issuer,
            &config,
        ));
        Self {
            registrations: RegistrationWorker::new(config.cancel_grace),
            store: TypedStore::new(store),
            certs,
            sync: collaborators.sync,
            registry: collaborators.registry,
            prober: collaborators.prober,
            alloc_locks: DashMap::new(),
            record_locks: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub(crate) fn res_util(&self) -> ResUtil {
        ResUtil::new(self.sync.clone(), &self.config)
    }

    pub(crate) fn topology(&self) -> TopologyBuilder {
        TopologyBuilder::new(self.store.clone(), self.certs.clone())
    }

    pub(crate) fn connection_store(&self) -> ConnectionStore {
        ConnectionStore::new(self.store.clone())
    }

    pub(crate) fn overlay_lock(&self, overlay: &str) -> Arc<Mutex<()>> {
        self.alloc_locks
            .entry(overlay.to_owned())
            .or_default()
            .clone()
    }

    pub(crate) fn forget_overlay_lock(&self, overlay: &str) {
        self.alloc_locks.remove(overlay);
    }

    fn record_lock(&self, collection: &str, key: &StoreKey) -> Arc<Mutex<()>> {
        self.record_locks
            .entry((collection.to_owned(), key.clone()))
            .or_default()
            .clone()
    }

    pub(crate) fn forget_record_lock(&self, collection: &str, key: &StoreKey) {
        self.record_locks.remove(&(collection.to_owned(), key.clone()));
    }

    /// Re-read a record under its lock and apply `change` to it. The record
    /// is written back only when `change` returns `true`.
    pub(crate) async fn modify<T, F>(
        &self,
        collection: &str,
        key: &StoreKey,
        kind: EntityKind,
        name: &str,
        change: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(&mut T) -> Result<bool> + Send,
    {
        let lock = self.record_lock(collection, key);
        let _guard = lock.lock().await;
        let mut record: T = self.load(collection, key, kind, name).await?;
        if change(&mut record)? {
            self.store.put(collection, key, &record).await?;
        }
        Ok(record)
    }

    /// Load an object or fail with `NotFound`.
    pub(crate) async fn load<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &StoreKey,
        kind: EntityKind,
        name: &str,
    ) -> Result<T> {
        self.store
            .get(collection, key)
            .await?
            .ok_or_else(|| CoreError::not_found(kind, name))
    }

    pub(crate) async fn require_overlay(&self, overlay: &str) -> Result<Overlay> {
        self.load(keys::OVERLAYS, &keys::overlay(overlay), EntityKind::Overlay, overlay)
            .await
    }

    pub(crate) fn already_exists(kind: EntityKind, name: &str) -> CoreError {
        CoreError::AlreadyExists {
            kind,
            name: name.to_owned(),
        }
    }
}
