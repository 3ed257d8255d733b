// ── Registration worker ──
//
// Hubs and devices finish registering in the background: a task per
// entity polls until the entity leaves `pending`. Each task owns a
// cancellation token kept in a concurrent map keyed by entity, so
// deletion can stop exactly that task and wait for it (bounded by the
// configured grace period) before tearing the entity down.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use meshwan_api::sync::models::ClusterRegistration;
use meshwan_api::{KubeConfig, ReachabilityProbe, SyncClient};

use crate::deploy::ClusterId;
use crate::error::Result;
use crate::model::EntityKind;

// ── Collaborator seams ───────────────────────────────────────────────

/// Checks that an edge cluster answers at a candidate address.
#[async_trait]
pub trait Prober: Send + Sync {
    /// `Unauthorized` when the cluster answered but refused the
    /// credentials; any other error means "not reachable (yet)".
    async fn probe(&self, kubeconfig: &KubeConfig, ip: &str) -> Result<()>;
}

#[async_trait]
impl Prober for ReachabilityProbe {
    async fn probe(&self, kubeconfig: &KubeConfig, ip: &str) -> Result<()> {
        Ok(ReachabilityProbe::probe(self, kubeconfig, ip).await?)
    }
}

/// Cluster bookkeeping on the sync service side.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    async fn register_cluster(&self, registration: &ClusterRegistration) -> Result<()>;
    async fn unregister_cluster(&self, cluster: &ClusterId) -> Result<()>;
    async fn gitops_object_exists(&self, git_ops_type: &str, name: &str) -> Result<bool>;
}

#[async_trait]
impl ClusterRegistry for SyncClient {
    async fn register_cluster(&self, registration: &ClusterRegistration) -> Result<()> {
        Ok(SyncClient::register_cluster(self, registration).await?)
    }

    async fn unregister_cluster(&self, cluster: &ClusterId) -> Result<()> {
        match SyncClient::unregister_cluster(self, &cluster.provider, &cluster.cluster).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => Ok(other?),
        }
    }

    async fn gitops_object_exists(&self, git_ops_type: &str, name: &str) -> Result<bool> {
        Ok(SyncClient::gitops_object_exists(self, git_ops_type, name).await?)
    }
}

// ── Worker ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationKey {
    pub kind: EntityKind,
    pub overlay: String,
    pub name: String,
}

impl RegistrationKey {
    pub fn new(kind: EntityKind, overlay: &str, name: &str) -> Self {
        Self {
            kind,
            overlay: overlay.to_owned(),
            name: name.to_owned(),
        }
    }
}

/// Result of one poll step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Still pending; poll again on the next tick.
    Pending,
    /// Left `pending` (or vanished); the task ends.
    Finished,
}

struct RegistrationHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct RegistrationWorker {
    handles: DashMap<RegistrationKey, RegistrationHandle>,
    grace: Duration,
}

impl RegistrationWorker {
    pub fn new(grace: Duration) -> Self {
        Self {
            handles: DashMap::new(),
            grace,
        }
    }

    /// Start polling for `key`, calling `step` once per `interval` until it
    /// reports `Finished` or the task is cancelled. A task already running
    /// for `key` is cancelled without waiting.
    pub fn start<F, Fut>(&self, key: RegistrationKey, interval: Duration, mut step: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = PollOutcome> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let label = format!("{}/{}.{}", key.overlay, key.kind, key.name);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let outcome = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    outcome = step() => outcome,
                };
                if outcome == PollOutcome::Finished {
                    break;
                }
            }
            debug!(entity = %label, "registration task stopped");
        });

        if let Some(previous) = self.handles.insert(key, RegistrationHandle { cancel, task }) {
            previous.cancel.cancel();
        }
    }

    /// Whether a task for `key` is still running.
    pub fn is_running(&self, key: &RegistrationKey) -> bool {
        self.handles
            .get(key)
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Cancel the task for `key` and wait up to the grace period for it.
    pub async fn cancel(&self, key: &RegistrationKey) {
        let Some((_, handle)) = self.handles.remove(key) else {
            return;
        };
        self.stop(handle, key).await;
    }

    /// Cancel every task.
    pub async fn shutdown(&self) {
        let keys: Vec<RegistrationKey> = self.handles.iter().map(|e| e.key().clone()).collect();
        let stops = keys.iter().filter_map(|key| {
            self.handles
                .remove(key)
                .map(|(_, handle)| self.stop(handle, key))
        });
        join_all(stops).await;
    }

    async fn stop(&self, handle: RegistrationHandle, key: &RegistrationKey) {
        handle.cancel.cancel();
        let mut task = handle.task;
        if tokio::time::timeout(self.grace, &mut task).await.is_err() {
            warn!(
                overlay = %key.overlay,
                entity = %key.name,
                grace_ms = self.grace.as_millis(),
                "registration task did not stop in time, aborting"
            );
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn key() -> RegistrationKey {
        RegistrationKey::new(EntityKind::Device, "ov1", "d1")
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_finished() {
        let worker = RegistrationWorker::new(Duration::from_secs(2));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        worker.start(key(), Duration::from_secs(5), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) >= 2 {
                    PollOutcome::Finished
                } else {
                    PollOutcome::Pending
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!worker.is_running(&key()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling() {
        let worker = RegistrationWorker::new(Duration::from_secs(2));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        worker.start(key(), Duration::from_secs(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                PollOutcome::Pending
            }
        });
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(worker.is_running(&key()));

        worker.cancel(&key()).await;
        let seen = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
        assert!(!worker.is_running(&key()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_slow_step() {
        let worker = RegistrationWorker::new(Duration::from_secs(2));
        worker.start(key(), Duration::from_secs(5), || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            PollOutcome::Pending
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let started = tokio::time::Instant::now();
        worker.cancel(&key()).await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything() {
        let worker = RegistrationWorker::new(Duration::from_secs(2));
        for name in ["d1", "d2"] {
            worker.start(
                RegistrationKey::new(EntityKind::Device, "ov1", name),
                Duration::from_secs(5),
                || async { PollOutcome::Pending },
            );
        }
        worker.shutdown().await;
        assert!(!worker.is_running(&RegistrationKey::new(EntityKind::Device, "ov1", "d1")));
        assert!(!worker.is_running(&RegistrationKey::new(EntityKind::Device, "ov1", "d2")));
    }
}
