// ── Connection records ──
//
// Connections are keyed by (overlay, end1, end2). The pair is unordered
// for reads; deletion needs the order the record was stored with.

use crate::error::Result;
use crate::model::ConnectionObject;
use crate::store::{TypedStore, keys};

#[derive(Clone)]
pub struct ConnectionStore {
    store: TypedStore,
}

impl ConnectionStore {
    pub fn new(store: TypedStore) -> Self {
        Self { store }
    }

    /// Insert or replace under `(overlay, end1.name, end2.name)`.
    pub async fn upsert(&self, conn: &ConnectionObject) -> Result<()> {
        let key = keys::connection(&conn.overlay, &conn.end1.name, &conn.end2.name);
        self.store.put(keys::CONNECTIONS, &key, conn).await
    }

    /// Look up the connection between `a` and `b` in either order.
    pub async fn get(&self, overlay: &str, a: &str, b: &str) -> Result<Option<ConnectionObject>> {
        if a.is_empty() || b.is_empty() {
            return Ok(None);
        }
        if let Some(conn) = self
            .store
            .get(keys::CONNECTIONS, &keys::connection(overlay, a, b))
            .await?
        {
            return Ok(Some(conn));
        }
        self.store
            .get(keys::CONNECTIONS, &keys::connection(overlay, b, a))
            .await
    }

    /// Every connection with `endpoint` at either end.
    pub async fn list_by_endpoint(
        &self,
        overlay: &str,
        endpoint: &str,
    ) -> Result<Vec<ConnectionObject>> {
        let mut found: Vec<ConnectionObject> = self
            .store
            .list(keys::CONNECTIONS, &keys::connection(overlay, endpoint, ""))
            .await?;
        let as_end2: Vec<ConnectionObject> = self
            .store
            .list(keys::CONNECTIONS, &keys::connection(overlay, "", endpoint))
            .await?;

        for conn in as_end2 {
            let duplicate = found
                .iter()
                .any(|c| c.end1.name == conn.end1.name && c.end2.name == conn.end2.name);
            if !duplicate {
                found.push(conn);
            }
        }
        Ok(found)
    }

    pub async fn list_by_overlay(&self, overlay: &str) -> Result<Vec<ConnectionObject>> {
        self.store
            .list(keys::CONNECTIONS, &keys::connection(overlay, "", ""))
            .await
    }

    /// Remove the record stored under exactly `(overlay, end1, end2)`.
    pub async fn delete(&self, overlay: &str, end1: &str, end2: &str) -> Result<()> {
        self.store
            .delete(keys::CONNECTIONS, &keys::connection(overlay, end1, end2))
            .await
    }
}
