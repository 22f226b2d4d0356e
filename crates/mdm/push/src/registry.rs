//! Per-topic connection registry that follows push certificate rotation.

use std::sync::Arc;

use dashmap::DashMap;
use mdm_storage::PushCertStore;

use crate::{Connection, ConnectionSettings, ConnectorFactory, PushError};

/// Where a cached connection stands relative to the stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Built from the current credential.
    Fresh,
    /// The credential was replaced or deleted since the connection was built.
    Stale,
    /// Disconnected and removed from the registry.
    Evicted,
    /// Replaced by a connection built from the current credential.
    Recreated,
}

/// What to do with a topic's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    Reuse,
    Create,
    Evict,
}

/// How a connection was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    Reused,
    Created,
    Recreated,
}

/// Decide the fate of a cached connection from its captured rotation marker
/// and the one currently stored.
pub fn assess(captured: Option<i64>, current: Option<i64>) -> Assessment {
    match captured {
        None => Assessment::Create,
        Some(captured) if current == Some(captured) => Assessment::Reuse,
        Some(_) => Assessment::Evict,
    }
}

type Slot<C> = Arc<tokio::sync::Mutex<Option<Arc<Connection<C>>>>>;

/// Owns one live connection per push topic.
///
/// Lookups, evictions, and creation for a topic are serialized by that
/// topic's lock; different topics proceed independently.
pub struct Registry<F: ConnectorFactory, S> {
    factory: F,
    store: S,
    settings: ConnectionSettings,
    slots: DashMap<String, Slot<F::Connector>>,
}

impl<F, S> Registry<F, S>
where
    F: ConnectorFactory,
    S: PushCertStore,
{
    pub fn new(factory: F, store: S, settings: ConnectionSettings) -> Self {
        Self {
            factory,
            store,
            settings,
            slots: DashMap::new(),
        }
    }

    /// Get the connection for `topic`, replacing it first if the stored
    /// credential has changed.
    pub async fn acquire(
        &self,
        topic: &str,
    ) -> Result<(Arc<Connection<F::Connector>>, Acquired), PushError> {
        let slot = Arc::clone(self.slots.entry(topic.to_string()).or_default().value());
        let mut slot = slot.lock().await;

        let current = self
            .store
            .push_cert_issued_at(topic)
            .await
            .map_err(PushError::storage)?;
        let captured = slot.as_ref().map(|conn| conn.issued_at());

        let mut evicted = false;
        match assess(captured, current) {
            Assessment::Reuse => {
                if let Some(conn) = slot.as_ref() {
                    tracing::trace!(topic = %topic, staleness = ?Staleness::Fresh, "reusing push connection");
                    return Ok((Arc::clone(conn), Acquired::Reused));
                }
            }
            Assessment::Evict => {
                tracing::info!(
                    topic = %topic,
                    staleness = ?Staleness::Stale,
                    captured = ?captured,
                    current = ?current,
                    "push certificate changed"
                );
                if let Some(old) = slot.take() {
                    old.disconnect();
                }
                tracing::info!(topic = %topic, staleness = ?Staleness::Evicted, "evicted push connection");
                evicted = true;
            }
            Assessment::Create => {}
        }

        let credential = self
            .store
            .get_push_credential(topic)
            .await
            .map_err(PushError::storage)?
            .ok_or_else(|| PushError::NoCredential(topic.to_string()))?;
        let connector = self.factory.connector(&credential)?;

        let conn = Arc::new(Connection::spawn(
            topic,
            credential.issued_at,
            connector,
            self.settings,
        ));
        *slot = Some(Arc::clone(&conn));

        let acquired = if evicted {
            tracing::info!(topic = %topic, staleness = ?Staleness::Recreated, "recreated push connection");
            Acquired::Recreated
        } else {
            tracing::info!(topic = %topic, "created push connection");
            Acquired::Created
        };

        Ok((conn, acquired))
    }

    /// Number of topics with a live connection.
    pub async fn live_connections(&self) -> usize {
        let mut live = 0;
        for slot in self.slot_handles() {
            if slot.lock().await.is_some() {
                live += 1;
            }
        }
        live
    }

    /// Disconnect and drop every connection.
    pub async fn shutdown(&self) {
        for slot in self.slot_handles() {
            if let Some(conn) = slot.lock().await.take() {
                conn.disconnect();
            }
        }
        tracing::info!("push registry shut down");
    }

    fn slot_handles(&self) -> Vec<Slot<F::Connector>> {
        self.slots.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}
