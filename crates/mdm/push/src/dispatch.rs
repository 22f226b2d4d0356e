//! Fan-out of wake-up pushes across topics.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use mdm_core::{PushResponse, PushTarget};
use mdm_storage::{PushCertStore, PushStore};

use crate::{ConnectionSettings, ConnectorFactory, PushError, PushProvider, Registry};

/// Per-key push outcomes.
pub type PushResults = HashMap<String, Result<PushResponse, PushError>>;

/// Sends pushes through the registry's per-topic connections.
pub struct PushService<F: ConnectorFactory, S> {
    registry: Arc<Registry<F, S>>,
    store: S,
}

impl<F: ConnectorFactory, S: Clone> Clone for PushService<F, S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            store: self.store.clone(),
        }
    }
}

impl<F, S> PushService<F, S>
where
    F: ConnectorFactory,
    S: PushStore + PushCertStore + Clone,
{
    pub fn new(factory: F, store: S, settings: ConnectionSettings) -> Self {
        Self {
            registry: Arc::new(Registry::new(factory, store.clone(), settings)),
            store,
        }
    }

    pub fn registry(&self) -> &Registry<F, S> {
        &self.registry
    }

    /// Push every target, keyed by token.
    ///
    /// Targets are grouped by topic; each topic's connection is acquired once
    /// and its targets are pushed concurrently. A failure affects only the
    /// targets it belongs to.
    pub async fn dispatch(&self, targets: &[PushTarget]) -> PushResults {
        let mut by_topic: Vec<(&str, Vec<&PushTarget>)> = Vec::new();
        for target in targets {
            match by_topic.iter_mut().find(|(topic, _)| *topic == target.topic) {
                Some((_, group)) => group.push(target),
                None => by_topic.push((target.topic.as_str(), vec![target])),
            }
        }

        let per_topic = by_topic.into_iter().map(|(topic, group)| async move {
            match self.registry.acquire(topic).await {
                Ok((conn, acquired)) => {
                    tracing::debug!(topic = %topic, ?acquired, targets = group.len(), "pushing");
                    join_all(group.into_iter().map(|target| {
                        let conn = Arc::clone(&conn);
                        async move { (target.token.clone(), conn.push(target).await) }
                    }))
                    .await
                }
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "no push connection");
                    group
                        .into_iter()
                        .map(|target| (target.token.clone(), Err(e.clone())))
                        .collect()
                }
            }
        });

        let results: PushResults = join_all(per_topic).await.into_iter().flatten().collect();

        let failed = results.values().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(total = results.len(), failed, "push dispatch finished with failures");
        } else {
            tracing::debug!(total = results.len(), "push dispatch finished");
        }

        results
    }

    /// Push enrollments by ID, keyed by ID. Unknown or disabled IDs are omitted.
    pub async fn push_ids(&self, ids: &[String]) -> Result<PushResults, PushError> {
        let targets = self
            .store
            .get_push_targets(ids)
            .await
            .map_err(PushError::storage)?;

        let missing = ids.iter().filter(|id| !targets.contains_key(*id)).count();
        if missing > 0 {
            tracing::debug!(missing, "skipping enrollments without push info");
        }

        let ids_by_token: HashMap<String, String> = targets
            .values()
            .map(|t| (t.token.clone(), t.id.clone()))
            .collect();
        let targets: Vec<PushTarget> = targets.into_values().collect();

        Ok(self
            .dispatch(&targets)
            .await
            .into_iter()
            .filter_map(|(token, result)| ids_by_token.get(&token).map(|id| (id.clone(), result)))
            .collect())
    }

    /// Disconnect every push connection.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

impl<F, S> PushProvider for PushService<F, S>
where
    F: ConnectorFactory,
    S: PushStore + PushCertStore + Clone,
{
    async fn push_ids(&self, ids: &[String]) -> Result<PushResults, PushError> {
        PushService::push_ids(self, ids).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use mdm_core::{EnrollId, EnrollType, Enrollment, PushCredential, TokenUpdate};
    use mdm_storage::{CheckinStore, MemoryStorage};

    use super::*;
    use crate::connection::tests::{FakeConnector, target};

    /// Builds fake connectors; topics listed in `broken` get unusable credentials.
    #[derive(Clone, Default)]
    struct FakeFactory {
        built: Arc<Mutex<Vec<String>>>,
        broken: Vec<String>,
        acquisitions: Arc<AtomicUsize>,
    }

    impl ConnectorFactory for FakeFactory {
        type Connector = FakeConnector;

        fn connector(&self, credential: &PushCredential) -> Result<FakeConnector, PushError> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            if self.broken.contains(&credential.topic) {
                return Err(PushError::Credential("bad key".into()));
            }
            self.built.lock().unwrap().push(credential.topic.clone());
            Ok(FakeConnector::default())
        }
    }

    fn service(factory: &FakeFactory, store: &MemoryStorage) -> PushService<FakeFactory, MemoryStorage> {
        PushService::new(factory.clone(), store.clone(), ConnectionSettings::default())
    }

    async fn enroll(store: &MemoryStorage, udid: &str, topic: &str, token: Vec<u8>) {
        let id = EnrollId {
            enroll_type: EnrollType::Device,
            id: udid.into(),
            parent_id: None,
        };
        let msg = TokenUpdate {
            enrollment: Enrollment {
                udid: Some(udid.into()),
                ..Default::default()
            },
            topic: topic.into(),
            token: token.into(),
            push_magic: format!("magic-{udid}"),
            unlock_token: None,
            awaiting_configuration: false,
            not_on_console: false,
            raw: Vec::new(),
        };
        store.store_token_update(&id, &msg).await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_groups_by_topic() {
        let store = MemoryStorage::new();
        store.store_push_cert("t1", "C", "K").await.unwrap();
        store.store_push_cert("t2", "C", "K").await.unwrap();
        let factory = FakeFactory::default();
        let service = service(&factory, &store);

        let targets = [target("aa", "t1"), target("bb", "t2"), target("cc", "t1")];
        let results = service.dispatch(&targets).await;

        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| r.as_ref().unwrap().status == 200));
        let mut built = factory.built.lock().unwrap().clone();
        built.sort();
        assert_eq!(built, ["t1", "t2"]);
        assert_eq!(service.registry().live_connections().await, 2);

        // connections are reused on the next dispatch
        service.dispatch(&targets).await;
        assert_eq!(factory.acquisitions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let store = MemoryStorage::new();
        store.store_push_cert("good", "C", "K").await.unwrap();
        store.store_push_cert("broken", "C", "K").await.unwrap();
        let factory = FakeFactory {
            broken: vec!["broken".into()],
            ..Default::default()
        };
        let service = service(&factory, &store);

        let mut oversized = target("big", "good");
        oversized.push_magic = "m".repeat(5000);
        let targets = [
            target("aa", "good"),
            oversized,
            target("bb", "broken"),
            target("cc", "missing"),
        ];
        let results = service.dispatch(&targets).await;

        assert_eq!(results["aa"].as_ref().unwrap().status, 200);
        assert!(matches!(
            results["big"],
            Err(PushError::PayloadTooLarge { .. })
        ));
        assert!(matches!(results["bb"], Err(PushError::Credential(_))));
        assert_eq!(
            results["cc"],
            Err(PushError::NoCredential("missing".into()))
        );
    }

    #[tokio::test]
    async fn test_dispatch_empty() {
        let store = MemoryStorage::new();
        let factory = FakeFactory::default();
        assert!(service(&factory, &store).dispatch(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_push_ids_maps_back_to_ids() {
        let store = MemoryStorage::new();
        store.store_push_cert("t1", "C", "K").await.unwrap();
        enroll(&store, "UDID-1", "t1", vec![0xaa]).await;
        enroll(&store, "UDID-2", "t1", vec![0xbb]).await;
        let factory = FakeFactory::default();
        let service = service(&factory, &store);

        let ids = ["UDID-1".to_string(), "UDID-2".to_string(), "NOPE".to_string()];
        let results = service.push_ids(&ids).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(!results.contains_key("NOPE"));
        assert_eq!(
            results["UDID-1"].as_ref().unwrap().notification_id.as_deref(),
            Some("apns-aa")
        );
        assert_eq!(
            results["UDID-2"].as_ref().unwrap().notification_id.as_deref(),
            Some("apns-bb")
        );
    }
}
