use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::core::{Selector, SelectorExt};
use tracing::debug;
use uuid::Uuid;

use super::{IngressStore, StoreError};
use crate::common::{ResourceKey, DEFAULT_NAMESPACE_NAME};

const GENERATED_SUFFIX_LENGTH: usize = 5;

type ConcurrentWrite = Box<dyn FnMut(&mut Ingress) + Send>;

/// Number of calls the store received, per operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub get: usize,
    pub list: usize,
    pub create: usize,
    pub replace: usize,
    pub delete: usize,
}

impl StoreCalls {
    pub fn total(&self) -> usize {
        self.get + self.list + self.create + self.replace + self.delete
    }
}

#[derive(Default)]
struct Inner {
    ingresses: BTreeMap<ResourceKey, Ingress>,
    last_resource_version: u64,
    calls: StoreCalls,
    failing_operations: BTreeSet<(&'static str, ResourceKey)>,
    concurrent_writes: BTreeMap<ResourceKey, Vec<ConcurrentWrite>>,
}

impl Inner {
    fn next_resource_version(&mut self) -> String {
        self.last_resource_version += 1;
        self.last_resource_version.to_string()
    }

    fn injected_failure(&self, operation: &'static str, key: &ResourceKey) -> Result<(), StoreError> {
        if self.failing_operations.contains(&(operation, key.clone())) {
            return Err(StoreError::Rejected { operation, resource: key.clone(), message: "injected failure".to_owned() });
        }
        Ok(())
    }
}

/// Ingress store kept in process memory.
///
/// Behaves like the API server where the solver depends on it: names are generated from
/// `generateName`, every write bumps `resourceVersion` and a `replace` carrying a stale
/// version is rejected with a conflict.
#[derive(Clone, Default)]
pub struct InMemoryIngressStore {
    inner: Arc<Mutex<Inner>>,
    latency: Option<Duration>,
}

impl InMemoryIngressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before touching the store.
    #[cfg(test)]
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        Self { latency: Some(latency), ..self }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Rejected {
            operation: "lock",
            resource: ResourceKey::default(),
            message: "in-memory store lock poisoned".to_owned(),
        })
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Stores `ingress` as if a user had applied it, bypassing call accounting.
    pub fn insert(&self, mut ingress: Ingress) -> Result<Ingress, StoreError> {
        let mut inner = self.lock()?;
        let key = ResourceKey::from(&ingress);
        ingress.metadata.namespace = Some(key.namespace.clone());
        ingress.metadata.uid.get_or_insert_with(|| Uuid::new_v4().to_string());
        ingress.metadata.resource_version = Some(inner.next_resource_version());
        inner.ingresses.insert(key, ingress.clone());
        Ok(ingress)
    }

    pub fn snapshot(&self, namespace: &str, name: &str) -> Option<Ingress> {
        self.lock().ok()?.ingresses.get(&ResourceKey::ingress(name, namespace)).cloned()
    }

    pub fn ingresses(&self, namespace: &str) -> Vec<Ingress> {
        self.lock()
            .map(|inner| inner.ingresses.iter().filter(|(key, _)| key.namespace == namespace).map(|(_, i)| i.clone()).collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> StoreCalls {
        self.lock().map(|inner| inner.calls).unwrap_or_default()
    }

    #[cfg(test)]
    fn fail(&self, operation: &'static str, namespace: &str, name: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.failing_operations.insert((operation, ResourceKey::ingress(name, namespace)));
        }
    }

    /// Gets of this ingress fail until the store is dropped.
    #[cfg(test)]
    pub fn fail_gets_of(&self, namespace: &str, name: &str) {
        self.fail("get", namespace, name);
    }

    /// Replaces of this ingress fail until the store is dropped.
    #[cfg(test)]
    pub fn fail_replaces_of(&self, namespace: &str, name: &str) {
        self.fail("replace", namespace, name);
    }

    /// Deletes of this ingress fail until the store is dropped.
    #[cfg(test)]
    pub fn fail_deletes_of(&self, namespace: &str, name: &str) {
        self.fail("delete", namespace, name);
    }

    /// Queues a write that a competing client performs right after the next `get` of this
    /// ingress has been served, so the caller holds a stale copy.
    #[cfg(test)]
    pub fn write_after_next_get<F>(&self, namespace: &str, name: &str, write: F)
    where
        F: FnMut(&mut Ingress) + Send + 'static,
    {
        if let Ok(mut inner) = self.lock() {
            inner.concurrent_writes.entry(ResourceKey::ingress(name, namespace)).or_default().push(Box::new(write));
        }
    }
}

#[async_trait]
impl IngressStore for InMemoryIngressStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError> {
        self.delay().await;
        let mut inner = self.lock()?;
        inner.calls.get += 1;
        let key = ResourceKey::ingress(name, namespace);
        inner.injected_failure("get", &key)?;
        let ingress = inner.ingresses.get(&key).cloned().ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let pending = inner.concurrent_writes.get_mut(&key).filter(|writes| !writes.is_empty()).map(|writes| writes.remove(0));
        if let Some(mut write) = pending {
            let resource_version = inner.next_resource_version();
            if let Some(stored) = inner.ingresses.get_mut(&key) {
                write(stored);
                stored.metadata.resource_version = Some(resource_version);
                debug!("in-memory store: concurrent write applied to {key}");
            }
        }
        Ok(ingress)
    }

    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<Ingress>, StoreError> {
        self.delay().await;
        let mut inner = self.lock()?;
        inner.calls.list += 1;
        let empty = BTreeMap::new();
        Ok(inner
            .ingresses
            .iter()
            .filter(|(key, _)| key.namespace == namespace)
            .filter(|(_, ingress)| selector.matches(ingress.metadata.labels.as_ref().unwrap_or(&empty)))
            .map(|(_, ingress)| ingress.clone())
            .collect())
    }

    async fn create(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        self.delay().await;
        let mut inner = self.lock()?;
        inner.calls.create += 1;

        let mut created = ingress.clone();
        let namespace = created.metadata.namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        let name = match (created.metadata.name.clone(), created.metadata.generate_name.as_deref()) {
            (Some(name), _) => name,
            (None, Some(prefix)) => loop {
                let suffix: String = Uuid::new_v4().simple().to_string().chars().take(GENERATED_SUFFIX_LENGTH).collect();
                let candidate = format!("{prefix}{suffix}");
                if !inner.ingresses.contains_key(&ResourceKey::ingress(&candidate, &namespace)) {
                    break candidate;
                }
            },
            (None, None) => {
                return Err(StoreError::Rejected {
                    operation: "create",
                    resource: ResourceKey::ingress("", &namespace),
                    message: "name or generateName is required".to_owned(),
                })
            },
        };

        let key = ResourceKey::ingress(&name, &namespace);
        if inner.ingresses.contains_key(&key) {
            return Err(StoreError::Conflict(key, "already exists".to_owned()));
        }
        created.metadata.name = Some(name);
        created.metadata.namespace = Some(namespace);
        created.metadata.uid = Some(Uuid::new_v4().to_string());
        created.metadata.resource_version = Some(inner.next_resource_version());
        inner.ingresses.insert(key, created.clone());
        Ok(created)
    }

    async fn replace(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        self.delay().await;
        let mut inner = self.lock()?;
        inner.calls.replace += 1;

        let key = ResourceKey::from(ingress);
        inner.injected_failure("replace", &key)?;
        let stored_version = inner
            .ingresses
            .get(&key)
            .map(|stored| stored.metadata.resource_version.clone())
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        if let Some(expected) = ingress.metadata.resource_version.as_ref() {
            if Some(expected) != stored_version.as_ref() {
                return Err(StoreError::Conflict(
                    key,
                    format!("resource version {expected} is stale, stored version is {}", stored_version.unwrap_or_default()),
                ));
            }
        }

        let mut replaced = ingress.clone();
        replaced.metadata.resource_version = Some(inner.next_resource_version());
        inner.ingresses.insert(key, replaced.clone());
        Ok(replaced)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delay().await;
        let mut inner = self.lock()?;
        inner.calls.delete += 1;
        let key = ResourceKey::ingress(name, namespace);
        inner.injected_failure("delete", &key)?;
        inner.ingresses.remove(&key).map(|_| ()).ok_or(StoreError::NotFound(key))
    }
}
