mod inmemory;
mod kube_store;

use std::time::Duration;

use async_trait::async_trait;
pub use inmemory::{InMemoryIngressStore, StoreCalls};
use k8s_openapi::api::networking::v1::Ingress;
use kube::core::Selector;
pub use kube_store::KubeIngressStore;
use thiserror::Error;

use crate::common::ResourceKey;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ResourceKey),
    #[error("conflicting write to {0}: {1}")]
    Conflict(ResourceKey, String),
    #[error("{operation} {resource} timed out after {timeout:?}")]
    Timeout { operation: &'static str, resource: ResourceKey, timeout: Duration },
    #[error("{operation} {resource} rejected: {message}")]
    Rejected { operation: &'static str, resource: ResourceKey, message: String },
    #[error("{operation} {resource} failed: {source}")]
    Api {
        operation: &'static str,
        resource: ResourceKey,
        #[source]
        source: kube::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(..))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Access to the ingresses of the cluster.
///
/// `replace` must be conditional on the `resourceVersion` carried by the object and fail
/// with [`StoreError::Conflict`] when the stored object moved on since it was read.
#[async_trait]
pub trait IngressStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError>;
    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<Ingress>, StoreError>;
    async fn create(&self, ingress: &Ingress) -> Result<Ingress, StoreError>;
    async fn replace(&self, ingress: &Ingress) -> Result<Ingress, StoreError>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
