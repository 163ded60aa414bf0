use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    core::Selector,
    Api, Client,
};
use tracing::debug;

use super::{IngressStore, StoreError};
use crate::common::{ResourceKey, DEFAULT_NAMESPACE_NAME};

#[derive(Clone)]
pub struct KubeIngressStore {
    client: Client,
}

impl KubeIngressStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_error(operation: &'static str, resource: ResourceKey, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound(resource),
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict(resource, response.message),
        source => StoreError::Api { operation, resource, source },
    }
}

fn key_of(ingress: &Ingress) -> ResourceKey {
    ResourceKey::from(ingress)
}

#[async_trait]
impl IngressStore for KubeIngressStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError> {
        self.api(namespace).get(name).await.map_err(|e| map_error("get", ResourceKey::ingress(name, namespace), e))
    }

    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<Ingress>, StoreError> {
        debug!("list ingresses in {namespace} matching {selector}");
        let params = ListParams::default().labels_from(selector);
        self.api(namespace)
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| map_error("list", ResourceKey::ingress("", namespace), e))
    }

    async fn create(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        let namespace = ingress.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE_NAME);
        self.api(namespace).create(&PostParams::default(), ingress).await.map_err(|e| map_error("create", key_of(ingress), e))
    }

    async fn replace(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        let namespace = ingress.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE_NAME);
        let Some(name) = ingress.metadata.name.as_deref() else {
            return Err(StoreError::Rejected {
                operation: "replace",
                resource: key_of(ingress),
                message: "ingress has no name".to_owned(),
            });
        };
        self.api(namespace)
            .replace(name, &PostParams::default(), ingress)
            .await
            .map_err(|e| map_error("replace", key_of(ingress), e))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_error("delete", ResourceKey::ingress(name, namespace), e))
    }
}
