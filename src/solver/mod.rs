//! Makes sure HTTP-01 validation requests for a domain reach the challenge solver service.
//!
//! Two modes are supported per domain:
//! - no ingress named in the certificate's `http01` config: the solver creates a dedicated
//!   ingress labelled for (certificate, domain) and owned by the certificate, and deletes it
//!   again on cleanup;
//! - an existing ingress is named: the solver adds exactly one path for the challenge token to
//!   the rule for the domain, and removes exactly that path on cleanup.
//!
//! Every operation works on a fresh copy read from the store. Writes to a shared ingress are
//! conditional on the version that was read and the whole read-merge-write cycle is retried
//! when another writer got there first.

mod builder;
mod cleanup;
mod locator;
mod patcher;
#[cfg(test)]
mod test;

use std::{future::Future, sync::Arc};

pub use cleanup::{remove_challenge_path, PathRemoval};
use itertools::Itertools;
use k8s_openapi::api::networking::v1::Ingress;
use kube::core::Selector;
pub use patcher::{merge_challenge_path, PathMerge};
use thiserror::Error;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::{
    certificate::Certificate,
    common::ResourceKey,
    configuration::SolverConfiguration,
    labels::{ChallengeLabeler, DefaultChallengeLabeler, LabelError},
    path::PathCodec,
    retry::ConflictError,
    store::{IngressStore, StoreError},
};

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("no ACME challenge configuration found for domain {0:?}")]
    MissingDomainConfig(String),
    #[error("certificate {0} has no uid and can't own solver ingresses")]
    MissingOwner(ResourceKey),
    #[error("can't build label selector: {0}")]
    Selector(#[from] LabelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl SolverError {
    /// Failures the reconcile loop is expected to recover from by trying again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SolverError::Store(e) => e.is_conflict() || e.is_timeout(),
            SolverError::Aggregate(aggregate) => {
                !aggregate.is_empty() && aggregate.errors().iter().all(|e| e.is_conflict() || e.is_timeout())
            },
            SolverError::MissingDomainConfig(_) | SolverError::MissingOwner(_) | SolverError::Selector(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SolverError::Store(e) if e.is_not_found())
    }
}

impl ConflictError for SolverError {
    fn is_conflict(&self) -> bool {
        matches!(self, SolverError::Store(e) if e.is_conflict())
    }
}

/// Every failure collected while deleting a set of independent objects.
#[derive(Debug, Default)]
pub struct AggregateError(Vec<StoreError>);

impl AggregateError {
    pub fn errors(&self) -> &[StoreError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, error: StoreError) {
        self.0.push(error);
    }

    pub fn into_result(self) -> Result<(), AggregateError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            errors => write!(f, "[{}]", errors.iter().join(", ")),
        }
    }
}

impl std::error::Error for AggregateError {}

pub type Result<T, E = SolverError> = std::result::Result<T, E>;

#[derive(TypedBuilder)]
pub struct IngressSolver<S>
where
    S: IngressStore,
{
    store: S,
    #[builder(default = Arc::new(DefaultChallengeLabeler))]
    labeler: Arc<dyn ChallengeLabeler>,
    #[builder(default)]
    configuration: SolverConfiguration,
    #[builder(default = PathCodec::default().with_listen_port(configuration.listen_port))]
    codec: PathCodec,
}

impl<S> IngressSolver<S>
where
    S: IngressStore,
{
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    pub fn configuration(&self) -> &SolverConfiguration {
        &self.configuration
    }

    /// Makes sure an ingress routes the challenge path for `token` on `domain` to `service_name`.
    ///
    /// Fails when the certificate carries no ACME configuration for `domain`. Nothing is
    /// looked up beforehand: repeated calls rely on the create and merge semantics to stay
    /// idempotent.
    pub async fn ensure_ingress(&self, certificate: &Certificate, service_name: &str, domain: &str, token: &str) -> Result<Ingress> {
        let certificate_key = ResourceKey::from(certificate);
        let http01_config =
            certificate.http01_config_for_domain(domain).ok_or_else(|| SolverError::MissingDomainConfig(domain.to_owned()))?;

        if let Some(existing_ingress) = http01_config.existing_ingress() {
            debug!("ensure_ingress: {certificate_key} {domain} adding challenge path to existing ingress {existing_ingress}");
            self.add_challenge_path_to_ingress(certificate, service_name, domain, token, &http01_config).await
        } else {
            debug!("ensure_ingress: {certificate_key} {domain} creating dedicated ingress");
            let ingress = self.create_ingress(certificate, service_name, domain, token, &http01_config).await?;
            info!("ensure_ingress: {certificate_key} {domain} created ingress {}", ResourceKey::from(&ingress));
            Ok(ingress)
        }
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, resource: ResourceKey, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.configuration.request_timeout();
        tokio::time::timeout(timeout, call).await.map_err(|_| StoreError::Timeout { operation, resource, timeout })?
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError> {
        self.with_deadline("get", ResourceKey::ingress(name, namespace), self.store.get(namespace, name)).await
    }

    async fn list_ingresses(&self, namespace: &str, selector: &Selector) -> Result<Vec<Ingress>, StoreError> {
        self.with_deadline("list", ResourceKey::ingress("", namespace), self.store.list(namespace, selector)).await
    }

    async fn create_ingress_object(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        self.with_deadline("create", ResourceKey::from(ingress), self.store.create(ingress)).await
    }

    async fn replace_ingress(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        self.with_deadline("replace", ResourceKey::from(ingress), self.store.replace(ingress)).await
    }

    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.with_deadline("delete", ResourceKey::ingress(name, namespace), self.store.delete(namespace, name)).await
    }
}
