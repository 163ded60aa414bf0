use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::{AggregateError, IngressSolver, Result};
use crate::{
    certificate::Certificate,
    common::{ResourceKey, DEFAULT_NAMESPACE_NAME},
    retry::retry_on_conflict,
    store::IngressStore,
};

/// Outcome of [`remove_challenge_path`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathRemoval {
    Removed { rule: usize, path: usize },
    /// The first rule for the domain has no paths at all; later rules were not inspected.
    NoPathContainer { rule: usize },
    NotPresent,
}

/// Drops the first path equal to `challenge_path` from the rules whose host is `domain`.
///
/// The remaining paths keep their order and nothing else in `ingress` changes. Rules are
/// scanned in order; the scan stops at the first removal, and also at the first rule for
/// `domain` that has no path container.
pub fn remove_challenge_path(ingress: &mut Ingress, domain: &str, challenge_path: &str) -> PathRemoval {
    let Some(rules) = ingress.spec.as_mut().and_then(|spec| spec.rules.as_mut()) else {
        return PathRemoval::NotPresent;
    };

    for (rule_index, rule) in rules.iter_mut().enumerate().filter(|(_, rule)| rule.host.as_deref() == Some(domain)) {
        let Some(http) = rule.http.as_mut() else {
            return PathRemoval::NoPathContainer { rule: rule_index };
        };
        if let Some(path_index) = http.paths.iter().position(|path| path.path.as_deref() == Some(challenge_path)) {
            http.paths = std::mem::take(&mut http.paths)
                .into_iter()
                .enumerate()
                .filter_map(|(index, path)| (index != path_index).then_some(path))
                .collect();
            return PathRemoval::Removed { rule: rule_index, path: path_index };
        }
    }
    PathRemoval::NotPresent
}

impl<S> IngressSolver<S>
where
    S: IngressStore,
{
    /// Undoes [`IngressSolver::ensure_ingress`] for `domain`.
    ///
    /// Dedicated ingresses found for (certificate, domain) are deleted; every delete is
    /// attempted and all failures are returned together. When an existing ingress is
    /// configured, only the challenge path for `token` is removed from it. Cleaning up
    /// something that is already gone succeeds.
    pub async fn cleanup_ingresses(&self, certificate: &Certificate, domain: &str, token: &str) -> Result<()> {
        let http01_config = certificate.http01_config_for_domain(domain).unwrap_or_default();

        match http01_config.existing_ingress() {
            None => self.delete_dedicated_ingresses(certificate, domain).await,
            Some(existing_ingress) => {
                let certificate_namespace = certificate.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
                let namespace = certificate_namespace.as_str();
                retry_on_conflict(self.configuration.conflict_retries, "cleanup_ingresses", move || {
                    self.remove_challenge_path_once(namespace, existing_ingress, domain, token)
                })
                .await
            },
        }
    }

    async fn delete_dedicated_ingresses(&self, certificate: &Certificate, domain: &str) -> Result<()> {
        let certificate_key = ResourceKey::from(certificate);
        let ingresses = self.find_ingresses(certificate, domain).await?;
        debug!("cleanup_ingresses: {certificate_key} {domain} deleting {} ingresses", ingresses.len());

        let mut errors = AggregateError::default();
        for ingress in ingresses {
            let ingress_key = ResourceKey::from(&ingress);
            match self.delete_ingress(&ingress_key.namespace, &ingress_key.name).await {
                Ok(()) => info!("cleanup_ingresses: {certificate_key} {domain} deleted ingress {ingress_key}"),
                Err(e) if e.is_not_found() => info!("cleanup_ingresses: {certificate_key} {domain} ingress {ingress_key} already deleted"),
                Err(e) => {
                    warn!("cleanup_ingresses: {certificate_key} {domain} failed to delete ingress {ingress_key}: {e}");
                    errors.push(e);
                },
            }
        }
        Ok(errors.into_result()?)
    }

    async fn remove_challenge_path_once(&self, namespace: &str, ingress_name: &str, domain: &str, token: &str) -> Result<()> {
        let mut ingress = match self.get_ingress(namespace, ingress_name).await {
            Ok(ingress) => ingress,
            Err(e) if e.is_not_found() => {
                info!("cleanup_ingresses: attempt to remove ACME challenge path from ingress {namespace}/{ingress_name} skipped: {e}");
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        };
        let ingress_key = ResourceKey::from(&ingress);
        let challenge_path = self.codec.challenge_path(token);

        match remove_challenge_path(&mut ingress, domain, &challenge_path) {
            PathRemoval::Removed { rule, path } => {
                self.replace_ingress(&ingress).await?;
                info!("cleanup_ingresses: {ingress_key} {domain} removed challenge path {challenge_path} (rule {rule}, path {path})");
            },
            removal @ (PathRemoval::NoPathContainer { .. } | PathRemoval::NotPresent) => {
                debug!("cleanup_ingresses: {ingress_key} {domain} nothing to remove for {challenge_path} {removal:?}");
            },
        }
        Ok(())
    }
}
