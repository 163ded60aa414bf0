use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{debug, info};

use super::{IngressSolver, Result};
use crate::{
    certificate::Certificate,
    common::{is_controlled_by, ResourceKey, DEFAULT_NAMESPACE_NAME},
    labels::equality_selector,
    store::IngressStore,
};

impl<S> IngressSolver<S>
where
    S: IngressStore,
{
    /// Ingresses created to solve challenges for `domain` on behalf of `certificate`.
    ///
    /// Only ingresses that carry the labels for (certificate, domain), are controlled by this
    /// certificate and are labelled with this exact domain are returned. Without an active
    /// order there is nothing to find and the store is not queried.
    pub async fn find_ingresses(&self, certificate: &Certificate, domain: &str) -> Result<Vec<Ingress>> {
        let certificate_key = ResourceKey::from(certificate);
        if !certificate.has_active_order() {
            debug!("find_ingresses: {certificate_key} {domain} no active order");
            return Ok(vec![]);
        }

        let selector = equality_selector(&self.labeler.labels_for(certificate, domain))?;
        let namespace = certificate.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        let ingresses = self.list_ingresses(&namespace, &selector).await?;

        let domain_label_key = self.labeler.domain_label_key();
        Ok(ingresses
            .into_iter()
            .filter(|ingress| {
                if !is_controlled_by(&ingress.metadata, certificate) {
                    info!(
                        "find_ingresses: {certificate_key} {domain} ingress {} has matching labels but is not owned by the certificate, skipping it",
                        ResourceKey::from(ingress)
                    );
                    return false;
                }
                ingress.labels().get(domain_label_key).is_some_and(|value| value == domain)
            })
            .collect())
    }
}
