use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{HTTPIngressRuleValue, Ingress, IngressRule, IngressSpec};
use kube::{api::ObjectMeta, Resource, ResourceExt};

use super::{IngressSolver, Result, SolverError};
use crate::{
    certificate::{AcmeHttp01Config, Certificate},
    common::{ResourceKey, DEFAULT_NAMESPACE_NAME},
    store::IngressStore,
};

pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

impl<S> IngressSolver<S>
where
    S: IngressStore,
{
    /// Describes a dedicated ingress with a single rule routing the challenge path for
    /// `token` on `domain` to `service_name`.
    pub fn build_ingress(
        &self,
        certificate: &Certificate,
        service_name: &str,
        domain: &str,
        token: &str,
        http01_config: &AcmeHttp01Config,
    ) -> Result<Ingress> {
        let owner_reference =
            certificate.controller_owner_ref(&()).ok_or_else(|| SolverError::MissingOwner(ResourceKey::from(certificate)))?;

        let mut annotations = BTreeMap::new();
        if let Some(ingress_class) = http01_config.ingress_class.as_ref() {
            annotations.insert(INGRESS_CLASS_ANNOTATION.to_owned(), ingress_class.clone());
        }

        Ok(Ingress {
            metadata: ObjectMeta {
                generate_name: Some(self.configuration.generate_name_prefix.clone()),
                namespace: Some(certificate.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned())),
                labels: Some(self.labeler.labels_for(certificate, domain)),
                annotations: Some(annotations),
                owner_references: Some(vec![owner_reference]),
                ..ObjectMeta::default()
            },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(domain.to_owned()),
                    http: Some(HTTPIngressRuleValue { paths: vec![self.codec.route_entry(token, service_name)] }),
                }]),
                ..IngressSpec::default()
            }),
            ..Ingress::default()
        })
    }

    /// Creates a dedicated ingress for the challenge. Store failures are returned as they are.
    pub async fn create_ingress(
        &self,
        certificate: &Certificate,
        service_name: &str,
        domain: &str,
        token: &str,
        http01_config: &AcmeHttp01Config,
    ) -> Result<Ingress> {
        let ingress = self.build_ingress(certificate, service_name, domain, token, http01_config)?;
        Ok(self.create_ingress_object(&ingress).await?)
    }
}
