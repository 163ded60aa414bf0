use k8s_openapi::api::networking::v1::{HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressRule, IngressSpec};
use kube::ResourceExt;
use tracing::{debug, info};

use super::{IngressSolver, Result};
use crate::{
    certificate::{AcmeHttp01Config, Certificate},
    common::{ResourceKey, DEFAULT_NAMESPACE_NAME},
    path::PathCodec,
    retry::retry_on_conflict,
    store::IngressStore,
};

/// Where a challenge path ended up after [`merge_challenge_path`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathMerge {
    /// A path with the same value already existed in the rule for the domain and was overwritten.
    Replaced { rule: usize, path: usize },
    /// The challenge path of an earlier token, routed to the same backend, was overwritten.
    Rotated { rule: usize, path: usize },
    /// The path was appended to the existing rule for the domain.
    Appended { rule: usize, path: usize },
    /// No rule for the domain existed, a new one was appended.
    RuleAdded { rule: usize },
}

/// Puts `entry` into the first rule whose host is `domain`, or into a new rule for `domain`.
///
/// At most one rule and one path of `ingress` change. An existing path equal to
/// `entry.path` is overwritten in place so ingress controllers never see the same path twice;
/// failing that, the first challenge path `codec` recognises that routes to the same backend as
/// `entry` is overwritten, so a domain never routes more than one token to one solver. Entries
/// routed anywhere else are never touched.
pub fn merge_challenge_path(ingress: &mut Ingress, domain: &str, entry: HTTPIngressPath, codec: &PathCodec) -> PathMerge {
    let rules = ingress.spec.get_or_insert_with(IngressSpec::default).rules.get_or_insert_with(Vec::new);

    if let Some((rule_index, rule)) = rules.iter_mut().enumerate().find(|(_, rule)| rule.host.as_deref() == Some(domain)) {
        let http = rule.http.get_or_insert_with(HTTPIngressRuleValue::default);
        if let Some(path_index) = http.paths.iter().position(|path| path.path == entry.path) {
            http.paths[path_index] = entry;
            return PathMerge::Replaced { rule: rule_index, path: path_index };
        }
        if let Some(path_index) = http
            .paths
            .iter()
            .position(|path| path.backend == entry.backend && path.path.as_deref().is_some_and(|p| codec.is_challenge_path(p)))
        {
            http.paths[path_index] = entry;
            return PathMerge::Rotated { rule: rule_index, path: path_index };
        }
        http.paths.push(entry);
        return PathMerge::Appended { rule: rule_index, path: http.paths.len() - 1 };
    }

    rules.push(IngressRule { host: Some(domain.to_owned()), http: Some(HTTPIngressRuleValue { paths: vec![entry] }) });
    PathMerge::RuleAdded { rule: rules.len() - 1 }
}

impl<S> IngressSolver<S>
where
    S: IngressStore,
{
    /// Adds the challenge path for `token` to the existing ingress named in `http01_config`.
    ///
    /// The ingress must exist. A write that loses against a concurrent writer is retried from
    /// a fresh read, up to the configured number of conflict retries.
    pub async fn add_challenge_path_to_ingress(
        &self,
        certificate: &Certificate,
        service_name: &str,
        domain: &str,
        token: &str,
        http01_config: &AcmeHttp01Config,
    ) -> Result<Ingress> {
        let certificate_namespace = certificate.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        let namespace = certificate_namespace.as_str();
        let ingress_name = http01_config.ingress.as_str();

        retry_on_conflict(self.configuration.conflict_retries, "add_challenge_path_to_ingress", move || {
            self.add_challenge_path_once(namespace, ingress_name, service_name, domain, token)
        })
        .await
    }

    async fn add_challenge_path_once(&self, namespace: &str, ingress_name: &str, service_name: &str, domain: &str, token: &str) -> Result<Ingress> {
        let mut ingress = self.get_ingress(namespace, ingress_name).await?;
        let ingress_key = ResourceKey::from(&ingress);

        let merge = merge_challenge_path(&mut ingress, domain, self.codec.route_entry(token, service_name), &self.codec);
        debug!("add_challenge_path_to_ingress: {ingress_key} {domain} {merge:?}");

        let updated = self.replace_ingress(&ingress).await?;
        info!("add_challenge_path_to_ingress: {ingress_key} {domain} challenge path {} routed to {service_name}", self.codec.challenge_path(token));
        Ok(updated)
    }
}
