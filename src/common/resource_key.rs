use std::fmt::Display;

use k8s_openapi::api::networking::v1::Ingress;
use kube::{Resource, ResourceExt};

use crate::certificate::Certificate;

pub const DEFAULT_NAMESPACE_NAME: &str = "default";
pub const CERTIFICATE_KIND_NAME: &str = "Certificate";
pub const INGRESS_KIND_NAME: &str = "Ingress";

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn ingress(name: &str, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: INGRESS_KIND_NAME.to_owned(),
        }
    }

    pub fn certificate(name: &str, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: CERTIFICATE_KIND_NAME.to_owned(),
        }
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE_NAME.to_owned(),
            name: String::default(),
            kind: INGRESS_KIND_NAME.to_owned(),
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&Certificate> for ResourceKey {
    fn from(value: &Certificate) -> Self {
        let namespace = value.meta().namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        Self {
            namespace,
            name: value.name_any(),
            kind: CERTIFICATE_KIND_NAME.to_owned(),
        }
    }
}

impl From<&Ingress> for ResourceKey {
    fn from(value: &Ingress) -> Self {
        let metadata = &value.metadata;
        let namespace = metadata.namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());

        let name = match (metadata.name.as_ref(), metadata.generate_name.as_ref()) {
            (None, None) => "",
            (Some(name), _) | (None, Some(name)) => name,
        };
        Self {
            namespace,
            name: name.to_owned(),
            kind: INGRESS_KIND_NAME.to_owned(),
        }
    }
}
