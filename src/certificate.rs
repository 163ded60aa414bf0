//! The `Certificate` custom resource as far as HTTP-01 ingress solving is concerned.
//!
//! ```yaml
//! apiVersion: certmanager.k8s.io/v1alpha1
//! kind: Certificate
//! metadata:
//!   name: cert-a
//!   namespace: ns1
//! spec:
//!   secretName: cert-a-tls
//!   dnsNames:
//!   - example.com
//!   acme:
//!     config:
//!     - domains:
//!       - example.com
//!       http01:
//!         ingress: user-ing
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "certmanager.k8s.io", version = "v1alpha1", kind = "Certificate", namespaced)]
#[kube(status = "CertificateStatus")]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    #[serde(default)]
    pub secret_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acme: Option<AcmeCertificateConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AcmeCertificateConfig {
    #[serde(default)]
    pub config: Vec<AcmeDomainConfig>,
}

/// Challenge configuration shared by a group of domains.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AcmeDomainConfig {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http01: Option<AcmeHttp01Config>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcmeHttp01Config {
    /// Name of an existing ingress to add the challenge path to. Empty means a
    /// dedicated ingress is created instead.
    #[serde(default)]
    pub ingress: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class: Option<String>,
}

impl AcmeHttp01Config {
    pub fn existing_ingress(&self) -> Option<&str> {
        if self.ingress.is_empty() {
            None
        } else {
            Some(&self.ingress)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CertificateStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acme: Option<CertificateAcmeStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAcmeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_url: Option<String>,
}

impl Certificate {
    pub fn config_for_domain(&self, domain: &str) -> Option<&AcmeDomainConfig> {
        self.spec.acme.as_ref()?.config.iter().find(|config| config.domains.iter().any(|d| d == domain))
    }

    /// HTTP-01 settings for `domain`, or `None` when the domain has no ACME configuration at all.
    /// A domain entry without an `http01` block yields the default settings.
    pub fn http01_config_for_domain(&self, domain: &str) -> Option<AcmeHttp01Config> {
        self.config_for_domain(domain).map(|config| config.http01.clone().unwrap_or_default())
    }

    pub fn has_active_order(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.acme.as_ref())
            .and_then(|acme| acme.order_url.as_deref())
            .is_some_and(|url| !url.is_empty())
    }
}
