use std::collections::BTreeMap;

use kube::{
    core::{Expression, Selector},
    ResourceExt,
};
use thiserror::Error;

use crate::certificate::Certificate;

pub const CERTIFICATE_NAME_LABEL_KEY: &str = "certmanager.k8s.io/certificate-name";
pub const DOMAIN_LABEL_KEY: &str = "certmanager.k8s.io/acme-http-domain";

const LABEL_NAME_MAX_LENGTH: usize = 63;
const LABEL_PREFIX_MAX_LENGTH: usize = 253;

/// Derives the label set used both to tag solver-created objects and to find them again.
pub trait ChallengeLabeler: Send + Sync {
    fn labels_for(&self, certificate: &Certificate, domain: &str) -> BTreeMap<String, String>;

    /// Key of the label whose value must equal the solved domain.
    fn domain_label_key(&self) -> &str;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultChallengeLabeler;

impl ChallengeLabeler for DefaultChallengeLabeler {
    fn labels_for(&self, certificate: &Certificate, domain: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (CERTIFICATE_NAME_LABEL_KEY.to_owned(), certificate.name_any()),
            (DOMAIN_LABEL_KEY.to_owned(), domain.to_owned()),
        ])
    }

    fn domain_label_key(&self) -> &str {
        DOMAIN_LABEL_KEY
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("invalid label key {0:?}")]
    InvalidKey(String),
    #[error("invalid value {value:?} for label {key:?}")]
    InvalidValue { key: String, value: String },
}

/// Builds an equality-only selector requiring every pair in `labels`.
pub fn equality_selector(labels: &BTreeMap<String, String>) -> Result<Selector, LabelError> {
    labels
        .iter()
        .map(|(key, value)| {
            if !is_valid_label_key(key) {
                return Err(LabelError::InvalidKey(key.clone()));
            }
            if !is_valid_label_value(value) {
                return Err(LabelError::InvalidValue { key: key.clone(), value: value.clone() });
            }
            Ok(Expression::Equal(key.clone(), value.clone()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|expressions| expressions.into_iter().collect::<Selector>())
}

fn is_valid_label_key(key: &str) -> bool {
    match key.split_once('/') {
        Some((prefix, name)) => is_valid_prefix(prefix) && is_valid_label_name(name),
        None => is_valid_label_name(key),
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= LABEL_PREFIX_MAX_LENGTH
        && prefix.split('.').all(|part| {
            !part.is_empty()
                && part.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
                && !part.starts_with('-')
                && !part.ends_with('-')
        })
}

fn is_valid_label_name(name: &str) -> bool {
    !name.is_empty() && is_valid_label_value(name)
}

fn is_valid_label_value(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let bytes = value.as_bytes();
    value.len() <= LABEL_NAME_MAX_LENGTH
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}
