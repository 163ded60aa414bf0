mod resource_key;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
pub use resource_key::{ResourceKey, CERTIFICATE_KIND_NAME, DEFAULT_NAMESPACE_NAME, INGRESS_KIND_NAME};

/// Returns true when `object` carries a controller owner reference pointing at `owner`.
///
/// Only the UID is compared, so an owner without a UID never controls anything.
pub fn is_controlled_by<O>(object: &ObjectMeta, owner: &O) -> bool
where
    O: Resource,
{
    let Some(owner_uid) = owner.meta().uid.as_deref() else {
        return false;
    };
    object
        .owner_references
        .iter()
        .flatten()
        .find(|reference| reference.controller == Some(true))
        .is_some_and(|reference| reference.uid == owner_uid)
}
