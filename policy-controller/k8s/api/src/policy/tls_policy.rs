use super::{PolicyStatus, PolicyTargetRef};

/// Only the target reference is interpreted; certificates are managed
/// elsewhere.
#[derive(
    Clone, Debug, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "kuadrant.io",
    version = "v1alpha1",
    kind = "TLSPolicy",
    root = "TlsPolicy",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TlsPolicySpec {
    pub target_ref: PolicyTargetRef,
}
