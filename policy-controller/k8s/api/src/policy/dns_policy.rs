use super::{PolicyStatus, PolicyTargetRef};

/// Only the target reference is interpreted; DNS records are managed
/// elsewhere.
#[derive(
    Clone, Debug, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "kuadrant.io",
    version = "v1alpha1",
    kind = "DNSPolicy",
    root = "DnsPolicy",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DnsPolicySpec {
    pub target_ref: PolicyTargetRef,
}
