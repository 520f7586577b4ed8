//! The rate limit service's configuration resource.

/// Only the limits are managed by the controller; everything else about the
/// deployment is left to its owner.
#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "limitador.kuadrant.io",
    version = "v1alpha1",
    kind = "Limitador",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LimitadorSpec {
    #[serde(default)]
    pub limits: Vec<RateLimit>,
}

#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub namespace: String,
    pub max_value: u64,
    pub seconds: u64,

    #[serde(default)]
    pub conditions: Vec<String>,

    #[serde(default)]
    pub variables: Vec<String>,
}
