use super::{PolicyStatus, PolicyTargetRef, RouteSelector, WhenCondition};
use std::collections::BTreeMap;

/// Attaches named rate limits to a Gateway or an HTTPRoute.
#[derive(
    Clone, Debug, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "kuadrant.io",
    version = "v1beta2",
    kind = "RateLimitPolicy",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicySpec {
    pub target_ref: PolicyTargetRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<CommonSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<CommonSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Limit>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct CommonSpec {
    #[serde(default)]
    pub limits: BTreeMap<String, Limit>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Limit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route_selectors: Vec<RouteSelector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenCondition>,

    /// Request attributes that partition the counters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counters: Vec<String>,

    pub rates: Vec<Rate>,
}

/// Allows `limit` hits per `duration` `unit`s.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct Rate {
    pub limit: u64,
    pub duration: u64,
    pub unit: TimeUnit,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}
