pub mod auth_policy;
pub mod dns_policy;
pub mod ratelimit_policy;
pub mod route_selector;
pub mod target_ref;
pub mod tls_policy;

pub use self::{
    auth_policy::{AuthPolicy, AuthPolicySpec, AuthRules, AuthScheme},
    dns_policy::{DnsPolicy, DnsPolicySpec},
    ratelimit_policy::{Limit, Rate, RateLimitPolicy, RateLimitPolicySpec, TimeUnit},
    route_selector::RouteSelector,
    target_ref::PolicyTargetRef,
    tls_policy::{TlsPolicy, TlsPolicySpec},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;

/// The policy has been validated and its target exists.
pub const CONDITION_ACCEPTED: &str = "Accepted";

/// The policy is in effect for at least one route.
pub const CONDITION_ENFORCED: &str = "Enforced";

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// An additional `selector operator value` constraint on a request.
#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct WhenCondition {
    pub selector: String,
    pub operator: WhenOperator,
    pub value: String,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum WhenOperator {
    Eq,
    Neq,
    StartsWith,
    EndsWith,
    Incl,
    Excl,
    Matches,
}
