//! The authorization engine's configuration resource.

use serde_json::Value;
use std::collections::BTreeMap;

/// Configures the auth pipeline applied to requests for `hosts` that satisfy
/// `when`.
#[derive(
    Clone, Debug, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "authorino.kuadrant.io",
    version = "v1beta2",
    kind = "AuthConfig",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfigSpec {
    pub hosts: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<PatternExpressionOrRef>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authentication: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authorization: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub callbacks: BTreeMap<String, Value>,
}

/// A condition: a single pattern or a conjunction/disjunction of conditions.
#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(untagged)]
pub enum PatternExpressionOrRef {
    Pattern(PatternExpression),
    All { all: Vec<PatternExpressionOrRef> },
    Any { any: Vec<PatternExpressionOrRef> },
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct PatternExpression {
    pub selector: String,
    pub operator: PatternOperator,
    pub value: String,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum PatternOperator {
    Eq,
    Neq,
    Incl,
    Excl,
    Matches,
}
