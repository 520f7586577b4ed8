use super::{PolicyStatus, PolicyTargetRef, RouteSelector, WhenCondition};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attaches authentication and authorization to a Gateway or an HTTPRoute.
///
/// A gateway-level policy's `defaults` apply to routes without an AuthPolicy
/// of their own; its `overrides` replace the policies of every route under
/// the gateway. Without either, the top-level scheme acts as `defaults`.
#[derive(
    Clone, Debug, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "kuadrant.io",
    version = "v1beta2",
    kind = "AuthPolicy",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicySpec {
    pub target_ref: PolicyTargetRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<AuthScheme>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<AuthScheme>,

    #[serde(flatten)]
    pub scheme: AuthScheme,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct AuthScheme {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route_selectors: Vec<RouteSelector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenCondition>,

    #[serde(default)]
    pub rules: AuthRules,
}

/// The authorization engine's auth pipeline, passed through untouched.
#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct AuthRules {
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_gateway_override() {
        let ap: AuthPolicy = serde_json::from_value(serde_json::json!({
            "apiVersion": "kuadrant.io/v1beta2",
            "kind": "AuthPolicy",
            "metadata": { "namespace": "gateway-system", "name": "gw-auth" },
            "spec": {
                "targetRef": {
                    "group": "gateway.networking.k8s.io",
                    "kind": "Gateway",
                    "name": "kuadrant-ingressgateway",
                },
                "overrides": {
                    "rules": {
                        "authorization": {
                            "deny-all": { "opa": { "rego": "allow = false" } },
                        },
                    },
                },
            },
        }))
        .expect("AuthPolicy must parse");

        assert_eq!(ap.spec.target_ref.kind, "Gateway");
        assert_eq!(ap.spec.scheme, AuthScheme::default());
        let overrides = ap.spec.overrides.expect("overrides must be set");
        assert!(overrides.rules.authorization.contains_key("deny-all"));
    }

    #[test]
    fn parses_route_policy() {
        let ap: AuthPolicy = serde_json::from_value(serde_json::json!({
            "apiVersion": "kuadrant.io/v1beta2",
            "kind": "AuthPolicy",
            "metadata": { "namespace": "toystore", "name": "toystore" },
            "spec": {
                "targetRef": {
                    "group": "gateway.networking.k8s.io",
                    "kind": "HTTPRoute",
                    "name": "toystore",
                },
                "routeSelectors": [{ "matches": [{ "path": { "type": "PathPrefix", "value": "/admin" } }] }],
                "when": [{ "selector": "request.method", "operator": "neq", "value": "OPTIONS" }],
                "rules": {
                    "authentication": { "api-key": { "apiKey": {} } },
                },
            },
        }))
        .expect("AuthPolicy must parse");

        assert_eq!(ap.spec.defaults, None);
        assert_eq!(ap.spec.scheme.route_selectors.len(), 1);
        assert_eq!(ap.spec.scheme.when[0].operator, crate::policy::WhenOperator::Neq);
        assert!(ap.spec.scheme.rules.authentication.contains_key("api-key"));
    }
}
