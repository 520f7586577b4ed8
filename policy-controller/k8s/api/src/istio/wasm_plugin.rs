use super::TargetRef;

/// Loads the rate-limit filter module into a gateway's proxies.
#[derive(
    Clone, Debug, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "extensions.istio.io",
    version = "v1alpha1",
    kind = "WasmPlugin",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct WasmPluginSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<TargetRef>,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PluginPhase>,

    pub plugin_config: PluginConfig,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum PluginPhase {
    Authn,
    Authz,
    Stats,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    pub failure_mode: FailureMode,

    #[serde(default)]
    pub rate_limit_policies: Vec<RateLimitPolicy>,
}

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    #[default]
    Deny,
    Allow,
}

/// One effective rate limit policy, as seen by the filter.
#[derive(
    Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct RateLimitPolicy {
    pub name: String,
    pub domain: String,
    pub service: String,
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Counts a hit, described by `data`, when any of `conditions` holds (or
/// always, when there are none).
#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    pub data: Vec<DataItem>,
}

#[derive(
    Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub all_of: Vec<Expression>,
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(untagged)]
pub enum Expression {
    Pattern(PatternExpression),
    AnyOf {
        #[serde(rename = "anyOf")]
        any_of: Vec<Expression>,
    },
    AllOf {
        #[serde(rename = "allOf")]
        all_of: Vec<Expression>,
    },
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct PatternExpression {
    pub selector: String,
    pub operator: String,
    pub value: String,
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(untagged)]
pub enum DataItem {
    Static {
        #[serde(rename = "static")]
        static_: StaticData,
    },
    Selector {
        selector: SelectorData,
    },
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct StaticData {
    pub key: String,
    pub value: String,
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct SelectorData {
    pub selector: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_filter_config() {
        let config = PluginConfig {
            failure_mode: FailureMode::Deny,
            rate_limit_policies: vec![RateLimitPolicy {
                name: "toystore/toystore".to_string(),
                domain: "gateway-system/gw".to_string(),
                service: "kuadrant-rate-limiting-service".to_string(),
                hostnames: vec!["*.toystore.com".to_string()],
                rules: vec![Rule {
                    conditions: vec![Condition {
                        all_of: vec![Expression::Pattern(PatternExpression {
                            selector: "request.method".to_string(),
                            operator: "eq".to_string(),
                            value: "GET".to_string(),
                        })],
                    }],
                    data: vec![
                        DataItem::Static {
                            static_: StaticData {
                                key: "limit.toys__1a2b3c4d".to_string(),
                                value: "1".to_string(),
                            },
                        },
                        DataItem::Selector {
                            selector: SelectorData {
                                selector: "auth.identity.username".to_string(),
                            },
                        },
                    ],
                }],
            }],
        };
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            serde_json::json!({
                "failureMode": "deny",
                "rateLimitPolicies": [{
                    "name": "toystore/toystore",
                    "domain": "gateway-system/gw",
                    "service": "kuadrant-rate-limiting-service",
                    "hostnames": ["*.toystore.com"],
                    "rules": [{
                        "conditions": [{
                            "allOf": [{ "selector": "request.method", "operator": "eq", "value": "GET" }],
                        }],
                        "data": [
                            { "static": { "key": "limit.toys__1a2b3c4d", "value": "1" } },
                            { "selector": { "selector": "auth.identity.username" } },
                        ],
                    }],
                }],
            })
        );
    }
}
