use super::{object_meta, Context, DesiredState, ObjectKey, ObjectKind};
use kuadrant_policy_controller_core::{
    predicate::{Expr, Pattern},
    ratelimit::{DataItem, EffectiveLimits, LimitRule, RateLimitIndex},
    PolicyRef, ResourceId, Topology, GATEWAY_API_GROUP,
};
use kuadrant_policy_controller_k8s_api::istio::{
    wasm_plugin::{self as wasm, FailureMode, PluginConfig, PluginPhase},
    TargetRef, WasmPlugin, WasmPluginSpec,
};

pub(crate) fn name(gateway: &ResourceId) -> String {
    format!("kuadrant-{}", gateway.name)
}

/// Builds a WasmPlugin, in the gateway's namespace, for every gateway with
/// effective rate limit policies.
pub(super) fn build(
    topology: &Topology,
    limits: &RateLimitIndex,
    ctx: &Context<'_>,
    desired: &mut DesiredState,
) {
    for gw in topology.gateways() {
        let gateway = gw.id();
        let policies = limits
            .for_gateway(gateway)
            .filter_map(|(policy, effective)| {
                rate_limit_policy(gateway, policy, effective, &ctx.cluster.rate_limit_service)
            })
            .collect::<Vec<_>>();
        if policies.is_empty() {
            continue;
        }

        let id = ResourceId::new(&gateway.namespace, name(gateway));
        let spec = WasmPluginSpec {
            target_ref: Some(TargetRef {
                group: GATEWAY_API_GROUP.to_string(),
                kind: "Gateway".to_string(),
                name: gateway.name.clone(),
            }),
            url: ctx.cluster.wasm_image_url.clone(),
            phase: Some(PluginPhase::Stats),
            plugin_config: PluginConfig {
                failure_mode: FailureMode::Deny,
                rate_limit_policies: policies,
            },
        };
        let owner = ctx.owners.get(&ObjectKey::gateway(gateway));
        let mut plugin = WasmPlugin::new(&id.name, spec);
        plugin.metadata = object_meta(&id, owner);
        desired.apply(ObjectKey::new(ObjectKind::WasmPlugin, id), &plugin);
    }
}

/// The filter configuration of one effective policy. Counters are
/// namespaced by gateway, so the gateway is the policy's domain.
fn rate_limit_policy(
    gateway: &ResourceId,
    policy: &PolicyRef,
    effective: &EffectiveLimits,
    service: &str,
) -> Option<wasm::RateLimitPolicy> {
    let rules = effective
        .rules(&policy.id)
        .into_iter()
        .map(rule)
        .collect::<Vec<_>>();
    if rules.is_empty() {
        return None;
    }
    Some(wasm::RateLimitPolicy {
        name: policy.id.to_string(),
        domain: gateway.to_string(),
        service: service.to_string(),
        hostnames: effective.hostnames(),
        rules,
    })
}

fn rule(LimitRule { conditions, data }: LimitRule) -> wasm::Rule {
    wasm::Rule {
        conditions: conditions
            .into_iter()
            .map(|all| wasm::Condition {
                all_of: all.into_iter().map(expression).collect(),
            })
            .collect(),
        data: data
            .into_iter()
            .map(|item| match item {
                DataItem::Static { key, value } => wasm::DataItem::Static {
                    static_: wasm::StaticData { key, value },
                },
                DataItem::Selector { selector } => wasm::DataItem::Selector {
                    selector: wasm::SelectorData { selector },
                },
            })
            .collect(),
    }
}

fn expression(expr: Expr<Pattern>) -> wasm::Expression {
    match expr {
        Expr::Leaf(Pattern {
            selector,
            operator,
            value,
        }) => wasm::Expression::Pattern(wasm::PatternExpression {
            selector,
            operator: operator.as_str().to_string(),
            value,
        }),
        Expr::AllOf(exprs) => wasm::Expression::AllOf {
            all_of: exprs.into_iter().map(expression).collect(),
        },
        Expr::AnyOf(exprs) => wasm::Expression::AnyOf {
            any_of: exprs.into_iter().map(expression).collect(),
        },
    }
}
