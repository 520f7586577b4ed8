use super::{object_meta, Context, DesiredState, ObjectKey, ObjectKind};
use kuadrant_policy_controller_core::{
    http_route::HttpRoute,
    policy::AuthScheme,
    predicate::proxy,
    route_selector, GatewayDiff, Layered, PolicyKind, ResourceId, Resolver, Topology,
    GATEWAY_API_GROUP,
};
use kuadrant_policy_controller_k8s_api::istio::{
    authorization_policy::{Action, Condition, Operation, Provider, Rule, To},
    AuthorizationPolicy, AuthorizationPolicySpec, TargetRef,
};

/// The name of the AuthorizationPolicy delegating a gateway's requests for
/// an AuthPolicy's routes.
pub(crate) fn name(gateway: &ResourceId, policy: &ResourceId) -> String {
    format!(
        "on-{}-using-{}-{}",
        gateway.name, policy.namespace, policy.name
    )
}

/// Builds an AuthorizationPolicy, in the gateway's namespace, for every
/// gateway an AuthPolicy should be referenced by and governs routes under.
pub(super) fn build(
    topology: &Topology,
    resolver: &Resolver<'_>,
    ctx: &Context<'_>,
    desired: &mut DesiredState,
) {
    for policy in topology.policies_of_kind(PolicyKind::Auth) {
        let Some(ap) = policy.policy().as_auth() else {
            continue;
        };
        let policy_ref = policy.policy_ref();
        let scheme = ap.common_spec();
        let governed = resolver.routes_governed_by(&policy_ref);

        let diff = GatewayDiff::compute(topology, &policy_ref);
        for gateway in diff.to_configure() {
            let routes = governed
                .iter()
                .filter(|(gw, _)| gw.id() == gateway)
                .map(|(_, route)| route.route())
                .collect::<Vec<_>>();
            let rules = rules(&scheme, &routes);
            if rules.is_empty() {
                continue;
            }

            let id = ResourceId::new(&gateway.namespace, name(gateway, &policy_ref.id));
            let spec = AuthorizationPolicySpec {
                target_ref: Some(TargetRef {
                    group: GATEWAY_API_GROUP.to_string(),
                    kind: "Gateway".to_string(),
                    name: gateway.name.clone(),
                }),
                action: Action::Custom,
                provider: Some(Provider {
                    name: ctx.cluster.authorization_provider.clone(),
                }),
                rules,
            };
            let owner = ctx.owners.get(&ObjectKey::gateway(gateway));
            let mut authz = AuthorizationPolicy::new(&id.name, spec);
            authz.metadata = object_meta(&id, owner);
            desired.apply(ObjectKey::new(ObjectKind::AuthorizationPolicy, id), &authz);
        }
    }
}

/// The proxy rules delegating the requests `scheme` selects from `routes`.
/// `when` patterns are not expressible by the proxy and are left to the
/// authorization engine.
pub(crate) fn rules(scheme: &AuthScheme, routes: &[&HttpRoute]) -> Vec<Rule> {
    let mut rules = Vec::<Rule>::new();
    for route in routes {
        for selection in route_selector::select(&scheme.route_selectors, route) {
            for rule in proxy::rules(&selection.rule, &selection.hostnames) {
                let rule = Rule {
                    to: rule
                        .to
                        .into_iter()
                        .map(|op| To {
                            operation: Operation {
                                hosts: op.hosts,
                                methods: op.methods,
                                paths: op.paths,
                            },
                        })
                        .collect(),
                    when: rule
                        .when
                        .into_iter()
                        .map(|c| Condition {
                            key: c.key,
                            values: c.values,
                        })
                        .collect(),
                };
                if !rules.contains(&rule) {
                    rules.push(rule);
                }
            }
        }
    }
    rules
}
