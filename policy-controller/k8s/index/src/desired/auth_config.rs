use super::{object_meta, Context, DesiredState, ObjectKey, ObjectKind};
use kuadrant_policy_controller_core::{
    http_route::HttpRoute,
    policy::AuthScheme,
    predicate::{authorization::AuthEngine, compile, Expr, Operator, Pattern},
    route_selector, Layered, PolicyKind, ResourceId, Resolver, Topology,
};
use kuadrant_policy_controller_k8s_api::authorino::{
    AuthConfig, AuthConfigSpec, PatternExpression, PatternExpressionOrRef, PatternOperator,
};

/// The name of the AuthConfig built for an AuthPolicy.
pub(crate) fn name(policy: &ResourceId) -> String {
    format!("ap-{}-{}", policy.namespace, policy.name)
}

/// Builds an AuthConfig, in the policy's namespace, for every AuthPolicy
/// governing at least one route. Overridden policies get none.
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

        let mut routes = Vec::<&HttpRoute>::new();
        for (_, route) in resolver.routes_governed_by(&policy_ref) {
            if !routes.iter().any(|r| r.id == route.route().id) {
                routes.push(route.route());
            }
        }

        let Some(spec) = spec(&ap.common_spec(), &routes) else {
            tracing::debug!(policy = %policy_ref.id, "AuthPolicy selects no routes");
            continue;
        };

        let id = ResourceId::new(&policy_ref.id.namespace, name(&policy_ref.id));
        let owner = ObjectKey::policy(&policy_ref).and_then(|key| ctx.owners.get(&key));
        let mut config = AuthConfig::new(&id.name, spec);
        config.metadata = object_meta(&id, owner);
        desired.apply(ObjectKey::new(ObjectKind::AuthConfig, id), &config);
    }
}

/// Builds the AuthConfig for the rules `scheme` selects from `routes`.
/// Returns `None` when nothing is selected.
pub(crate) fn spec(scheme: &AuthScheme, routes: &[&HttpRoute]) -> Option<AuthConfigSpec> {
    let selections = routes
        .iter()
        .flat_map(|route| route_selector::select(&scheme.route_selectors, route))
        .collect::<Vec<_>>();
    if selections.is_empty() {
        return None;
    }

    let mut hosts = Vec::<String>::new();
    let mut arms = Vec::<PatternExpressionOrRef>::new();
    let mut unconditional = false;
    for selection in selections.iter() {
        for host in selection.hostnames.iter() {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
        let compiled = match compile(&AuthEngine, &selection.rule, &selection.hostnames) {
            Some(Expr::AnyOf(exprs)) => exprs,
            Some(expr) => vec![expr],
            None => {
                unconditional = true;
                continue;
            }
        };
        for expr in compiled {
            let arm = expression(expr);
            if !arms.contains(&arm) {
                arms.push(arm);
            }
        }
    }

    let mut when = Vec::with_capacity(scheme.when.len() + 1);
    if !unconditional && !arms.is_empty() {
        when.push(PatternExpressionOrRef::Any { any: arms });
    }
    when.extend(
        scheme
            .when
            .iter()
            .map(|p| PatternExpressionOrRef::Pattern(pattern(p))),
    );

    Some(AuthConfigSpec {
        hosts,
        when,
        authentication: scheme.authentication.clone(),
        metadata: scheme.metadata.clone(),
        authorization: scheme.authorization.clone(),
        response: scheme.response.clone(),
        callbacks: scheme.callbacks.clone(),
    })
}

fn expression(expr: Expr<Pattern>) -> PatternExpressionOrRef {
    match expr {
        Expr::Leaf(p) => PatternExpressionOrRef::Pattern(pattern(&p)),
        Expr::AllOf(exprs) => PatternExpressionOrRef::All {
            all: exprs.into_iter().map(expression).collect(),
        },
        Expr::AnyOf(exprs) => PatternExpressionOrRef::Any {
            any: exprs.into_iter().map(expression).collect(),
        },
    }
}

/// The engine has no prefix or suffix operators; those become anchored
/// regular expressions.
fn pattern(p: &Pattern) -> PatternExpression {
    let (operator, value) = match p.operator {
        Operator::Eq => (PatternOperator::Eq, p.value.clone()),
        Operator::Neq => (PatternOperator::Neq, p.value.clone()),
        Operator::Incl => (PatternOperator::Incl, p.value.clone()),
        Operator::Excl => (PatternOperator::Excl, p.value.clone()),
        Operator::Matches => (PatternOperator::Matches, p.value.clone()),
        Operator::StartsWith => (
            PatternOperator::Matches,
            format!("^{}", regex::escape(&p.value)),
        ),
        Operator::EndsWith => (
            PatternOperator::Matches,
            format!("{}$", regex::escape(&p.value)),
        ),
    };
    PatternExpression {
        selector: p.selector.clone(),
        operator,
        value,
    }
}
