use super::{Context, DesiredState, ObjectKey, ObjectKind};
use kuadrant_policy_controller_core::ratelimit::RateLimitIndex;
use kuadrant_policy_controller_k8s_api::limitador::RateLimit;

/// Replaces the rate limit service's limits with those of every effective
/// policy. The limit list is always desired, so removing the last policy
/// clears it.
pub(super) fn build(limits: &RateLimitIndex, ctx: &Context<'_>, desired: &mut DesiredState) {
    let limits = limits
        .counter_limits()
        .into_iter()
        .map(|c| RateLimit {
            namespace: c.namespace,
            max_value: c.max_value,
            seconds: c.seconds,
            conditions: c.conditions,
            variables: c.variables,
        })
        .collect::<Vec<_>>();
    desired.merge(
        ObjectKey::new(ObjectKind::Limitador, ctx.cluster.limitador_id()),
        serde_json::json!({ "spec": { "limits": limits } }),
    );
}
