use super::{Context, DesiredState, ObjectKey, ObjectKind};
#[cfg(not(test))]
use chrono::offset::Utc;
use kuadrant_policy_controller_core::{
    report::{Diagnostic, Report},
    PolicyKind, Topology,
};
use kuadrant_policy_controller_k8s_api::{
    self as k8s,
    policy::{PolicyStatus, CONDITION_ACCEPTED, CONDITION_ENFORCED},
    Condition, Resource, Time,
};

/// Writes the status of every AuthPolicy and RateLimitPolicy whose computed
/// conditions differ from those last observed.
pub(super) fn build(
    topology: &Topology,
    report: &Report,
    ctx: &Context<'_>,
    desired: &mut DesiredState,
) {
    #[cfg(not(test))]
    let timestamp = Utc::now();
    #[cfg(test)]
    let timestamp = chrono::DateTime::<chrono::Utc>::MIN_UTC;

    for policy in topology.policies(|_| true) {
        let policy_ref = policy.policy_ref();
        let Some(key) = ObjectKey::policy(&policy_ref) else {
            continue;
        };
        let observed = ctx.observed.get(&policy_ref);
        let previous = observed
            .and_then(|o| o.status.as_ref())
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();

        let status = PolicyStatus {
            conditions: conditions(
                policy_ref.kind,
                report.diagnostics(&policy_ref),
                previous,
                observed.and_then(|o| o.generation),
                Time(timestamp),
            ),
            observed_generation: observed.and_then(|o| o.generation),
        };
        if observed.and_then(|o| o.status.as_ref()) == Some(&status) {
            continue;
        }

        let patch = make_patch(key.kind, &status);
        desired.merge_status(key, patch);
    }
}

/// Builds the `Accepted` and, for accepted policies, `Enforced` conditions.
/// A condition keeps its previous transition time unless its status changes.
pub(crate) fn conditions(
    kind: PolicyKind,
    diagnostics: &[Diagnostic],
    previous: &[Condition],
    generation: Option<i64>,
    now: Time,
) -> Vec<Condition> {
    let condition = |type_: &str, accepted: bool, reason: &str, message: String| {
        let status = if accepted { "True" } else { "False" };
        let last_transition_time = previous
            .iter()
            .find(|c| c.type_ == type_ && c.status == status)
            .map(|c| c.last_transition_time.clone())
            .unwrap_or_else(|| now.clone());
        Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message,
            observed_generation: generation,
            last_transition_time,
        }
    };

    let rejected = diagnostics.iter().find_map(|d| match d {
        Diagnostic::TargetNotFound(_) => Some(("TargetNotFound", d)),
        Diagnostic::UnsupportedTargetKind(_) => Some(("Invalid", d)),
        Diagnostic::Conflicted { .. } => Some(("Conflicted", d)),
        _ => None,
    });
    if let Some((reason, diagnostic)) = rejected {
        return vec![condition(
            CONDITION_ACCEPTED,
            false,
            reason,
            format!("{kind} is not accepted: {diagnostic}"),
        )];
    }

    let accepted = condition(
        CONDITION_ACCEPTED,
        true,
        "Accepted",
        format!("{kind} has been accepted"),
    );
    let unenforced = diagnostics.iter().find_map(|d| match d {
        Diagnostic::Overridden { .. } => Some(("Overridden", d)),
        Diagnostic::Unenforced => Some(("Unknown", d)),
        _ => None,
    });
    let enforced = match unenforced {
        Some((reason, diagnostic)) => condition(
            CONDITION_ENFORCED,
            false,
            reason,
            format!("{kind} is not in effect: {diagnostic}"),
        ),
        None => condition(
            CONDITION_ENFORCED,
            true,
            "Enforced",
            format!("{kind} has been successfully enforced"),
        ),
    };
    vec![accepted, enforced]
}

/// A merge patch of a policy's status subresource.
pub fn make_patch(kind: ObjectKind, status: &PolicyStatus) -> serde_json::Value {
    let (api_version, kind) = match kind {
        ObjectKind::AuthPolicy => (
            k8s::policy::AuthPolicy::api_version(&()),
            k8s::policy::AuthPolicy::kind(&()),
        ),
        ObjectKind::RateLimitPolicy => (
            k8s::policy::RateLimitPolicy::api_version(&()),
            k8s::policy::RateLimitPolicy::kind(&()),
        ),
        kind => (kind.as_str().into(), kind.as_str().into()),
    };
    serde_json::json!({
        "apiVersion": api_version,
        "kind": kind,
        "status": status,
    })
}
