use super::{DesiredState, ObjectKey};
use crate::gateway::{annotation, format_refs, ANNOTATED_KINDS};
use kuadrant_policy_controller_core::{
    Attachment, GatewayDiff, PolicyRef, ResourceId, Topology,
};
use std::collections::{BTreeMap, BTreeSet};

/// Patches the back-reference annotations of every gateway whose references
/// are stale: missing references are added and invalid ones removed. An
/// annotation left without references is removed.
pub(super) fn build(topology: &Topology, desired: &mut DesiredState) {
    let mut patches = BTreeMap::<ResourceId, BTreeMap<&'static str, Option<String>>>::new();

    for kind in ANNOTATED_KINDS {
        let Some(annotation) = annotation(kind) else {
            continue;
        };

        let mut refs = topology
            .gateways()
            .map(|gw| {
                let refs = gw.gateway().policy_refs.get(&kind).cloned();
                (gw.id().clone(), refs.unwrap_or_default())
            })
            .collect::<BTreeMap<_, _>>();

        // Policies that exist and policies that are still referenced after
        // being deleted.
        let policies = topology
            .policies_of_kind(kind)
            .map(|p| p.policy().id().clone())
            .chain(refs.values().flatten().cloned())
            .collect::<BTreeSet<_>>();

        let mut stale = BTreeSet::new();
        for policy in policies {
            let diff = GatewayDiff::compute(topology, &PolicyRef::new(kind, policy.clone()));
            if !diff.is_stale() {
                continue;
            }
            for gw in diff.missing_refs {
                refs.entry(gw.clone()).or_default().insert(policy.clone());
                stale.insert(gw);
            }
            for gw in diff.invalid_refs {
                refs.entry(gw.clone()).or_default().remove(&policy);
                stale.insert(gw);
            }
        }

        for gw in stale {
            let value = refs
                .get(&gw)
                .filter(|refs| !refs.is_empty())
                .map(format_refs);
            patches.entry(gw).or_default().insert(annotation, value);
        }
    }

    for (gw, annotations) in patches {
        desired.merge(
            ObjectKey::gateway(&gw),
            serde_json::json!({ "metadata": { "annotations": annotations } }),
        );
    }
}
