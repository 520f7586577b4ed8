//! Partitions gateways by whether they do and should reference a policy.

use crate::{PolicyRef, ResourceId, Topology};
use std::collections::BTreeSet;

/// For one policy: gateways that reference it and should (`valid_refs`),
/// that should but do not yet (`missing_refs`) and that do but no longer
/// should (`invalid_refs`). Each list is sorted by gateway identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GatewayDiff {
    pub valid_refs: Vec<ResourceId>,
    pub missing_refs: Vec<ResourceId>,
    pub invalid_refs: Vec<ResourceId>,
}

impl GatewayDiff {
    pub fn compute(topology: &Topology, policy: &PolicyRef) -> Self {
        let should = should_reference(topology, policy);
        let does = topology
            .gateways()
            .filter(|gw| gw.gateway().references(policy.kind, &policy.id))
            .map(|gw| gw.id().clone())
            .collect::<BTreeSet<_>>();

        Self {
            valid_refs: should.intersection(&does).cloned().collect(),
            missing_refs: should.difference(&does).cloned().collect(),
            invalid_refs: does.difference(&should).cloned().collect(),
        }
    }

    /// The gateways whose downstream resources must be (re)built.
    pub fn to_configure(&self) -> impl Iterator<Item = &ResourceId> {
        self.valid_refs.iter().chain(self.missing_refs.iter())
    }

    /// The gateways whose back-reference annotation needs a patch.
    pub fn is_stale(&self) -> bool {
        !self.missing_refs.is_empty() || !self.invalid_refs.is_empty()
    }
}

/// The gateways that should reference `policy`: its target gateway, or every
/// gateway parenting its target route. Empty when the policy or its target is
/// unknown.
pub fn should_reference(topology: &Topology, policy: &PolicyRef) -> BTreeSet<ResourceId> {
    topology
        .policy(policy)
        .map(|p| p.gateways().into_iter().map(|gw| gw.id().clone()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        topology::tests::{mk_auth, mk_gateway, mk_route},
        Gateway, PolicyKind, TargetRef,
    };
    use maplit::{btreemap, btreeset};
    use pretty_assertions::assert_eq;

    fn referencing(mut gw: Gateway, policies: &[&str]) -> Gateway {
        gw.policy_refs = btreemap! {
            PolicyKind::Auth => policies.iter().map(|p| ResourceId::new("ns-0", p)).collect(),
        };
        gw
    }

    fn id(name: &str) -> ResourceId {
        ResourceId::new("ns-0", name)
    }

    fn auth(name: &str) -> PolicyRef {
        PolicyRef::new(PolicyKind::Auth, id(name))
    }

    #[test]
    fn partitions_route_policy_gateways() {
        let topology = Topology::build(
            vec![
                referencing(mk_gateway("ns-0", "gw-valid"), &["ap"]),
                mk_gateway("ns-0", "gw-missing"),
                referencing(mk_gateway("ns-0", "gw-invalid"), &["ap"]),
                referencing(mk_gateway("ns-0", "gw-other"), &["other"]),
            ],
            vec![mk_route("ns-0", "route", &["gw-valid", "gw-missing"])],
            vec![mk_auth("ns-0", "ap", TargetRef::http_route("route"), 0)],
        );

        let diff = GatewayDiff::compute(&topology, &auth("ap"));
        assert_eq!(
            diff,
            GatewayDiff {
                valid_refs: vec![id("gw-valid")],
                missing_refs: vec![id("gw-missing")],
                invalid_refs: vec![id("gw-invalid")],
            }
        );
        assert!(diff.is_stale());
        assert_eq!(
            diff.to_configure().cloned().collect::<Vec<_>>(),
            vec![id("gw-valid"), id("gw-missing")]
        );
    }

    #[test]
    fn gateway_policy_references_its_target() {
        let topology = Topology::build(
            vec![referencing(mk_gateway("ns-0", "gw"), &["ap"])],
            vec![],
            vec![mk_auth("ns-0", "ap", TargetRef::gateway("gw"), 0)],
        );
        let diff = GatewayDiff::compute(&topology, &auth("ap"));
        assert_eq!(diff.valid_refs, vec![id("gw")]);
        assert!(!diff.is_stale());
    }

    #[test]
    fn deleted_policy_invalidates_every_reference() {
        let topology = Topology::build(
            vec![
                referencing(mk_gateway("ns-0", "gw-a"), &["gone"]),
                referencing(mk_gateway("ns-0", "gw-b"), &["gone"]),
            ],
            vec![],
            vec![],
        );
        let diff = GatewayDiff::compute(&topology, &auth("gone"));
        assert_eq!(diff.invalid_refs, vec![id("gw-a"), id("gw-b")]);
        assert!(diff.valid_refs.is_empty() && diff.missing_refs.is_empty());
    }

    #[test]
    fn partition_is_complete() {
        let topology = Topology::build(
            vec![
                referencing(mk_gateway("ns-0", "gw-a"), &["ap"]),
                mk_gateway("ns-0", "gw-b"),
                referencing(mk_gateway("ns-0", "gw-c"), &["ap"]),
                mk_gateway("ns-0", "gw-d"),
            ],
            vec![
                mk_route("ns-0", "route-1", &["gw-a", "gw-b"]),
                mk_route("ns-0", "route-2", &["gw-c", "gw-d"]),
            ],
            vec![mk_auth("ns-0", "ap", TargetRef::http_route("route-2"), 0)],
        );
        let policy = auth("ap");
        let diff = GatewayDiff::compute(&topology, &policy);

        let set = |ids: &[ResourceId]| ids.iter().cloned().collect::<BTreeSet<_>>();
        let valid = set(&diff.valid_refs);
        assert_eq!(
            &valid | &set(&diff.missing_refs),
            should_reference(&topology, &policy)
        );
        assert_eq!(
            &valid | &set(&diff.invalid_refs),
            btreeset! { id("gw-a"), id("gw-c") }
        );
        assert!(valid.is_disjoint(&set(&diff.missing_refs)));
        assert!(valid.is_disjoint(&set(&diff.invalid_refs)));
    }
}
