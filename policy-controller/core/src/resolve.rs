//! Decides which policy of a layered kind governs each gateway/route pair.
//!
//! Per gateway, at most one gateway-level policy is in effect: the oldest
//! atomic override or, without one, the oldest default. Per route, the oldest
//! route-level policy is in effect. The effective policy for a route under a
//! gateway is then:
//!
//! 1. the gateway's override;
//! 2. otherwise the route's own policy;
//! 3. otherwise the gateway's default.
//!
//! Policies losing a tie are reported as conflicted and never take effect. A
//! gateway default next to an override is reported as overridden by it.

use crate::{
    report::{Diagnostic, Report},
    topology::{GatewayNode, PolicyNode, RouteNode},
    Attachment, PolicyKind, PolicyRef, ResourceId, Topology,
};
use ahash::AHashMap as HashMap;

#[derive(Debug)]
pub struct Resolver<'t> {
    topology: &'t Topology,
    gateways: HashMap<ResourceId, GatewayLayers<'t>>,
    routes: HashMap<ResourceId, PolicyNode<'t>>,
}

#[derive(Debug, Default)]
struct GatewayLayers<'t> {
    overrides: Option<PolicyNode<'t>>,
    defaults: Option<PolicyNode<'t>>,
}

impl<'t> Resolver<'t> {
    /// Resolves every gateway and route of `topology` for policies of
    /// `kind`, recording conflicts, overrides and unenforced policies in
    /// `report`.
    pub fn new(topology: &'t Topology, kind: PolicyKind, report: &mut Report) -> Self {
        debug_assert!(kind.supports_layering(), "{kind} is not layered");
        let mut gateways = HashMap::default();
        for gw in topology.gateways() {
            let (overrides, defaults) = gw
                .policies(kind)
                .partition::<Vec<_>, _>(|p| p.policy().is_atomic_override());
            let overrides = oldest(overrides, report);
            let defaults = match (&overrides, oldest(defaults, report)) {
                (Some(winner), Some(default)) => {
                    report.record(
                        default.policy_ref(),
                        Diagnostic::Overridden {
                            by: winner.policy_ref(),
                        },
                    );
                    report.record_affected(default.policy_ref(), winner.policy_ref());
                    None
                }
                (_, defaults) => defaults,
            };
            gateways.insert(
                gw.id().clone(),
                GatewayLayers {
                    overrides,
                    defaults,
                },
            );
        }

        let mut routes = HashMap::default();
        for route in topology.routes() {
            if let Some(winner) = oldest(route.policies(kind).collect(), report) {
                routes.insert(route.id().clone(), winner);
            }
        }

        let resolver = Self {
            topology,
            gateways,
            routes,
        };
        resolver.report_overrides(report);
        resolver.report_unenforced(report);
        resolver
    }

    /// The policy in effect for `route` under `gw`.
    pub fn effective(&self, gw: &GatewayNode<'t>, route: &RouteNode<'t>) -> Option<PolicyNode<'t>> {
        let layers = self.gateways.get(gw.id());
        layers
            .and_then(|l| l.overrides)
            .or_else(|| self.routes.get(route.id()).copied())
            .or_else(|| layers.and_then(|l| l.defaults))
    }

    /// Every gateway/route pair `policy` is effective for, ordered by
    /// gateway then route.
    pub fn routes_governed_by(&self, policy: &PolicyRef) -> Vec<(GatewayNode<'t>, RouteNode<'t>)> {
        let mut governed = Vec::new();
        for gw in self.topology.gateways() {
            for route in gw.routes() {
                if self
                    .effective(&gw, &route)
                    .map_or(false, |p| p.policy_ref() == *policy)
                {
                    governed.push((gw, route));
                }
            }
        }
        governed
    }

    fn report_overrides(&self, report: &mut Report) {
        for (route_id, policy) in self.routes.iter() {
            let Some(route) = self.topology.route(route_id) else {
                continue;
            };
            let overrides = route
                .parents()
                .filter_map(|gw| self.gateways.get(gw.id()).and_then(|l| l.overrides))
                .collect::<Vec<_>>();
            for o in overrides.iter() {
                report.record_affected(policy.policy_ref(), o.policy_ref());
            }
            // Only overridden once no parent leaves the route policy in effect.
            if !overrides.is_empty() && overrides.len() == route.parents().count() {
                report.record(
                    policy.policy_ref(),
                    Diagnostic::Overridden {
                        by: overrides[0].policy_ref(),
                    },
                );
            }
        }
    }

    fn report_unenforced(&self, report: &mut Report) {
        let winners = self
            .gateways
            .values()
            .flat_map(|l| l.overrides.into_iter().chain(l.defaults))
            .chain(self.routes.values().copied());
        for policy in winners {
            let policy_ref = policy.policy_ref();
            let overridden = report
                .diagnostics(&policy_ref)
                .iter()
                .any(|d| matches!(d, Diagnostic::Overridden { .. }));
            if !overridden && self.routes_governed_by(&policy_ref).is_empty() {
                report.record(policy_ref, Diagnostic::Unenforced);
            }
        }
    }
}

/// Picks the first of `candidates`, which are in precedence order, and
/// reports the rest as conflicting with it.
fn oldest<'t>(candidates: Vec<PolicyNode<'t>>, report: &mut Report) -> Option<PolicyNode<'t>> {
    let mut candidates = candidates.into_iter();
    let winner = candidates.next()?;
    for loser in candidates {
        conflict(&loser, &winner, report);
    }
    Some(winner)
}

fn conflict(loser: &PolicyNode<'_>, winner: &PolicyNode<'_>, report: &mut Report) {
    tracing::debug!(policy = %loser.policy_ref(), winner = %winner.policy_ref(), "Policy conflicts");
    report.record(
        loser.policy_ref(),
        Diagnostic::Conflicted {
            winner: winner.policy_ref(),
        },
    );
}

/// Records a diagnostic for every policy whose target cannot be resolved.
pub fn report_targets(topology: &Topology, report: &mut Report) {
    for policy in topology.policies(|_| true) {
        if let Err(error) = policy.target() {
            report.record(policy.policy_ref(), Diagnostic::from(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        topology::tests::{mk_auth, mk_auth_override, mk_gateway, mk_route, mk_rlp},
        TargetRef,
    };
    use pretty_assertions::assert_eq;

    fn auth(name: &str) -> PolicyRef {
        PolicyRef::new(PolicyKind::Auth, ResourceId::new("ns-0", name))
    }

    fn names(governed: &[(GatewayNode<'_>, RouteNode<'_>)]) -> Vec<(String, String)> {
        governed
            .iter()
            .map(|(gw, r)| (gw.id().name.clone(), r.id().name.clone()))
            .collect()
    }

    fn pair(gw: &str, route: &str) -> (String, String) {
        (gw.to_string(), route.to_string())
    }

    #[test]
    fn route_policy_beats_gateway_default() {
        let topology = Topology::build(
            vec![mk_gateway("ns-0", "gw")],
            vec![
                mk_route("ns-0", "route-a", &["gw"]),
                mk_route("ns-0", "route-b", &["gw"]),
            ],
            vec![
                mk_auth("ns-0", "gw-default", TargetRef::gateway("gw"), 0),
                mk_auth("ns-0", "route-a-ap", TargetRef::http_route("route-a"), 0),
            ],
        );
        let mut report = Report::default();
        let resolver = Resolver::new(&topology, PolicyKind::Auth, &mut report);

        assert_eq!(
            names(&resolver.routes_governed_by(&auth("route-a-ap"))),
            vec![pair("gw", "route-a")]
        );
        assert_eq!(
            names(&resolver.routes_governed_by(&auth("gw-default"))),
            vec![pair("gw", "route-b")]
        );
        assert_eq!(report, Report::default());
    }

    #[test]
    fn atomic_override_supersedes_route_policies() {
        let topology = Topology::build(
            vec![mk_gateway("ns-0", "gw")],
            vec![mk_route("ns-0", "route", &["gw"])],
            vec![
                mk_auth_override("ns-0", "gw-override", TargetRef::gateway("gw"), 10),
                mk_auth("ns-0", "route-ap", TargetRef::http_route("route"), 0),
            ],
        );
        let mut report = Report::default();
        let resolver = Resolver::new(&topology, PolicyKind::Auth, &mut report);

        assert!(resolver.routes_governed_by(&auth("route-ap")).is_empty());
        assert_eq!(
            names(&resolver.routes_governed_by(&auth("gw-override"))),
            vec![pair("gw", "route")]
        );
        assert_eq!(
            report.affected_by(&auth("route-ap")).collect::<Vec<_>>(),
            vec![&auth("gw-override")]
        );
        assert_eq!(
            report.diagnostics(&auth("route-ap")),
            &[Diagnostic::Overridden {
                by: auth("gw-override")
            }]
        );
        assert!(report.diagnostics(&auth("gw-override")).is_empty());
    }

    #[test]
    fn override_under_one_parent_only() {
        let topology = Topology::build(
            vec![mk_gateway("ns-0", "gw-a"), mk_gateway("ns-0", "gw-b")],
            vec![mk_route("ns-0", "route", &["gw-a", "gw-b"])],
            vec![
                mk_auth_override("ns-0", "gw-override", TargetRef::gateway("gw-a"), 0),
                mk_auth("ns-0", "route-ap", TargetRef::http_route("route"), 0),
            ],
        );
        let mut report = Report::default();
        let resolver = Resolver::new(&topology, PolicyKind::Auth, &mut report);

        assert_eq!(
            names(&resolver.routes_governed_by(&auth("route-ap"))),
            vec![pair("gw-b", "route")]
        );
        assert_eq!(report.affected_by(&auth("route-ap")).count(), 1);
        assert!(report.diagnostics(&auth("route-ap")).is_empty());
    }

    #[test]
    fn oldest_override_wins() {
        let topology = Topology::build(
            vec![mk_gateway("ns-0", "gw")],
            vec![mk_route("ns-0", "route", &["gw"])],
            vec![
                mk_auth_override("ns-0", "newer", TargetRef::gateway("gw"), 20),
                mk_auth_override("ns-0", "older", TargetRef::gateway("gw"), 10),
                mk_auth("ns-0", "default", TargetRef::gateway("gw"), 0),
            ],
        );
        let mut report = Report::default();
        let resolver = Resolver::new(&topology, PolicyKind::Auth, &mut report);

        assert_eq!(
            names(&resolver.routes_governed_by(&auth("older"))),
            vec![pair("gw", "route")]
        );
        assert!(resolver.routes_governed_by(&auth("newer")).is_empty());
        assert_eq!(
            report.diagnostics(&auth("newer")),
            &[Diagnostic::Conflicted {
                winner: auth("older")
            }]
        );
    }

    #[test]
    fn override_supersedes_gateway_default() {
        let topology = Topology::build(
            vec![mk_gateway("ns-0", "gw")],
            vec![mk_route("ns-0", "route", &["gw"])],
            vec![
                mk_auth_override("ns-0", "gw-override", TargetRef::gateway("gw"), 10),
                mk_auth("ns-0", "gw-default", TargetRef::gateway("gw"), 0),
            ],
        );
        let mut report = Report::default();
        let resolver = Resolver::new(&topology, PolicyKind::Auth, &mut report);

        assert!(resolver.routes_governed_by(&auth("gw-default")).is_empty());
        assert_eq!(
            report.diagnostics(&auth("gw-default")),
            &[Diagnostic::Overridden {
                by: auth("gw-override")
            }]
        );
        assert_eq!(
            report.affected_by(&auth("gw-default")).collect::<Vec<_>>(),
            vec![&auth("gw-override")]
        );
        assert!(report.diagnostics(&auth("gw-override")).is_empty());
    }

    #[test]
    fn tie_breaks_by_name() {
        let topology = Topology::build(
            vec![mk_gateway("ns-0", "gw")],
            vec![mk_route("ns-0", "route", &["gw"])],
            vec![
                mk_auth_override("ns-0", "b", TargetRef::gateway("gw"), 10),
                mk_auth_override("ns-0", "a", TargetRef::gateway("gw"), 10),
            ],
        );
        let mut report = Report::default();
        Resolver::new(&topology, PolicyKind::Auth, &mut report);
        assert_eq!(
            report.diagnostics(&auth("b")),
            &[Diagnostic::Conflicted { winner: auth("a") }]
        );
    }

    #[test]
    fn default_without_eligible_routes_is_unenforced() {
        let topology = Topology::build(
            vec![mk_gateway("ns-0", "gw"), mk_gateway("ns-0", "empty")],
            vec![mk_route("ns-0", "route", &["gw"])],
            vec![
                mk_auth("ns-0", "gw-default", TargetRef::gateway("gw"), 0),
                mk_auth("ns-0", "route-ap", TargetRef::http_route("route"), 0),
                mk_auth("ns-0", "empty-default", TargetRef::gateway("empty"), 0),
            ],
        );
        let mut report = Report::default();
        Resolver::new(&topology, PolicyKind::Auth, &mut report);
        assert_eq!(report.diagnostics(&auth("gw-default")), &[Diagnostic::Unenforced]);
        assert_eq!(report.diagnostics(&auth("empty-default")), &[Diagnostic::Unenforced]);
        assert!(report.diagnostics(&auth("route-ap")).is_empty());
    }

    #[test]
    fn kinds_are_resolved_independently() {
        let topology = Topology::build(
            vec![mk_gateway("ns-0", "gw")],
            vec![mk_route("ns-0", "route", &["gw"])],
            vec![
                mk_auth_override("ns-0", "ap", TargetRef::gateway("gw"), 0),
                mk_rlp("ns-0", "rlp", TargetRef::http_route("route"), 0),
            ],
        );
        let mut report = Report::default();
        let resolver = Resolver::new(&topology, PolicyKind::RateLimit, &mut report);
        let rlp = PolicyRef::new(PolicyKind::RateLimit, ResourceId::new("ns-0", "rlp"));
        assert_eq!(resolver.routes_governed_by(&rlp).len(), 1);
        assert_eq!(report, Report::default());
    }

    #[test]
    fn reports_unresolved_targets() {
        let topology = Topology::build(
            vec![],
            vec![],
            vec![mk_auth("ns-0", "ap", TargetRef::http_route("missing"), 0)],
        );
        let mut report = Report::default();
        report_targets(&topology, &mut report);
        assert_eq!(
            report.diagnostics(&auth("ap")),
            &[Diagnostic::TargetNotFound(
                "HTTPRoute ns-0/missing".to_string()
            )]
        );
    }
}
