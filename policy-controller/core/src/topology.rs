//! The policy attachment graph.
//!
//! A [`Topology`] is built once per reconciliation from a flat, consistent
//! listing of gateways, routes and policies. Nodes live in arenas sorted by
//! identity so every traversal is deterministic; edges are resolved through
//! identity indexes rather than linear scans.
//!
//! ```text
//! [ Policy ] -> [ Gateway ] <- [ HTTPRoute ] <- [ Policy ]
//! ```

use crate::{
    gateway::Gateway,
    http_route::HttpRoute,
    policy::{Attachment, Policy, PolicyKind, PolicyRef, TargetRef},
    ResourceId, GATEWAY_API_GROUP,
};
use ahash::AHashMap as HashMap;
use tracing::debug;

/// Explains why a policy has no target in the topology.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("{kind} in group {group:?} is not a supported policy target")]
    UnsupportedKind { group: String, kind: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: ResourceId },
}

#[derive(Debug, Default)]
pub struct Topology {
    gateways: Vec<Gateway>,
    routes: Vec<HttpRoute>,
    policies: Vec<Policy>,

    gateways_by_id: HashMap<ResourceId, usize>,
    routes_by_id: HashMap<ResourceId, usize>,
    policies_by_ref: HashMap<PolicyRef, usize>,

    /// Route index -> parent gateway indexes.
    route_parents: Vec<Vec<usize>>,
    /// Gateway index -> child route indexes.
    gateway_routes: Vec<Vec<usize>>,
    /// Policy index -> resolved target.
    policy_targets: Vec<Result<Target, TargetError>>,
    /// Gateway index -> attached policy indexes, in precedence order.
    gateway_policies: Vec<Vec<usize>>,
    /// Route index -> attached policy indexes, in precedence order.
    route_policies: Vec<Vec<usize>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Target {
    Gateway(usize),
    Route(usize),
}

#[derive(Copy, Clone, Debug)]
pub struct GatewayNode<'t> {
    topology: &'t Topology,
    idx: usize,
}

#[derive(Copy, Clone, Debug)]
pub struct RouteNode<'t> {
    topology: &'t Topology,
    idx: usize,
}

#[derive(Copy, Clone, Debug)]
pub struct PolicyNode<'t> {
    topology: &'t Topology,
    idx: usize,
}

/// Anything a policy may attach to.
#[derive(Copy, Clone, Debug)]
pub enum Targetable<'t> {
    Gateway(GatewayNode<'t>),
    Route(RouteNode<'t>),
}

// === impl Topology ===

impl Topology {
    pub fn build(
        gateways: impl IntoIterator<Item = Gateway>,
        routes: impl IntoIterator<Item = HttpRoute>,
        policies: impl IntoIterator<Item = Policy>,
    ) -> Self {
        let mut gateways = gateways.into_iter().collect::<Vec<_>>();
        gateways.sort_by(|a, b| a.id.cmp(&b.id));
        gateways.dedup_by(|a, b| a.id == b.id);
        let mut routes = routes.into_iter().collect::<Vec<_>>();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes.dedup_by(|a, b| a.id == b.id);
        let mut policies = policies.into_iter().collect::<Vec<_>>();
        policies.sort_by_key(|p| p.policy_ref());
        policies.dedup_by_key(|p| p.policy_ref());

        let gateways_by_id = gateways
            .iter()
            .enumerate()
            .map(|(i, gw)| (gw.id.clone(), i))
            .collect::<HashMap<_, _>>();
        let routes_by_id = routes
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect::<HashMap<_, _>>();
        let policies_by_ref = policies
            .iter()
            .enumerate()
            .map(|(i, p)| (p.policy_ref(), i))
            .collect::<HashMap<_, _>>();

        let mut route_parents = vec![vec![]; routes.len()];
        let mut gateway_routes = vec![vec![]; gateways.len()];
        for (ri, route) in routes.iter().enumerate() {
            for parent in route.parent_refs.iter() {
                let Some(gw) = parent.gateway_id(&route.id.namespace) else {
                    debug!(route = %route.id, parent = %parent.name, "Ignoring non-gateway parent");
                    continue;
                };
                match gateways_by_id.get(&gw) {
                    Some(&gi) if !route_parents[ri].contains(&gi) => {
                        route_parents[ri].push(gi);
                        gateway_routes[gi].push(ri);
                    }
                    Some(_) => {}
                    None => debug!(route = %route.id, gateway = %gw, "Parent gateway not found"),
                }
            }
        }

        let policy_targets = policies
            .iter()
            .map(|policy| {
                resolve_target(
                    &policy.id().namespace,
                    policy.target_ref(),
                    &gateways_by_id,
                    &routes_by_id,
                )
            })
            .collect::<Vec<_>>();

        let mut gateway_policies = vec![vec![]; gateways.len()];
        let mut route_policies = vec![vec![]; routes.len()];
        for (pi, target) in policy_targets.iter().enumerate() {
            match target {
                Ok(Target::Gateway(gi)) => gateway_policies[*gi].push(pi),
                Ok(Target::Route(ri)) => route_policies[*ri].push(pi),
                Err(error) => {
                    debug!(policy = %policies[pi].policy_ref(), %error, "Policy target unresolved")
                }
            }
        }
        for attached in gateway_policies.iter_mut().chain(route_policies.iter_mut()) {
            attached.sort_by(|a, b| policies[*a].precedence().cmp(&policies[*b].precedence()));
        }

        Self {
            gateways,
            routes,
            policies,
            gateways_by_id,
            routes_by_id,
            policies_by_ref,
            route_parents,
            gateway_routes,
            policy_targets,
            gateway_policies,
            route_policies,
        }
    }

    pub fn gateways(&self) -> impl Iterator<Item = GatewayNode<'_>> + '_ {
        (0..self.gateways.len()).map(move |idx| GatewayNode {
            topology: self,
            idx,
        })
    }

    pub fn routes(&self) -> impl Iterator<Item = RouteNode<'_>> + '_ {
        (0..self.routes.len()).map(move |idx| RouteNode {
            topology: self,
            idx,
        })
    }

    /// Iterates over the policies satisfying `pred`.
    pub fn policies<'t, F>(&'t self, pred: F) -> impl Iterator<Item = PolicyNode<'t>> + 't
    where
        F: Fn(&Policy) -> bool + 't,
    {
        (0..self.policies.len())
            .filter(move |idx| pred(&self.policies[*idx]))
            .map(move |idx| PolicyNode {
                topology: self,
                idx,
            })
    }

    pub fn policies_of_kind(&self, kind: PolicyKind) -> impl Iterator<Item = PolicyNode<'_>> + '_ {
        self.policies(move |p| p.kind() == kind)
    }

    pub fn gateway(&self, id: &ResourceId) -> Option<GatewayNode<'_>> {
        self.gateways_by_id.get(id).map(|&idx| GatewayNode {
            topology: self,
            idx,
        })
    }

    pub fn route(&self, id: &ResourceId) -> Option<RouteNode<'_>> {
        self.routes_by_id.get(id).map(|&idx| RouteNode {
            topology: self,
            idx,
        })
    }

    pub fn policy(&self, policy: &PolicyRef) -> Option<PolicyNode<'_>> {
        self.policies_by_ref.get(policy).map(|&idx| PolicyNode {
            topology: self,
            idx,
        })
    }

    /// The objects the given policy attaches to. Empty when the target does
    /// not exist.
    pub fn children(&self, policy: &PolicyRef) -> Vec<Targetable<'_>> {
        self.policy(policy)
            .and_then(|p| p.target().ok())
            .into_iter()
            .collect()
    }
}

fn resolve_target(
    policy_ns: &str,
    target_ref: &TargetRef,
    gateways: &HashMap<ResourceId, usize>,
    routes: &HashMap<ResourceId, usize>,
) -> Result<Target, TargetError> {
    let id = ResourceId::new(
        target_ref.namespace.as_deref().unwrap_or(policy_ns),
        &target_ref.name,
    );
    let not_found = || TargetError::NotFound {
        kind: target_ref.kind.clone(),
        id: id.clone(),
    };
    match (target_ref.group.as_str(), target_ref.kind.as_str()) {
        (GATEWAY_API_GROUP, "Gateway") => gateways
            .get(&id)
            .map(|&gi| Target::Gateway(gi))
            .ok_or_else(not_found),
        (GATEWAY_API_GROUP, "HTTPRoute") => routes
            .get(&id)
            .map(|&ri| Target::Route(ri))
            .ok_or_else(not_found),
        (group, kind) => Err(TargetError::UnsupportedKind {
            group: group.to_string(),
            kind: kind.to_string(),
        }),
    }
}

// === impl GatewayNode ===

impl<'t> GatewayNode<'t> {
    pub fn gateway(&self) -> &'t Gateway {
        &self.topology.gateways[self.idx]
    }

    pub fn id(&self) -> &'t ResourceId {
        &self.gateway().id
    }

    /// The routes parented by this gateway, ordered by identity.
    pub fn routes(&self) -> impl Iterator<Item = RouteNode<'t>> + 't {
        let topology = self.topology;
        let mut routes = topology.gateway_routes[self.idx].clone();
        routes.sort_unstable();
        routes
            .into_iter()
            .map(move |idx| RouteNode { topology, idx })
    }

    /// The policies targeting this gateway directly, oldest first.
    pub fn policies(&self, kind: PolicyKind) -> impl Iterator<Item = PolicyNode<'t>> + 't {
        let topology = self.topology;
        topology.gateway_policies[self.idx]
            .iter()
            .copied()
            .filter(move |&idx| topology.policies[idx].kind() == kind)
            .map(move |idx| PolicyNode { topology, idx })
    }
}

impl PartialEq for GatewayNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.topology, other.topology) && self.idx == other.idx
    }
}

// === impl RouteNode ===

impl<'t> RouteNode<'t> {
    pub fn route(&self) -> &'t HttpRoute {
        &self.topology.routes[self.idx]
    }

    pub fn id(&self) -> &'t ResourceId {
        &self.route().id
    }

    /// The gateways this route attaches to, in parent reference order.
    pub fn parents(&self) -> impl Iterator<Item = GatewayNode<'t>> + 't {
        let topology = self.topology;
        topology.route_parents[self.idx]
            .iter()
            .map(move |&idx| GatewayNode { topology, idx })
    }

    /// The policies targeting this route directly, oldest first.
    pub fn policies(&self, kind: PolicyKind) -> impl Iterator<Item = PolicyNode<'t>> + 't {
        let topology = self.topology;
        topology.route_policies[self.idx]
            .iter()
            .copied()
            .filter(move |&idx| topology.policies[idx].kind() == kind)
            .map(move |idx| PolicyNode { topology, idx })
    }

    pub fn has_policy(&self, kind: PolicyKind) -> bool {
        self.policies(kind).next().is_some()
    }
}

impl PartialEq for RouteNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.topology, other.topology) && self.idx == other.idx
    }
}

// === impl PolicyNode ===

impl<'t> PolicyNode<'t> {
    pub fn policy(&self) -> &'t Policy {
        &self.topology.policies[self.idx]
    }

    pub fn policy_ref(&self) -> PolicyRef {
        self.policy().policy_ref()
    }

    pub fn target(&self) -> Result<Targetable<'t>, &'t TargetError> {
        let topology = self.topology;
        match &topology.policy_targets[self.idx] {
            Ok(Target::Gateway(idx)) => Ok(Targetable::Gateway(GatewayNode {
                topology,
                idx: *idx,
            })),
            Ok(Target::Route(idx)) => Ok(Targetable::Route(RouteNode {
                topology,
                idx: *idx,
            })),
            Err(error) => Err(error),
        }
    }

    /// The gateways this policy should be referenced by: its target gateway,
    /// or every parent of its target route.
    pub fn gateways(&self) -> Vec<GatewayNode<'t>> {
        match self.target() {
            Ok(Targetable::Gateway(gw)) => vec![gw],
            Ok(Targetable::Route(route)) => route.parents().collect(),
            Err(_) => vec![],
        }
    }
}

impl PartialEq for PolicyNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.topology, other.topology) && self.idx == other.idx
    }
}
