//! Merges gateway-level and route-level rate limit policies per gateway.

use crate::{
    http_route::HttpRoute,
    policy::{Layered, Limits},
    predicate::{
        compile,
        rate_limit::{with_when, Conditions, RateLimitFilter},
    },
    report::Report,
    resolve::Resolver,
    route_selector, PolicyKind, PolicyRef, ResourceId, Topology,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The effective rate limit policies, keyed by policy and the gateway they
/// are enforced on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateLimitIndex {
    entries: BTreeMap<(PolicyRef, ResourceId), EffectiveLimits>,
}

/// A policy's merged limits together with the routes it governs under one
/// gateway.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveLimits {
    pub limits: Limits,
    pub routes: Vec<HttpRoute>,
}

/// A rate-limit filter rule: when any alternative of `conditions` matches (or
/// always, if there are none), a hit is counted with `data` as descriptors.
#[derive(Clone, Debug, PartialEq)]
pub struct LimitRule {
    pub conditions: Conditions,
    pub data: Vec<DataItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataItem {
    Static { key: String, value: String },
    Selector { selector: String },
}

/// A counter limit as configured on the rate limit service.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CounterLimit {
    pub namespace: String,
    pub max_value: u64,
    pub seconds: u64,
    pub conditions: Vec<String>,
    pub variables: Vec<String>,
}

// === impl RateLimitIndex ===

impl RateLimitIndex {
    pub fn build(topology: &Topology, report: &mut Report) -> Self {
        let resolver = Resolver::new(topology, PolicyKind::RateLimit, report);
        let mut entries = BTreeMap::<(PolicyRef, ResourceId), EffectiveLimits>::new();
        for gw in topology.gateways() {
            for route in gw.routes() {
                let Some(policy) = resolver.effective(&gw, &route) else {
                    continue;
                };
                let Some(rlp) = policy.policy().as_rate_limit() else {
                    continue;
                };
                let key = (policy.policy_ref(), gw.id().clone());
                entries
                    .entry(key)
                    .or_insert_with(|| EffectiveLimits {
                        limits: rlp.common_spec(),
                        routes: vec![],
                    })
                    .routes
                    .push(route.route().clone());
            }
        }
        Self { entries }
    }

    pub fn get(&self, policy: &PolicyRef, gateway: &ResourceId) -> Option<&EffectiveLimits> {
        self.entries.get(&(policy.clone(), gateway.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PolicyRef, &ResourceId, &EffectiveLimits)> {
        self.entries.iter().map(|((p, gw), e)| (p, gw, e))
    }

    /// The effective policies enforced on `gateway`, in policy order.
    pub fn for_gateway<'a>(
        &'a self,
        gateway: &'a ResourceId,
    ) -> impl Iterator<Item = (&'a PolicyRef, &'a EffectiveLimits)> + 'a {
        self.iter()
            .filter(move |(_, gw, _)| *gw == gateway)
            .map(|(p, _, e)| (p, e))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The counter limits of every effective policy, sorted and deduplicated.
    /// Counters are namespaced by gateway.
    pub fn counter_limits(&self) -> Vec<CounterLimit> {
        let mut counters = self
            .iter()
            .flat_map(|(policy, gw, effective)| {
                effective.limits.iter().flat_map(move |(name, limit)| {
                    let identifier = limit_identifier(&policy.id, name);
                    limit.rates.iter().map(move |rate| CounterLimit {
                        namespace: gw.to_string(),
                        max_value: rate.limit,
                        seconds: rate.seconds(),
                        conditions: vec![format!("{identifier} == \"1\"")],
                        variables: limit.counters.clone(),
                    })
                })
            })
            .collect::<Vec<_>>();
        counters.sort();
        counters.dedup();
        counters
    }
}

// === impl EffectiveLimits ===

impl EffectiveLimits {
    /// The distinct hostnames of the governed routes.
    pub fn hostnames(&self) -> Vec<String> {
        let mut hostnames = Vec::<String>::new();
        for hostname in self.routes.iter().flat_map(|r| r.hostnames()) {
            if !hostnames.contains(&hostname) {
                hostnames.push(hostname);
            }
        }
        hostnames
    }

    /// One rule per limit selecting at least one governed route rule. A
    /// limit applying to a catch-all rule is unconditional.
    pub fn rules(&self, policy: &ResourceId) -> Vec<LimitRule> {
        let mut rules = Vec::new();
        for (name, limit) in self.limits.iter() {
            let selections = self
                .routes
                .iter()
                .flat_map(|route| route_selector::select(&limit.route_selectors, route))
                .collect::<Vec<_>>();
            if selections.is_empty() {
                continue;
            }

            let mut alternatives = Conditions::new();
            let mut unconditional = false;
            for selection in selections {
                match compile(&RateLimitFilter, &selection.rule, &selection.hostnames) {
                    Some(compiled) => {
                        for alternative in compiled {
                            if !alternatives.contains(&alternative) {
                                alternatives.push(alternative);
                            }
                        }
                    }
                    None => unconditional = true,
                }
            }
            let conditions = with_when((!unconditional).then_some(alternatives), &limit.when);

            let mut data = vec![DataItem::Static {
                key: limit_identifier(policy, name),
                value: "1".to_string(),
            }];
            data.extend(limit.counters.iter().map(|c| DataItem::Selector {
                selector: c.clone(),
            }));
            rules.push(LimitRule {
                conditions: conditions.unwrap_or_default(),
                data,
            });
        }
        rules
    }
}

/// A stable identifier for a policy's limit, safe to use as a descriptor key:
/// `limit.<sanitized name>__<first 8 hex digits of the SHA-256 of
/// namespace/name/limit>`.
pub fn limit_identifier(policy: &ResourceId, limit_name: &str) -> String {
    let sanitized = limit_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>();
    let digest = Sha256::digest(format!("{policy}/{limit_name}").as_bytes());
    format!("limit.{sanitized}__{}", hex::encode(&digest[..4]))
}
