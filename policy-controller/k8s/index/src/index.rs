use crate::{
    desired::{self, Context, DesiredState},
    gateway, http_route,
    metrics::ReconcileMetrics,
    policy, ClusterInfo, ObjectKey, Observed, Op, Update,
};
use ahash::AHashMap as HashMap;
use anyhow::Result;
use kuadrant_policy_controller_core::{
    Gateway, HttpRoute, Policy, PolicyKind, PolicyRef, ResourceId, Topology,
};
use kuadrant_policy_controller_k8s_api::{
    self as k8s, gateway as api, OwnerReference, Resource, ResourceExt,
};
use parking_lot::RwLock;
use std::{hash::Hash, sync::Arc};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time,
};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds the cluster's gateways, routes, and policies, and emits the writes
/// needed to keep the downstream objects in line with them.
///
/// Every change to an indexed resource recomputes the complete desired state.
/// Only operations that differ from the last ones sent are emitted.
#[derive(Debug)]
pub struct Index {
    cluster: ClusterInfo,
    updates: mpsc::Sender<Update>,
    metrics: ReconcileMetrics,

    gateways: HashMap<ResourceId, Gateway>,
    routes: HashMap<ResourceId, HttpRoute>,
    policies: HashMap<PolicyRef, Policy>,

    /// Controller owner references of the objects downstream objects are
    /// owned by.
    owners: HashMap<ObjectKey, OwnerReference>,
    observed: HashMap<PolicyRef, Observed>,

    /// The last operation sent for each object.
    emitted: HashMap<ObjectKey, Op>,
}

// === impl Index ===

impl Index {
    pub fn shared(
        cluster: ClusterInfo,
        updates: mpsc::Sender<Update>,
        metrics: ReconcileMetrics,
    ) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            cluster,
            updates,
            metrics,
            gateways: HashMap::default(),
            routes: HashMap::default(),
            policies: HashMap::default(),
            owners: HashMap::default(),
            observed: HashMap::default(),
            emitted: HashMap::default(),
        }))
    }

    /// Sends every desired operation again, regardless of what was sent
    /// before.
    ///
    /// Writes that failed downstream are not reported back to the index, so
    /// this is how they are eventually retried.
    pub fn resync(&mut self) {
        let desired = self.desired();
        self.emitted.retain(|key, _| !desired.contains(key));
        self.emit(desired);
    }

    fn reindex(&mut self) {
        let desired = self.desired();
        self.emit(desired);
    }

    fn desired(&self) -> DesiredState {
        self.metrics.reconciled();
        let topology = Topology::build(
            self.gateways.values().cloned(),
            self.routes.values().cloned(),
            self.policies.values().cloned(),
        );
        desired::state(
            &topology,
            &Context {
                cluster: &self.cluster,
                owners: &self.owners,
                observed: &self.observed,
            },
        )
    }

    fn emit(&mut self, desired: DesiredState) {
        let stale = self
            .emitted
            .keys()
            .filter(|key| !desired.contains(key))
            .cloned()
            .collect::<Vec<_>>();
        for key in stale {
            let Some(op) = self.emitted.remove(&key) else {
                continue;
            };
            // Patches to objects the controller does not own are simply
            // no longer refreshed.
            if key.kind.is_owned() && !self.send(key.clone(), Op::Delete) {
                self.emitted.insert(key, op);
            }
        }

        for (key, op) in desired {
            if let Some(prev) = self.emitted.get(&key) {
                if prev.is_equivalent(&op) {
                    continue;
                }
            }
            if self.send(key.clone(), op.clone()) {
                self.emitted.insert(key, op);
            }
        }
    }

    fn send(&self, key: ObjectKey, op: Op) -> bool {
        let kind = key.kind;
        match self.updates.try_send(Update { key, op }) {
            Ok(()) => {
                self.metrics.sent(kind);
                true
            }
            Err(TrySendError::Full(Update { key, .. })) => {
                tracing::warn!(%key, "Update queue is full; deferring");
                false
            }
            Err(TrySendError::Closed(Update { key, .. })) => {
                tracing::debug!(%key, "Update queue is closed");
                false
            }
        }
    }

    fn apply_policy(
        &mut self,
        policy_ref: PolicyRef,
        owner: Option<OwnerReference>,
        observed: Observed,
        policy: Result<Policy>,
    ) {
        let mut changed = false;
        if let Some(key) = ObjectKey::policy(&policy_ref) {
            changed |= update_owner(&mut self.owners, key, owner);
            changed |= update(&mut self.observed, policy_ref.clone(), observed);
        }
        match policy {
            Ok(policy) => changed |= update(&mut self.policies, policy_ref, policy),
            Err(error) => {
                tracing::info!(policy = %policy_ref, %error, "Ignoring policy");
                changed |= self.policies.remove(&policy_ref).is_some();
            }
        }
        if changed {
            self.reindex();
        }
    }

    fn delete_policy(&mut self, policy_ref: PolicyRef) {
        if let Some(key) = ObjectKey::policy(&policy_ref) {
            self.owners.remove(&key);
        }
        self.observed.remove(&policy_ref);
        if self.policies.remove(&policy_ref).is_some() {
            self.reindex();
        }
    }
}

impl kubert::index::IndexNamespacedResource<api::Gateway> for Index {
    fn apply(&mut self, gw: api::Gateway) {
        let owner = gw.controller_owner_ref(&());
        let gw = gateway::gateway(gw);
        let changed = update_owner(&mut self.owners, ObjectKey::gateway(&gw.id), owner)
            | update(&mut self.gateways, gw.id.clone(), gw);
        if changed {
            self.reindex();
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceId::new(namespace, name);
        self.owners.remove(&ObjectKey::gateway(&id));
        if self.gateways.remove(&id).is_some() {
            self.reindex();
        }
    }
}

impl kubert::index::IndexNamespacedResource<api::HttpRoute> for Index {
    fn apply(&mut self, route: api::HttpRoute) {
        let namespace = route.namespace().expect("HTTPRoute must have a namespace");
        let name = route.name_unchecked();
        let id = ResourceId::new(namespace.clone(), name.clone());
        let changed = match http_route::http_route(route) {
            Ok(route) => update(&mut self.routes, id, route),
            Err(error) => {
                tracing::info!(%namespace, %name, %error, "Ignoring HTTPRoute");
                self.routes.remove(&id).is_some()
            }
        };
        if changed {
            self.reindex();
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        if self.routes.remove(&ResourceId::new(namespace, name)).is_some() {
            self.reindex();
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::policy::AuthPolicy> for Index {
    fn apply(&mut self, ap: k8s::policy::AuthPolicy) {
        let policy_ref = PolicyRef::new(PolicyKind::Auth, policy::id(&ap));
        let owner = ap.controller_owner_ref(&());
        let observed = Observed {
            generation: ap.metadata.generation,
            status: ap.status.clone(),
        };
        self.apply_policy(policy_ref, owner, observed, policy::auth_policy(ap));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceId::new(namespace, name);
        self.delete_policy(PolicyRef::new(PolicyKind::Auth, id));
    }
}

impl kubert::index::IndexNamespacedResource<k8s::policy::RateLimitPolicy> for Index {
    fn apply(&mut self, rlp: k8s::policy::RateLimitPolicy) {
        let policy_ref = PolicyRef::new(PolicyKind::RateLimit, policy::id(&rlp));
        let owner = rlp.controller_owner_ref(&());
        let observed = Observed {
            generation: rlp.metadata.generation,
            status: rlp.status.clone(),
        };
        self.apply_policy(policy_ref, owner, observed, policy::rate_limit_policy(rlp));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceId::new(namespace, name);
        self.delete_policy(PolicyRef::new(PolicyKind::RateLimit, id));
    }
}

impl kubert::index::IndexNamespacedResource<k8s::policy::DnsPolicy> for Index {
    fn apply(&mut self, dp: k8s::policy::DnsPolicy) {
        let policy_ref = PolicyRef::new(PolicyKind::Dns, policy::id(&dp));
        let policy = policy::dns_policy(dp);
        self.apply_policy(policy_ref, None, Observed::default(), Ok(policy));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceId::new(namespace, name);
        self.delete_policy(PolicyRef::new(PolicyKind::Dns, id));
    }
}

impl kubert::index::IndexNamespacedResource<k8s::policy::TlsPolicy> for Index {
    fn apply(&mut self, tp: k8s::policy::TlsPolicy) {
        let policy_ref = PolicyRef::new(PolicyKind::Tls, policy::id(&tp));
        let policy = policy::tls_policy(tp);
        self.apply_policy(policy_ref, None, Observed::default(), Ok(policy));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceId::new(namespace, name);
        self.delete_policy(PolicyRef::new(PolicyKind::Tls, id));
    }
}

/// Periodically resends the complete desired state.
pub async fn resync(index: SharedIndex, period: time::Duration) {
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        tracing::debug!("Resyncing");
        index.write().resync();
    }
}

/// Stores `value`, returning true if it differs from the previous value.
fn update<K: Eq + Hash, V: PartialEq>(map: &mut HashMap<K, V>, key: K, value: V) -> bool {
    match map.get(&key) {
        Some(prev) if *prev == value => false,
        _ => {
            map.insert(key, value);
            true
        }
    }
}

fn update_owner(
    owners: &mut HashMap<ObjectKey, OwnerReference>,
    key: ObjectKey,
    owner: Option<OwnerReference>,
) -> bool {
    match owner {
        Some(owner) => update(owners, key, owner),
        None => owners.remove(&key).is_some(),
    }
}
