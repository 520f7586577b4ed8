//! Derives every write a topology calls for.
//!
//! The desired state is a map from the objects the controller manages to the
//! operation that brings each of them in line with the topology. It is
//! recomputed from scratch on every change; the index compares it with what
//! it last emitted to decide which updates to send.

mod annotations;
mod auth_config;
mod authorization_policy;
mod limitador;
mod status;
mod wasm_plugin;


pub use self::status::make_patch;
use crate::ClusterInfo;
use ahash::AHashMap as HashMap;
use kuadrant_policy_controller_core::{
    ratelimit::RateLimitIndex, report::Report, resolve, PolicyKind, PolicyRef, Resolver,
    ResourceId, Topology,
};
use kuadrant_policy_controller_k8s_api::{
    policy::PolicyStatus, ObjectMeta, OwnerReference, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
};
use serde::Serialize;
use std::{collections::BTreeMap, fmt};

/// The kinds of objects the controller writes to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    AuthConfig,
    AuthorizationPolicy,
    WasmPlugin,
    Limitador,
    Gateway,
    AuthPolicy,
    RateLimitPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub id: ResourceId,
}

/// A single write.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Server-side apply of a complete object.
    Apply(serde_json::Value),
    /// JSON merge patch of an object.
    Merge(serde_json::Value),
    /// JSON merge patch of an object's status subresource.
    MergeStatus(serde_json::Value),
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub key: ObjectKey,
    pub op: Op,
}

/// A policy's status and generation as last observed on the cluster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observed {
    pub generation: Option<i64>,
    pub status: Option<PolicyStatus>,
}

/// Cluster state the builders need besides the topology.
pub(crate) struct Context<'a> {
    pub cluster: &'a ClusterInfo,
    pub owners: &'a HashMap<ObjectKey, OwnerReference>,
    pub observed: &'a HashMap<PolicyRef, Observed>,
}

#[derive(Debug, Default)]
pub(crate) struct DesiredState {
    ops: BTreeMap<ObjectKey, Op>,
}

/// Computes the desired state of every managed object.
pub(crate) fn state(topology: &Topology, ctx: &Context<'_>) -> DesiredState {
    let mut report = Report::default();
    resolve::report_targets(topology, &mut report);
    let auth = Resolver::new(topology, PolicyKind::Auth, &mut report);
    let limits = RateLimitIndex::build(topology, &mut report);

    let mut desired = DesiredState::default();
    auth_config::build(topology, &auth, ctx, &mut desired);
    authorization_policy::build(topology, &auth, ctx, &mut desired);
    wasm_plugin::build(topology, &limits, ctx, &mut desired);
    limitador::build(&limits, ctx, &mut desired);
    annotations::build(topology, &mut desired);
    status::build(topology, &report, ctx, &mut desired);
    desired
}

// === impl ObjectKind ===

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthConfig => "AuthConfig",
            Self::AuthorizationPolicy => "AuthorizationPolicy",
            Self::WasmPlugin => "WasmPlugin",
            Self::Limitador => "Limitador",
            Self::Gateway => "Gateway",
            Self::AuthPolicy => "AuthPolicy",
            Self::RateLimitPolicy => "RateLimitPolicy",
        }
    }

    /// Indicates the controller creates objects of this kind, and deletes
    /// them once they are no longer desired.
    pub fn is_owned(&self) -> bool {
        matches!(
            self,
            Self::AuthConfig | Self::AuthorizationPolicy | Self::WasmPlugin
        )
    }

    /// The kind of the policy objects whose status the controller writes.
    pub(crate) fn policy(kind: PolicyKind) -> Option<Self> {
        match kind {
            PolicyKind::Auth => Some(Self::AuthPolicy),
            PolicyKind::RateLimit => Some(Self::RateLimitPolicy),
            PolicyKind::Dns | PolicyKind::Tls => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ObjectKey ===

impl ObjectKey {
    pub fn new(kind: ObjectKind, id: ResourceId) -> Self {
        Self { kind, id }
    }

    pub(crate) fn gateway(id: &ResourceId) -> Self {
        Self::new(ObjectKind::Gateway, id.clone())
    }

    pub(crate) fn policy(policy: &PolicyRef) -> Option<Self> {
        ObjectKind::policy(policy.kind).map(|kind| Self::new(kind, policy.id.clone()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

// === impl Op ===

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply(_) => "apply",
            Self::Merge(_) => "merge",
            Self::MergeStatus(_) => "merge_status",
            Self::Delete => "delete",
        }
    }

    /// Compares two operations, disregarding condition transition times.
    pub(crate) fn is_equivalent(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::MergeStatus(a), Self::MergeStatus(b)) => {
                without_transition_times(a) == without_transition_times(b)
            }
            (a, b) => a == b,
        }
    }
}

fn without_transition_times(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(fields) => fields
            .iter()
            .filter(|(k, _)| *k != "lastTransitionTime")
            .map(|(k, v)| (k.clone(), without_transition_times(v)))
            .collect(),
        serde_json::Value::Array(items) => items.iter().map(without_transition_times).collect(),
        v => v.clone(),
    }
}

// === impl DesiredState ===

impl DesiredState {
    fn apply<T: Serialize>(&mut self, key: ObjectKey, object: &T) {
        match serde_json::to_value(object) {
            Ok(value) => {
                self.ops.insert(key, Op::Apply(value));
            }
            Err(error) => tracing::error!(%key, %error, "Failed to serialize object"),
        }
    }

    fn merge(&mut self, key: ObjectKey, patch: serde_json::Value) {
        self.ops.insert(key, Op::Merge(patch));
    }

    fn merge_status(&mut self, key: ObjectKey, patch: serde_json::Value) {
        self.ops.insert(key, Op::MergeStatus(patch));
    }

    pub(crate) fn contains(&self, key: &ObjectKey) -> bool {
        self.ops.contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &ObjectKey) -> Option<&Op> {
        self.ops.get(key)
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> Vec<&ObjectKey> {
        self.ops.keys().collect()
    }
}

impl IntoIterator for DesiredState {
    type Item = (ObjectKey, Op);
    type IntoIter = std::collections::btree_map::IntoIter<ObjectKey, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Metadata for an object created by the controller.
fn object_meta(id: &ResourceId, owner: Option<&OwnerReference>) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(id.namespace.clone()),
        name: Some(id.name.clone()),
        labels: Some(
            [(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())]
                .into_iter()
                .collect(),
        ),
        owner_references: owner.map(|o| vec![o.clone()]),
        ..Default::default()
    }
}
