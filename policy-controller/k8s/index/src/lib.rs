//! Kuadrant Policy Controller Index
//!
//! Watches Gateways, HTTPRoutes and the Kuadrant policies attached to them,
//! and derives the objects that enforce those policies:
//!
//! - An `AuthConfig` per AuthPolicy, consumed by Authorino.
//! - An `AuthorizationPolicy` per gateway and AuthPolicy, routing requests
//!   through the external authorization provider.
//! - A `WasmPlugin` per gateway, carrying the rate-limit rules of every
//!   RateLimitPolicy in effect on it.
//! - The limits of the `Limitador` instance.
//! - Back-reference annotations on gateways and the status of each policy.
//!
//! ```text
//! [ Gateway ] <- [ HTTPRoute ] <- [ AuthPolicy | RateLimitPolicy ]
//!      ^                                       |
//!      +---------------------------------------+
//! ```
//!
//! The index holds no derived state: each change rebuilds the topology and
//! the complete desired state. Updates are published to a bounded queue
//! drained by the status controller.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cluster_info;
mod desired;
pub mod gateway;
pub mod http_route;
mod index;
pub mod metrics;
pub mod policy;


pub use self::{
    cluster_info::ClusterInfo,
    desired::{make_patch, ObjectKey, ObjectKind, Observed, Op, Update},
    index::{resync, Index, SharedIndex},
    metrics::{IndexMetrics, ReconcileMetrics},
};
use chrono::{DateTime, Utc};
use kuadrant_policy_controller_k8s_api::{ObjectMeta, Time};

pub(crate) fn creation_timestamp(meta: &ObjectMeta) -> Option<DateTime<Utc>> {
    meta.creation_timestamp.as_ref().map(|Time(t)| *t)
}
