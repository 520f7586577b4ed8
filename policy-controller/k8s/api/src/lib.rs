#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authorino;
pub mod istio;
pub mod limitador;
pub mod policy;

pub use k8s_gateway_api as gateway;
pub use k8s_openapi::{
    api::core::v1::Namespace,
    apimachinery::pkg::apis::meta::v1::{Condition, OwnerReference, Time},
    NamespaceResourceScope,
};
pub use kube::{
    api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams, Resource, ResourceExt},
    Client, Error,
};

/// Lists the AuthPolicies a Gateway is configured for, as a JSON array of
/// `namespace/name` keys.
pub const AUTH_POLICIES_ANNOTATION: &str = "kuadrant.io/authpolicies";

/// Lists the RateLimitPolicies a Gateway is configured for, as a JSON array of
/// `namespace/name` keys.
pub const RATE_LIMIT_POLICIES_ANNOTATION: &str = "kuadrant.io/ratelimitpolicies";

/// Set on every object the controller writes.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "kuadrant-policy-controller";
