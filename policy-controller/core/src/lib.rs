#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The policy attachment core.
//!
//! Everything in this crate is a pure, in-memory transform: a consistent
//! listing of gateways, routes and policies goes in, and a [`Topology`] plus
//! everything derived from it (gateway reference diffs, effective policies,
//! compiled route-match predicates and merged rate limits) comes out. Nothing
//! is cached between invocations.

pub mod diff;
pub mod gateway;
pub mod http_route;
pub mod policy;
pub mod predicate;
pub mod ratelimit;
pub mod report;
pub mod resolve;
mod resource_id;
pub mod route_selector;
pub mod topology;

pub use self::{
    diff::GatewayDiff,
    gateway::{Gateway, Listener},
    http_route::{HttpRoute, HttpRouteMatch, HttpRouteRule, ParentRef},
    policy::{Attachment, Layered, Policy, PolicyKind, PolicyRef, TargetRef},
    report::{Diagnostic, Report},
    resolve::Resolver,
    resource_id::ResourceId,
    topology::Topology,
};

pub const POLICY_CONTROLLER_NAME: &str = "kuadrant.io/policy-controller";

/// The API group of the Gateway API resources policies may attach to.
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";
