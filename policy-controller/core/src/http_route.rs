use crate::{ResourceId, GATEWAY_API_GROUP};
use anyhow::Result;
use chrono::{offset::Utc, DateTime};
pub use http::{header::HeaderName, Method};
use regex::Regex;

/// The hostname token that matches every request.
pub const CATCH_ALL_HOSTNAME: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRoute {
    pub id: ResourceId,
    pub parent_refs: Vec<ParentRef>,
    pub hostnames: Vec<String>,
    pub rules: Vec<HttpRouteRule>,

    /// This is required for ordering routes and policies by their creation
    /// timestamp.
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// A rule with no matches is an implicit catch-all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpRouteRule {
    pub matches: Vec<HttpRouteMatch>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpRouteMatch {
    pub path: Option<PathMatch>,
    pub headers: Vec<HeaderMatch>,
    pub query_params: Vec<QueryParamMatch>,
    pub method: Option<Method>,
}

#[derive(Clone, Debug)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

#[derive(Clone, Debug)]
pub enum HeaderMatch {
    Exact(HeaderName, String),
    Regex(HeaderName, Regex),
}

#[derive(Clone, Debug)]
pub enum QueryParamMatch {
    Exact(String, String),
    Regex(String, Regex),
}

/// A route's reference to the gateway it attaches to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParentRef {
    pub group: Option<String>,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: String,
}

// === impl HttpRoute ===

impl HttpRoute {
    /// The hostnames this route matches. A route without hostnames matches
    /// any host.
    pub fn hostnames(&self) -> Vec<String> {
        if self.hostnames.is_empty() {
            return vec![CATCH_ALL_HOSTNAME.to_string()];
        }
        self.hostnames.clone()
    }
}

// === impl ParentRef ===

impl ParentRef {
    /// Returns the gateway this reference names, if it names a gateway at all.
    /// The namespace defaults to the route's own.
    pub fn gateway_id(&self, route_ns: &str) -> Option<ResourceId> {
        let group = self.group.as_deref().unwrap_or(GATEWAY_API_GROUP);
        let kind = self.kind.as_deref().unwrap_or("Gateway");
        if group != GATEWAY_API_GROUP || kind != "Gateway" {
            return None;
        }
        let ns = self.namespace.as_deref().unwrap_or(route_ns);
        Some(ResourceId::new(ns, &self.name))
    }
}

// === impl PathMatch ===

impl PartialEq for PathMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(l0), Self::Exact(r0)) => l0 == r0,
            (Self::Prefix(l0), Self::Prefix(r0)) => l0 == r0,
            (Self::Regex(l0), Self::Regex(r0)) => l0.as_str() == r0.as_str(),
            _ => false,
        }
    }
}

impl Eq for PathMatch {}

impl PathMatch {
    pub fn regex(s: &str) -> Result<Self> {
        Ok(Self::Regex(Regex::new(s)?))
    }
}

// === impl HeaderMatch ===

impl PartialEq for HeaderMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(n0, v0), Self::Exact(n1, v1)) => n0 == n1 && v0 == v1,
            (Self::Regex(n0, r0), Self::Regex(n1, r1)) => n0 == n1 && r0.as_str() == r1.as_str(),
            _ => false,
        }
    }
}

impl Eq for HeaderMatch {}

impl HeaderMatch {
    pub fn name(&self) -> &HeaderName {
        match self {
            Self::Exact(name, _) | Self::Regex(name, _) => name,
        }
    }
}

// === impl QueryParamMatch ===

impl PartialEq for QueryParamMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(n0, v0), Self::Exact(n1, v1)) => n0 == n1 && v0 == v1,
            (Self::Regex(n0, r0), Self::Regex(n1, r1)) => n0 == n1 && r0.as_str() == r1.as_str(),
            _ => false,
        }
    }
}

impl Eq for QueryParamMatch {}
