//! Policy kinds and the capability traits the rest of the core is written
//! against.
//!
//! Topology, diff and resolution code only ever sees [`Attachment`] (and
//! [`Layered`] for kinds supporting gateway/route layering); the concrete
//! kinds are only inspected by the downstream builders.

use crate::{
    predicate::Pattern, route_selector::RouteSelector, ResourceId, GATEWAY_API_GROUP,
};
use chrono::{offset::Utc, DateTime};
use std::{collections::BTreeMap, fmt};

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum PolicyKind {
    Auth,
    RateLimit,
    Dns,
    Tls,
}

/// Locates a policy: its kind plus its namespaced name.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct PolicyRef {
    pub kind: PolicyKind,
    pub id: ResourceId,
}

/// A policy's reference to the single Gateway or HTTPRoute it attaches to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetRef {
    pub group: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyMeta {
    pub id: ResourceId,
    pub target_ref: TargetRef,
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// Uniform view of any policy-like object.
pub trait Attachment {
    fn kind(&self) -> PolicyKind;

    fn meta(&self) -> &PolicyMeta;

    /// Indicates the policy fully replaces lower-level policies of the same
    /// kind rather than filling gaps.
    fn is_atomic_override(&self) -> bool {
        false
    }

    fn id(&self) -> &ResourceId {
        &self.meta().id
    }

    fn target_ref(&self) -> &TargetRef {
        &self.meta().target_ref
    }

    fn policy_ref(&self) -> PolicyRef {
        PolicyRef {
            kind: self.kind(),
            id: self.id().clone(),
        }
    }

    /// Orders policies oldest first, breaking ties by `namespace/name`.
    /// Policies without a creation timestamp sort as the newest.
    fn precedence(&self) -> (DateTime<Utc>, &ResourceId) {
        let ts = self
            .meta()
            .creation_timestamp
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (ts, self.id())
    }
}

/// Kinds that distinguish defaults from overrides.
pub trait Layered: Attachment {
    type Spec;

    /// The section of the policy that is in effect.
    fn common_spec(&self) -> Self::Spec;
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuthPolicy {
    pub meta: PolicyMeta,
    pub defaults: Option<AuthScheme>,
    pub overrides: Option<AuthScheme>,
    pub scheme: AuthScheme,
}

/// The authentication/authorization scheme of an auth policy. Everything but
/// the selectors and `when` patterns is passed through to the authorization
/// engine untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuthScheme {
    pub route_selectors: Vec<RouteSelector>,
    pub when: Vec<Pattern>,
    pub authentication: BTreeMap<String, serde_json::Value>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub authorization: BTreeMap<String, serde_json::Value>,
    pub response: Option<serde_json::Value>,
    pub callbacks: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitPolicy {
    pub meta: PolicyMeta,
    pub defaults: Option<Limits>,
    pub overrides: Option<Limits>,
    pub limits: Limits,
}

pub type Limits = BTreeMap<String, Limit>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Limit {
    pub route_selectors: Vec<RouteSelector>,
    pub when: Vec<Pattern>,
    pub counters: Vec<String>,
    pub rates: Vec<Rate>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rate {
    pub limit: u64,
    pub duration: u64,
    pub unit: TimeUnit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsPolicy {
    pub meta: PolicyMeta,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsPolicy {
    pub meta: PolicyMeta,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Policy {
    Auth(AuthPolicy),
    RateLimit(RateLimitPolicy),
    Dns(DnsPolicy),
    Tls(TlsPolicy),
}

// === impl PolicyKind ===

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "AuthPolicy",
            Self::RateLimit => "RateLimitPolicy",
            Self::Dns => "DNSPolicy",
            Self::Tls => "TLSPolicy",
        }
    }

    /// Auth and rate limiting may be set at both gateway and route level.
    pub fn supports_layering(&self) -> bool {
        matches!(self, Self::Auth | Self::RateLimit)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl PolicyRef ===

impl PolicyRef {
    pub fn new(kind: PolicyKind, id: ResourceId) -> Self {
        Self { kind, id }
    }
}

/// Formats as `namespace/name/Kind`.
impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.kind)
    }
}

// === impl TargetRef ===

impl TargetRef {
    pub fn gateway(name: impl ToString) -> Self {
        Self {
            group: GATEWAY_API_GROUP.to_string(),
            kind: "Gateway".to_string(),
            name: name.to_string(),
            namespace: None,
        }
    }

    pub fn http_route(name: impl ToString) -> Self {
        Self {
            group: GATEWAY_API_GROUP.to_string(),
            kind: "HTTPRoute".to_string(),
            name: name.to_string(),
            namespace: None,
        }
    }
}

// === impl AuthPolicy ===

impl Attachment for AuthPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Auth
    }

    fn meta(&self) -> &PolicyMeta {
        &self.meta
    }

    fn is_atomic_override(&self) -> bool {
        self.overrides.is_some()
    }
}

impl Layered for AuthPolicy {
    type Spec = AuthScheme;

    fn common_spec(&self) -> AuthScheme {
        self.overrides
            .as_ref()
            .or(self.defaults.as_ref())
            .unwrap_or(&self.scheme)
            .clone()
    }
}

// === impl RateLimitPolicy ===

impl Attachment for RateLimitPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::RateLimit
    }

    fn meta(&self) -> &PolicyMeta {
        &self.meta
    }

    fn is_atomic_override(&self) -> bool {
        self.overrides.is_some()
    }
}

impl Layered for RateLimitPolicy {
    type Spec = Limits;

    /// Overrides are atomic. Otherwise explicit limits are merged over the
    /// defaults, an explicit limit replacing a default of the same name.
    fn common_spec(&self) -> Limits {
        if let Some(overrides) = self.overrides.as_ref() {
            return overrides.clone();
        }
        let mut limits = self.defaults.clone().unwrap_or_default();
        limits.extend(self.limits.clone());
        limits
    }
}

// === impl TimeUnit ===

impl TimeUnit {
    pub fn seconds(&self) -> u64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 60 * 60,
            Self::Day => 24 * 60 * 60,
        }
    }
}

impl Rate {
    /// The length of the rate's window, or `None` if it does not fit in a
    /// `u64`.
    pub fn checked_seconds(&self) -> Option<u64> {
        self.duration.checked_mul(self.unit.seconds())
    }

    /// The length of the rate's window, saturating at `u64::MAX`.
    pub fn seconds(&self) -> u64 {
        self.checked_seconds().unwrap_or(u64::MAX)
    }
}

// === impl DnsPolicy/TlsPolicy ===

impl Attachment for DnsPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Dns
    }

    fn meta(&self) -> &PolicyMeta {
        &self.meta
    }
}

impl Attachment for TlsPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Tls
    }

    fn meta(&self) -> &PolicyMeta {
        &self.meta
    }
}

// === impl Policy ===

impl Policy {
    fn inner(&self) -> &dyn Attachment {
        match self {
            Self::Auth(p) => p,
            Self::RateLimit(p) => p,
            Self::Dns(p) => p,
            Self::Tls(p) => p,
        }
    }

    pub fn as_auth(&self) -> Option<&AuthPolicy> {
        match self {
            Self::Auth(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_rate_limit(&self) -> Option<&RateLimitPolicy> {
        match self {
            Self::RateLimit(p) => Some(p),
            _ => None,
        }
    }
}

impl Attachment for Policy {
    fn kind(&self) -> PolicyKind {
        self.inner().kind()
    }

    fn meta(&self) -> &PolicyMeta {
        self.inner().meta()
    }

    fn is_atomic_override(&self) -> bool {
        self.inner().is_atomic_override()
    }
}

impl From<AuthPolicy> for Policy {
    fn from(p: AuthPolicy) -> Self {
        Self::Auth(p)
    }
}

impl From<RateLimitPolicy> for Policy {
    fn from(p: RateLimitPolicy) -> Self {
        Self::RateLimit(p)
    }
}

impl From<DnsPolicy> for Policy {
    fn from(p: DnsPolicy) -> Self {
        Self::Dns(p)
    }
}

impl From<TlsPolicy> for Policy {
    fn from(p: TlsPolicy) -> Self {
        Self::Tls(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn meta(name: &str) -> PolicyMeta {
        PolicyMeta {
            id: ResourceId::new("ns-0", name),
            target_ref: TargetRef::gateway("gw"),
            creation_timestamp: None,
        }
    }

    fn limit(rps: u64) -> Limit {
        Limit {
            rates: vec![Rate {
                limit: rps,
                duration: 1,
                unit: TimeUnit::Second,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn rate_windows_saturate() {
        let rate = Rate {
            limit: 1,
            duration: 2,
            unit: TimeUnit::Hour,
        };
        assert_eq!(rate.checked_seconds(), Some(7200));
        assert_eq!(rate.seconds(), 7200);

        let rate = Rate {
            limit: 1,
            duration: u64::MAX / 1000,
            unit: TimeUnit::Day,
        };
        assert_eq!(rate.checked_seconds(), None);
        assert_eq!(rate.seconds(), u64::MAX);
    }

    #[test]
    fn explicit_limits_merge_over_defaults() {
        let rlp = RateLimitPolicy {
            meta: meta("rlp"),
            defaults: Some(btreemap! {
                "global".to_string() => limit(10),
                "burst".to_string() => limit(100),
            }),
            overrides: None,
            limits: btreemap! { "global".to_string() => limit(5) },
        };
        assert!(!rlp.is_atomic_override());
        assert_eq!(
            rlp.common_spec(),
            btreemap! {
                "burst".to_string() => limit(100),
                "global".to_string() => limit(5),
            }
        );
    }

    #[test]
    fn overrides_are_atomic() {
        let rlp = RateLimitPolicy {
            meta: meta("rlp"),
            defaults: Some(btreemap! { "burst".to_string() => limit(100) }),
            overrides: Some(btreemap! { "global".to_string() => limit(1) }),
            limits: btreemap! { "global".to_string() => limit(5) },
        };
        assert!(rlp.is_atomic_override());
        assert!(Policy::from(rlp.clone()).is_atomic_override());
        assert_eq!(
            rlp.common_spec(),
            btreemap! { "global".to_string() => limit(1) }
        );
    }

    #[test]
    fn auth_scheme_precedence() {
        let scheme = |name: &str| AuthScheme {
            authentication: btreemap! { name.to_string() => serde_json::json!({}) },
            ..Default::default()
        };
        let mut ap = AuthPolicy {
            meta: meta("ap"),
            defaults: None,
            overrides: None,
            scheme: scheme("bare"),
        };
        assert_eq!(ap.common_spec(), scheme("bare"));
        ap.defaults = Some(scheme("defaults"));
        assert_eq!(ap.common_spec(), scheme("defaults"));
        ap.overrides = Some(scheme("overrides"));
        assert_eq!(ap.common_spec(), scheme("overrides"));
    }

    #[test]
    fn policy_ref_formats_as_locator() {
        let r = PolicyRef::new(PolicyKind::RateLimit, ResourceId::new("ns-0", "rlp"));
        assert_eq!(r.to_string(), "ns-0/rlp/RateLimitPolicy");
    }

    #[test]
    fn rate_window() {
        let rate = Rate {
            limit: 3,
            duration: 2,
            unit: TimeUnit::Minute,
        };
        assert_eq!(rate.seconds(), 120);
    }
}
