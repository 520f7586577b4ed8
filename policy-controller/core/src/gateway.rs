use crate::{http_route::CATCH_ALL_HOSTNAME, PolicyKind, ResourceId};
use chrono::{offset::Utc, DateTime};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Gateway {
    pub id: ResourceId,
    pub listeners: Vec<Listener>,
    pub addresses: Vec<String>,

    /// The policies this gateway was last configured for, by kind. Read from
    /// the back-reference annotations maintained on the gateway object.
    pub policy_refs: BTreeMap<PolicyKind, BTreeSet<ResourceId>>,

    pub creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listener {
    pub name: String,
    pub hostname: Option<String>,
    pub protocol: String,
    pub port: u16,
}

impl Gateway {
    /// The distinct listener hostnames, in listener order. A gateway with no
    /// listener hostnames accepts any host.
    pub fn hostnames(&self) -> Vec<String> {
        let mut hostnames = Vec::<String>::new();
        for hostname in self.listeners.iter().filter_map(|l| l.hostname.as_ref()) {
            if !hostnames.contains(hostname) {
                hostnames.push(hostname.clone());
            }
        }
        if hostnames.is_empty() {
            hostnames.push(CATCH_ALL_HOSTNAME.to_string());
        }
        hostnames
    }

    /// Indicates whether this gateway's back-references include the given
    /// policy.
    pub fn references(&self, kind: PolicyKind, policy: &ResourceId) -> bool {
        self.policy_refs
            .get(&kind)
            .map(|refs| refs.contains(policy))
            .unwrap_or(false)
    }
}
