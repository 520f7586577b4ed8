use crate::creation_timestamp;
use kuadrant_policy_controller_core::{Gateway, Listener, PolicyKind, ResourceId};
use kuadrant_policy_controller_k8s_api::{
    gateway as api, ResourceExt, AUTH_POLICIES_ANNOTATION, RATE_LIMIT_POLICIES_ANNOTATION,
};
use std::collections::{BTreeMap, BTreeSet};

/// The back-reference annotation maintained for each policy kind that
/// produces gateway-scoped resources.
pub(crate) fn annotation(kind: PolicyKind) -> Option<&'static str> {
    match kind {
        PolicyKind::Auth => Some(AUTH_POLICIES_ANNOTATION),
        PolicyKind::RateLimit => Some(RATE_LIMIT_POLICIES_ANNOTATION),
        PolicyKind::Dns | PolicyKind::Tls => None,
    }
}

pub(crate) const ANNOTATED_KINDS: [PolicyKind; 2] = [PolicyKind::Auth, PolicyKind::RateLimit];

pub fn gateway(gw: api::Gateway) -> Gateway {
    let namespace = gw.namespace().expect("Gateway must have a namespace");
    let id = ResourceId::new(namespace, gw.name_unchecked());

    let mut policy_refs = BTreeMap::new();
    for kind in ANNOTATED_KINDS {
        let refs = annotation(kind)
            .and_then(|name| gw.annotations().get(name))
            .map(|value| parse_refs(&id, value))
            .unwrap_or_default();
        if !refs.is_empty() {
            policy_refs.insert(kind, refs);
        }
    }

    let listeners = gw
        .spec
        .listeners
        .into_iter()
        .map(|l| Listener {
            name: l.name,
            hostname: l.hostname,
            protocol: l.protocol,
            port: l.port,
        })
        .collect();

    let addresses = gw
        .status
        .and_then(|status| status.addresses)
        .into_iter()
        .flatten()
        .map(|address| address.value)
        .collect();

    Gateway {
        id,
        listeners,
        addresses,
        policy_refs,
        creation_timestamp: creation_timestamp(&gw.metadata),
    }
}

/// Parses a JSON array of `namespace/name` keys. Malformed entries are
/// dropped so the next annotation patch rewrites them.
fn parse_refs(gateway: &ResourceId, value: &str) -> BTreeSet<ResourceId> {
    let keys = match serde_json::from_str::<Vec<String>>(value) {
        Ok(keys) => keys,
        Err(error) => {
            tracing::info!(%gateway, %error, "Ignoring malformed policy annotation");
            return BTreeSet::new();
        }
    };
    keys.into_iter()
        .filter_map(|key| match key.parse() {
            Ok(id) => Some(id),
            Err(error) => {
                tracing::info!(%gateway, %error, "Ignoring malformed policy reference");
                None
            }
        })
        .collect()
}

/// Renders a back-reference annotation value.
pub(crate) fn format_refs(refs: &BTreeSet<ResourceId>) -> String {
    let keys = refs.iter().map(ToString::to_string).collect::<Vec<_>>();
    serde_json::Value::from(keys).to_string()
}
