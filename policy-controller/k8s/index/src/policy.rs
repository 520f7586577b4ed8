//! Converts policy resources into their core representation.

use crate::{creation_timestamp, http_route::try_match};
use anyhow::{bail, Result};
use kuadrant_policy_controller_core::{
    policy::{self as core, PolicyMeta},
    predicate::{Operator, Pattern},
    route_selector::RouteSelector,
    Policy, ResourceId, TargetRef,
};
use kuadrant_policy_controller_k8s_api::{
    policy::{self as api, WhenCondition, WhenOperator},
    ResourceExt,
};

pub fn auth_policy(ap: api::AuthPolicy) -> Result<Policy> {
    let meta = meta(&ap, ap.spec.target_ref.clone());
    let defaults = ap.spec.defaults.map(auth_scheme).transpose()?;
    let overrides = ap.spec.overrides.map(auth_scheme).transpose()?;
    let scheme = auth_scheme(ap.spec.scheme)?;
    Ok(Policy::Auth(core::AuthPolicy {
        meta,
        defaults,
        overrides,
        scheme,
    }))
}

pub fn rate_limit_policy(rlp: api::RateLimitPolicy) -> Result<Policy> {
    let meta = meta(&rlp, rlp.spec.target_ref.clone());
    let defaults = rlp.spec.defaults.map(|d| limit_map(d.limits)).transpose()?;
    let overrides = rlp.spec.overrides.map(|o| limit_map(o.limits)).transpose()?;
    let limits = limit_map(rlp.spec.limits)?;
    Ok(Policy::RateLimit(core::RateLimitPolicy {
        meta,
        defaults,
        overrides,
        limits,
    }))
}

pub fn dns_policy(dp: api::DnsPolicy) -> Policy {
    Policy::Dns(core::DnsPolicy {
        meta: meta(&dp, dp.spec.target_ref.clone()),
    })
}

pub fn tls_policy(tp: api::TlsPolicy) -> Policy {
    Policy::Tls(core::TlsPolicy {
        meta: meta(&tp, tp.spec.target_ref.clone()),
    })
}

fn meta<P: ResourceExt>(policy: &P, target_ref: api::PolicyTargetRef) -> PolicyMeta {
    let api::PolicyTargetRef {
        group,
        kind,
        name: target_name,
        namespace: target_namespace,
    } = target_ref;
    PolicyMeta {
        id: id(policy),
        target_ref: TargetRef {
            group,
            kind,
            name: target_name,
            namespace: target_namespace,
        },
        creation_timestamp: creation_timestamp(policy.meta()),
    }
}

fn auth_scheme(
    api::AuthScheme {
        route_selectors,
        when,
        rules,
    }: api::AuthScheme,
) -> Result<core::AuthScheme> {
    let api::AuthRules {
        authentication,
        metadata,
        authorization,
        response,
        callbacks,
    } = rules;
    Ok(core::AuthScheme {
        route_selectors: route_selectors
            .into_iter()
            .map(route_selector)
            .collect::<Result<_>>()?,
        when: when.into_iter().map(pattern).collect(),
        authentication,
        metadata,
        authorization,
        response,
        callbacks,
    })
}

fn limit_map(limits: impl IntoIterator<Item = (String, api::Limit)>) -> Result<core::Limits> {
    limits
        .into_iter()
        .map(|(name, l)| Ok((name, limit(l)?)))
        .collect()
}

fn limit(
    api::Limit {
        route_selectors,
        when,
        counters,
        rates,
    }: api::Limit,
) -> Result<core::Limit> {
    Ok(core::Limit {
        route_selectors: route_selectors
            .into_iter()
            .map(route_selector)
            .collect::<Result<_>>()?,
        when: when.into_iter().map(pattern).collect(),
        counters,
        rates: rates.into_iter().map(rate).collect::<Result<_>>()?,
    })
}

fn rate(api::Rate { limit, duration, unit }: api::Rate) -> Result<core::Rate> {
    let rate = core::Rate {
        limit,
        duration,
        unit: match unit {
            api::TimeUnit::Second => core::TimeUnit::Second,
            api::TimeUnit::Minute => core::TimeUnit::Minute,
            api::TimeUnit::Hour => core::TimeUnit::Hour,
            api::TimeUnit::Day => core::TimeUnit::Day,
        },
    };
    if rate.checked_seconds().is_none() {
        bail!("rate window of {duration} x {unit:?} overflows a u64 number of seconds");
    }
    Ok(rate)
}

fn route_selector(
    api::RouteSelector { hostnames, matches }: api::RouteSelector,
) -> Result<RouteSelector> {
    Ok(RouteSelector {
        hostnames,
        matches: matches.into_iter().map(try_match).collect::<Result<_>>()?,
    })
}

fn pattern(
    WhenCondition {
        selector,
        operator,
        value,
    }: WhenCondition,
) -> Pattern {
    let operator = match operator {
        WhenOperator::Eq => Operator::Eq,
        WhenOperator::Neq => Operator::Neq,
        WhenOperator::StartsWith => Operator::StartsWith,
        WhenOperator::EndsWith => Operator::EndsWith,
        WhenOperator::Incl => Operator::Incl,
        WhenOperator::Excl => Operator::Excl,
        WhenOperator::Matches => Operator::Matches,
    };
    Pattern {
        selector,
        operator,
        value,
    }
}

pub(crate) fn id<P: ResourceExt>(policy: &P) -> ResourceId {
    let namespace = policy.namespace().expect("policy must have a namespace");
    ResourceId::new(namespace, policy.name_unchecked())
}
