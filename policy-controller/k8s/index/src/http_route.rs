use crate::creation_timestamp;
use anyhow::{anyhow, Result};
use kuadrant_policy_controller_core::{
    http_route::{
        HeaderMatch, HttpRoute, HttpRouteMatch, HttpRouteRule, Method, ParentRef, PathMatch,
        QueryParamMatch,
    },
    ResourceId,
};
use kuadrant_policy_controller_k8s_api::{gateway as api, ResourceExt};

pub fn http_route(route: api::HttpRoute) -> Result<HttpRoute> {
    let namespace = route.namespace().expect("HTTPRoute must have a namespace");
    let id = ResourceId::new(namespace, route.name_unchecked());
    let creation_timestamp = creation_timestamp(&route.metadata);

    let api::HttpRouteSpec {
        inner,
        hostnames,
        rules,
    } = route.spec;

    let parent_refs = inner
        .parent_refs
        .into_iter()
        .flatten()
        .map(parent_ref)
        .collect();

    let rules = rules
        .into_iter()
        .flatten()
        .map(|api::HttpRouteRule { matches, .. }| {
            let matches = matches
                .into_iter()
                .flatten()
                .map(try_match)
                .collect::<Result<_>>()?;
            Ok(HttpRouteRule { matches })
        })
        .collect::<Result<_>>()?;

    Ok(HttpRoute {
        id,
        parent_refs,
        hostnames: hostnames.unwrap_or_default(),
        rules,
        creation_timestamp,
    })
}

fn parent_ref(
    api::ParentReference {
        group,
        kind,
        namespace,
        name,
        ..
    }: api::ParentReference,
) -> ParentRef {
    ParentRef {
        group,
        kind,
        namespace,
        name,
    }
}

pub fn try_match(
    api::HttpRouteMatch {
        path,
        headers,
        query_params,
        method,
    }: api::HttpRouteMatch,
) -> Result<HttpRouteMatch> {
    let path = path.map(path_match).transpose()?;

    let headers = headers
        .into_iter()
        .flatten()
        .map(header_match)
        .collect::<Result<_>>()?;

    let query_params = query_params
        .into_iter()
        .flatten()
        .map(query_param_match)
        .collect::<Result<_>>()?;

    let method = method.as_deref().map(Method::try_from).transpose()?;

    Ok(HttpRouteMatch {
        path,
        headers,
        query_params,
        method,
    })
}

pub fn path_match(path_match: api::HttpPathMatch) -> Result<PathMatch> {
    match path_match {
        api::HttpPathMatch::Exact { value } | api::HttpPathMatch::PathPrefix { value }
            if !value.starts_with('/') =>
        {
            Err(anyhow!("HttpPathMatch paths must be absolute (begin with `/`); {value:?} is not an absolute path"))
        }
        api::HttpPathMatch::Exact { value } => Ok(PathMatch::Exact(value)),
        api::HttpPathMatch::PathPrefix { value } => Ok(PathMatch::Prefix(value)),
        api::HttpPathMatch::RegularExpression { value } => PathMatch::regex(&value),
    }
}

pub fn header_match(header_match: api::HttpHeaderMatch) -> Result<HeaderMatch> {
    match header_match {
        api::HttpHeaderMatch::Exact { name, value } => Ok(HeaderMatch::Exact(name.parse()?, value)),
        api::HttpHeaderMatch::RegularExpression { name, value } => {
            Ok(HeaderMatch::Regex(name.parse()?, value.parse()?))
        }
    }
}

pub fn query_param_match(query_match: api::HttpQueryParamMatch) -> Result<QueryParamMatch> {
    match query_match {
        api::HttpQueryParamMatch::Exact { name, value } => Ok(QueryParamMatch::Exact(name, value)),
        api::HttpQueryParamMatch::RegularExpression { name, value } => {
            Ok(QueryParamMatch::Regex(name, value.parse()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuadrant_policy_controller_core::http_route::HeaderName;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn mk_route(spec: serde_json::Value) -> api::HttpRoute {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "gateway.networking.k8s.io/v1beta1",
            "kind": "HTTPRoute",
            "metadata": {
                "namespace": "toystore",
                "name": "toystore",
                "creationTimestamp": "2024-01-01T00:00:00Z",
            },
            "spec": spec,
        }))
        .expect("route must parse")
    }

    #[test]
    fn converts_route() {
        let route = http_route(mk_route(serde_json::json!({
            "parentRefs": [{ "name": "gw", "namespace": "gateway-system" }],
            "hostnames": ["*.toystore.com"],
            "rules": [
                {
                    "matches": [{
                        "method": "GET",
                        "path": { "type": "PathPrefix", "value": "/toys" },
                        "headers": [{ "type": "Exact", "name": "X-Tier", "value": "gold" }],
                        "queryParams": [{ "type": "Exact", "name": "page", "value": "1" }],
                    }],
                },
                {},
            ],
        })))
        .unwrap();

        assert_eq!(route.id, ResourceId::new("toystore", "toystore"));
        assert_eq!(
            route.parent_refs,
            vec![ParentRef {
                namespace: Some("gateway-system".to_string()),
                name: "gw".to_string(),
                ..Default::default()
            }]
        );
        assert_eq!(route.hostnames, vec!["*.toystore.com"]);
        assert_eq!(
            route.rules,
            vec![
                HttpRouteRule {
                    matches: vec![HttpRouteMatch {
                        path: Some(PathMatch::Prefix("/toys".to_string())),
                        headers: vec![HeaderMatch::Exact(
                            HeaderName::from_static("x-tier"),
                            "gold".to_string()
                        )],
                        query_params: vec![QueryParamMatch::Exact(
                            "page".to_string(),
                            "1".to_string()
                        )],
                        method: Some(Method::GET),
                    }],
                },
                HttpRouteRule::default(),
            ]
        );
        assert!(route.creation_timestamp.is_some());
    }

    #[rstest]
    #[case(serde_json::json!({ "type": "Exact", "value": "toys" }))]
    #[case(serde_json::json!({ "type": "PathPrefix", "value": "toys/" }))]
    #[case(serde_json::json!({ "type": "RegularExpression", "value": "/toys/(" }))]
    fn rejects_invalid_paths(#[case] path: serde_json::Value) {
        let route = mk_route(serde_json::json!({
            "rules": [{ "matches": [{ "path": path }] }],
        }));
        assert!(http_route(route).is_err());
    }

    #[test]
    fn rejects_invalid_methods() {
        let route = mk_route(serde_json::json!({
            "rules": [{ "matches": [{ "method": "G E T" }] }],
        }));
        assert!(http_route(route).is_err());
    }
}
