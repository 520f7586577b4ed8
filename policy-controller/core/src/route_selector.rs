//! Narrows a policy section to a subset of an HTTPRoute's rules and hostnames.

use crate::http_route::{HttpRoute, HttpRouteMatch, HttpRouteRule, CATCH_ALL_HOSTNAME};

/// Selects the rules of a route having a match that contains one of
/// `matches`, restricted to the route hostnames intersecting `hostnames`.
/// Empty fields select everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteSelector {
    pub hostnames: Vec<String>,
    pub matches: Vec<HttpRouteMatch>,
}

/// A selected rule and the hostnames it is compiled against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub rule: HttpRouteRule,
    pub hostnames: Vec<String>,
}

impl RouteSelector {
    /// The hostnames both this selector and the route accept. A wildcard on
    /// either side yields the more specific hostname.
    pub fn select_hostnames(&self, route_hostnames: &[String]) -> Vec<String> {
        if self.hostnames.is_empty() {
            return route_hostnames.to_vec();
        }
        let mut selected = Vec::<String>::new();
        for route_host in route_hostnames {
            for selector_host in self.hostnames.iter() {
                let host = if is_subdomain(selector_host, route_host) {
                    route_host
                } else if is_subdomain(route_host, selector_host) {
                    selector_host
                } else {
                    continue;
                };
                if !selected.contains(host) {
                    selected.push(host.clone());
                }
            }
        }
        selected
    }

    /// The rules of `route` this selector selects, in route order.
    pub fn select_rules(&self, route: &HttpRoute) -> Vec<HttpRouteRule> {
        if self.select_hostnames(&route.hostnames()).is_empty() {
            return vec![];
        }
        route
            .rules
            .iter()
            .filter(|rule| self.selects(rule))
            .cloned()
            .collect()
    }

    fn selects(&self, rule: &HttpRouteRule) -> bool {
        self.matches.is_empty()
            || self
                .matches
                .iter()
                .any(|sm| rule.matches.iter().any(|rm| contains(rm, sm)))
    }
}

/// Resolves the rules and hostnames a set of selectors picks from a route.
/// Without selectors every rule is selected with the route's hostnames.
/// A rule picked by several selectors is only returned once.
pub fn select(selectors: &[RouteSelector], route: &HttpRoute) -> Vec<Selection> {
    let route_hostnames = route.hostnames();
    if selectors.is_empty() {
        return route
            .rules
            .iter()
            .map(|rule| Selection {
                rule: rule.clone(),
                hostnames: route_hostnames.clone(),
            })
            .collect();
    }

    let mut selections = Vec::<Selection>::new();
    for selector in selectors {
        let hostnames = selector.select_hostnames(&route_hostnames);
        if hostnames.is_empty() {
            continue;
        }
        for rule in selector.select_rules(route) {
            let selection = Selection {
                rule,
                hostnames: hostnames.clone(),
            };
            if !selections.contains(&selection) {
                selections.push(selection);
            }
        }
    }
    selections
}

/// Every criterion set on `selector` is also set, identically, on `m`.
fn contains(m: &HttpRouteMatch, selector: &HttpRouteMatch) -> bool {
    selector.path.as_ref().map_or(true, |p| m.path.as_ref() == Some(p))
        && selector
            .method
            .as_ref()
            .map_or(true, |method| m.method.as_ref() == Some(method))
        && selector.headers.iter().all(|h| m.headers.contains(h))
        && selector.query_params.iter().all(|q| m.query_params.contains(q))
}

/// Indicates whether every host matched by `specific` is matched by
/// `general`.
fn is_subdomain(general: &str, specific: &str) -> bool {
    if general == CATCH_ALL_HOSTNAME || general == specific {
        return true;
    }
    match general.strip_prefix('*') {
        Some(suffix) => {
            suffix.starts_with('.') && specific.len() > suffix.len() && specific.ends_with(suffix)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http_route::{HeaderMatch, HeaderName, Method, PathMatch},
        ResourceId,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn path_match(path: &str) -> HttpRouteMatch {
        HttpRouteMatch {
            path: Some(PathMatch::Prefix(path.to_string())),
            ..Default::default()
        }
    }

    fn toystore() -> HttpRoute {
        HttpRoute {
            id: ResourceId::new("toystore", "toystore"),
            parent_refs: vec![],
            hostnames: vec!["*.toystore.com".to_string(), "api.toystore.io".to_string()],
            rules: vec![
                HttpRouteRule {
                    matches: vec![
                        HttpRouteMatch {
                            method: Some(Method::GET),
                            ..path_match("/toys")
                        },
                        HttpRouteMatch {
                            method: Some(Method::POST),
                            ..path_match("/toys")
                        },
                    ],
                },
                HttpRouteRule {
                    matches: vec![HttpRouteMatch {
                        headers: vec![HeaderMatch::Exact(
                            HeaderName::from_static("x-admin"),
                            "1".to_string(),
                        )],
                        ..path_match("/admin")
                    }],
                },
                HttpRouteRule::default(),
            ],
            creation_timestamp: None,
        }
    }

    #[rstest]
    #[case("*", "a.b.com", true)]
    #[case("a.b.com", "a.b.com", true)]
    #[case("*.b.com", "a.b.com", true)]
    #[case("*.com", "*.b.com", true)]
    #[case("*.b.com", "b.com", false)]
    #[case("a.b.com", "*.b.com", false)]
    #[case("*.b.com", "ab.com", false)]
    fn subdomains(#[case] general: &str, #[case] specific: &str, #[case] expected: bool) {
        assert_eq!(is_subdomain(general, specific), expected);
    }

    #[test]
    fn selects_rules_by_match() {
        let selector = RouteSelector {
            hostnames: vec![],
            matches: vec![HttpRouteMatch {
                method: Some(Method::POST),
                ..Default::default()
            }],
        };
        let route = toystore();
        assert_eq!(selector.select_rules(&route), vec![route.rules[0].clone()]);

        let selector = RouteSelector {
            hostnames: vec![],
            matches: vec![path_match("/admin")],
        };
        assert_eq!(selector.select_rules(&route), vec![route.rules[1].clone()]);
    }

    #[test]
    fn empty_selector_selects_everything() {
        let route = toystore();
        assert_eq!(RouteSelector::default().select_rules(&route), route.rules);
        assert_eq!(
            RouteSelector::default().select_hostnames(&route.hostnames),
            route.hostnames
        );
    }

    #[test]
    fn narrows_hostnames() {
        let route = toystore();
        let selector = RouteSelector {
            hostnames: vec!["shop.toystore.com".to_string(), "other.io".to_string()],
            matches: vec![],
        };
        assert_eq!(
            selector.select_hostnames(&route.hostnames),
            vec!["shop.toystore.com"]
        );

        let selector = RouteSelector {
            hostnames: vec!["other.io".to_string()],
            matches: vec![],
        };
        assert!(selector.select_hostnames(&route.hostnames).is_empty());
        assert!(selector.select_rules(&route).is_empty());
    }

    #[test]
    fn selections_are_deduplicated() {
        let route = toystore();
        let by_path = RouteSelector {
            hostnames: vec![],
            matches: vec![path_match("/toys")],
        };
        let by_method = RouteSelector {
            hostnames: vec![],
            matches: vec![HttpRouteMatch {
                method: Some(Method::GET),
                ..path_match("/toys")
            }],
        };
        let selections = select(&[by_path, by_method], &route);
        assert_eq!(
            selections,
            vec![Selection {
                rule: route.rules[0].clone(),
                hostnames: route.hostnames.clone(),
            }]
        );
        assert_eq!(select(&[], &route).len(), 3);
    }
}
