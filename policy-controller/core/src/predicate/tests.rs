use super::{
    authorization::AuthEngine,
    proxy::{self, Condition, Operation, Rule},
    rate_limit::{self, RateLimitFilter},
    *,
};
use crate::http_route::{HeaderName, HttpRouteMatch};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn hosts(hs: &[&str]) -> Vec<String> {
    hs.iter().map(|h| h.to_string()).collect()
}

fn rule(matches: Vec<HttpRouteMatch>) -> HttpRouteRule {
    HttpRouteRule { matches }
}

fn path_rule(path: PathMatch) -> HttpRouteRule {
    rule(vec![HttpRouteMatch {
        path: Some(path),
        ..Default::default()
    }])
}

fn leaf(selector: &str, operator: Operator, value: &str) -> Expr<Pattern> {
    Expr::Leaf(Pattern::new(selector, operator, value))
}

const TOYSTORE_HOST: &str = r"toystore\.kuadrant\.io";

#[test]
fn prefix_path() {
    let rule = path_rule(PathMatch::Prefix("/toy".to_string()));
    let hostnames = hosts(&["toystore.kuadrant.io"]);

    assert_eq!(
        compile(&AuthEngine, &rule, &hostnames),
        Some(Expr::AnyOf(vec![Expr::AllOf(vec![
            leaf("request.host", Operator::Matches, TOYSTORE_HOST),
            leaf("request.url_path", Operator::Matches, "/toy.*"),
        ])]))
    );
    assert_eq!(
        proxy::rules(&rule, &hostnames),
        vec![Rule {
            to: vec![Operation {
                hosts: hosts(&["toystore.kuadrant.io"]),
                paths: vec!["/toy*".to_string()],
                ..Default::default()
            }],
            when: vec![],
        }]
    );
}

#[test]
fn regex_path_is_dropped_by_proxy_only() {
    let rule = path_rule(PathMatch::regex("/toy[0-9]+").unwrap());
    let hostnames = hosts(&["toystore.kuadrant.io"]);

    assert_eq!(
        compile(&AuthEngine, &rule, &hostnames),
        Some(Expr::AnyOf(vec![Expr::AllOf(vec![
            leaf("request.host", Operator::Matches, TOYSTORE_HOST),
            leaf("request.url_path", Operator::Matches, "/toy[0-9]+"),
        ])]))
    );
    assert_eq!(
        proxy::rules(&rule, &hostnames),
        vec![Rule {
            to: vec![Operation {
                hosts: hosts(&["toystore.kuadrant.io"]),
                ..Default::default()
            }],
            when: vec![],
        }]
    );
}

#[test]
fn query_param_extraction() {
    let rule = rule(vec![HttpRouteMatch {
        query_params: vec![QueryParamMatch::Exact(
            "x-foo".to_string(),
            "a-value".to_string(),
        )],
        ..Default::default()
    }]);
    let hostnames = hosts(&["*"]);

    assert_eq!(
        compile(&AuthEngine, &rule, &hostnames),
        Some(Expr::AnyOf(vec![Expr::AllOf(vec![Expr::AnyOf(vec![
            leaf(
                r#"request.path.@extract:{"sep":"?x-foo=","pos":1}|@extract:{"sep":"&"}"#,
                Operator::Eq,
                "a-value",
            ),
            leaf(
                r#"request.path.@extract:{"sep":"&x-foo=","pos":1}|@extract:{"sep":"&"}"#,
                Operator::Eq,
                "a-value",
            ),
        ])])]))
    );
    // Nothing the proxy can express remains, so its rule matches everything.
    assert_eq!(proxy::rules(&rule, &hostnames), vec![Rule::default()]);
}

#[test]
fn full_match_field_order() {
    let rule = rule(vec![HttpRouteMatch {
        path: Some(PathMatch::Exact("/cars".to_string())),
        headers: vec![
            HeaderMatch::Exact(HeaderName::from_static("x-tier"), "gold".to_string()),
            HeaderMatch::Regex(
                HeaderName::from_static("x-id"),
                regex::Regex::new("[0-9]+").unwrap(),
            ),
        ],
        query_params: vec![],
        method: Some(Method::POST),
    }]);
    let hostnames = hosts(&["*.toystore.io", "*"]);

    assert_eq!(
        compile(&AuthEngine, &rule, &hostnames),
        Some(Expr::AnyOf(vec![Expr::AllOf(vec![
            leaf("request.host", Operator::Matches, r".*\.toystore\.io"),
            leaf("request.method", Operator::Eq, "POST"),
            leaf("request.url_path", Operator::Eq, "/cars"),
            leaf("request.headers.x-tier", Operator::Eq, "gold"),
            leaf("request.headers.x-id", Operator::Matches, "[0-9]+"),
        ])]))
    );
    assert_eq!(
        proxy::rules(&rule, &hostnames),
        vec![Rule {
            to: vec![Operation {
                hosts: hosts(&["*.toystore.io"]),
                methods: vec!["POST".to_string()],
                paths: vec!["/cars".to_string()],
            }],
            when: vec![Condition {
                key: "request.headers[x-tier]".to_string(),
                values: vec!["gold".to_string()],
            }],
        }]
    );
}

#[test]
fn catch_all_rule() {
    let rule = HttpRouteRule::default();
    assert_eq!(compile(&AuthEngine, &rule, &hosts(&["*"])), None);
    assert_eq!(compile(&AuthEngine, &rule, &[]), None);
    assert_eq!(
        compile(&AuthEngine, &rule, &hosts(&["a.io", "*.b.io"])),
        Some(leaf("request.host", Operator::Matches, r"a\.io|.*\.b\.io"))
    );
    assert_eq!(proxy::rules(&rule, &hosts(&["*"])), vec![Rule::default()]);
}

#[test]
fn unconstrained_match_accepts_everything() {
    let rule = rule(vec![
        HttpRouteMatch {
            method: Some(Method::GET),
            ..Default::default()
        },
        HttpRouteMatch::default(),
    ]);
    assert_eq!(conditions(&rule, &hosts(&["*"])), None);
    assert!(conditions(&rule, &hosts(&["a.io"])).is_some());
}

#[rstest]
#[case(&["*"])]
#[case(&["*", "api.io"])]
#[case(&["*.api.io", "*"])]
fn catch_all_hostname_never_literal(#[case] hostnames: &[&str]) {
    let rule = path_rule(PathMatch::Exact("/".to_string()));
    let expr = compile(&AuthEngine, &rule, &hosts(hostnames)).unwrap();
    for pattern in expr.leaves() {
        if pattern.selector == "request.host" {
            assert!(
                pattern.value.split('|').all(|alt| alt != "*" && alt != ".*"),
                "{}",
                pattern.value
            );
        }
    }
}

fn mixed_rule() -> HttpRouteRule {
    rule(vec![
        HttpRouteMatch {
            path: Some(PathMatch::regex("/v[0-9]/.*").unwrap()),
            method: Some(Method::GET),
            ..Default::default()
        },
        HttpRouteMatch {
            headers: vec![HeaderMatch::Exact(
                HeaderName::from_static("x-canary"),
                "true".to_string(),
            )],
            query_params: vec![QueryParamMatch::Regex(
                "debug".to_string(),
                regex::Regex::new("1|true").unwrap(),
            )],
            ..Default::default()
        },
        HttpRouteMatch {
            path: Some(PathMatch::Prefix("/admin".to_string())),
            ..Default::default()
        },
    ])
}

#[rstest]
#[case(&["*"])]
#[case(&["shop.io"])]
fn compilation_is_deterministic(#[case] hostnames: &[&str]) {
    let hostnames = hosts(hostnames);
    let rule = mixed_rule();
    assert_eq!(
        compile(&AuthEngine, &rule, &hostnames),
        compile(&AuthEngine, &rule, &hostnames)
    );
    assert_eq!(
        compile(&RateLimitFilter, &rule, &hostnames),
        compile(&RateLimitFilter, &rule, &hostnames)
    );
    assert_eq!(proxy::rules(&rule, &hostnames), proxy::rules(&rule, &hostnames));
}

#[test]
fn arity_is_preserved() {
    let rule = mixed_rule();
    let hostnames = hosts(&["shop.io"]);
    match compile(&AuthEngine, &rule, &hostnames) {
        Some(Expr::AnyOf(arms)) => assert_eq!(arms.len(), 3),
        expr => panic!("unexpected predicate: {expr:?}"),
    }
    assert_eq!(compile(&RateLimitFilter, &rule, &hostnames).unwrap().len(), 3);
    assert_eq!(proxy::rules(&rule, &hostnames).len(), 3);
}

#[rstest]
#[case(&["*"])]
#[case(&["shop.io", "*.shop.io"])]
fn proxy_is_a_subset_of_the_full_dialect(#[case] hostnames: &[&str]) {
    let full = conditions(&mixed_rule(), &hosts(hostnames)).unwrap();
    let restricted = restrict(full.clone(), Capabilities::PROXY).unwrap();
    let full_leaves = full.leaves();
    for criterion in restricted.leaves() {
        assert!(full_leaves.contains(&criterion), "{criterion:?}");
        assert!(Capabilities::PROXY.admits(criterion));
    }
}

#[test]
fn restriction_widens_alternatives() {
    // An alternative that loses every criterion makes the whole disjunction
    // unconditional.
    let expr = Expr::AnyOf(vec![
        Expr::Leaf(Criterion::Method(Method::GET)),
        Expr::Leaf(Criterion::Path(PathMatch::regex("/x").unwrap())),
    ]);
    assert_eq!(restrict(expr, Capabilities::PROXY), None);

    let expr = Expr::AnyOf(vec![Expr::AllOf(vec![Expr::Leaf(Criterion::Path(
        PathMatch::regex("/x").unwrap(),
    ))])]);
    assert_eq!(
        restrict(expr, Capabilities::PROXY),
        Some(Expr::AnyOf(vec![Expr::AllOf(vec![])]))
    );
}

#[test]
fn rate_limit_conditions() {
    let rule = rule(vec![
        HttpRouteMatch {
            method: Some(Method::GET),
            ..Default::default()
        },
        HttpRouteMatch {
            query_params: vec![QueryParamMatch::Exact("a".to_string(), "b".to_string())],
            ..Default::default()
        },
    ]);
    let conditions = compile(&RateLimitFilter, &rule, &hosts(&["*"])).unwrap();
    assert_eq!(
        conditions,
        vec![
            vec![leaf("request.method", Operator::Eq, "GET")],
            vec![Expr::AnyOf(vec![
                leaf(
                    r#"request.path.@extract:{"sep":"?a=","pos":1}|@extract:{"sep":"&"}"#,
                    Operator::Eq,
                    "b",
                ),
                leaf(
                    r#"request.path.@extract:{"sep":"&a=","pos":1}|@extract:{"sep":"&"}"#,
                    Operator::Eq,
                    "b",
                ),
            ])],
        ]
    );
}

#[test]
fn rate_limit_when_patterns() {
    let when = vec![Pattern::new("auth.identity.group", Operator::Neq, "admin")];
    assert_eq!(
        rate_limit::with_when(None, &when),
        Some(vec![vec![Expr::Leaf(when[0].clone())]])
    );
    assert_eq!(rate_limit::with_when(None, &[]), None);

    let routed = compile(
        &RateLimitFilter,
        &path_rule(PathMatch::Exact("/".to_string())),
        &hosts(&["a.io"]),
    );
    assert_eq!(
        rate_limit::with_when(routed, &when),
        Some(vec![vec![
            leaf("request.host", Operator::Matches, r"a\.io"),
            leaf("request.url_path", Operator::Eq, "/"),
            Expr::Leaf(when[0].clone()),
        ]])
    );
}

#[test]
fn operators_serialize_lowercase() {
    let pattern = Pattern::new("request.url_path", Operator::StartsWith, "/api");
    assert_eq!(
        serde_json::to_value(&pattern).unwrap(),
        serde_json::json!({
            "selector": "request.url_path",
            "operator": "startswith",
            "value": "/api",
        })
    );
}

#[rstest]
#[case(Operator::Eq)]
#[case(Operator::Neq)]
#[case(Operator::StartsWith)]
#[case(Operator::EndsWith)]
#[case(Operator::Incl)]
#[case(Operator::Excl)]
#[case(Operator::Matches)]
fn operator_names_match_serialization(#[case] operator: Operator) {
    assert_eq!(
        serde_json::to_value(operator).unwrap(),
        serde_json::Value::String(operator.as_str().to_string())
    );
}
