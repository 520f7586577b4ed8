use super::{Capabilities, Criterion, Dialect, Expr};
use crate::http_route::{HeaderMatch, HttpRouteRule, PathMatch};

/// The proxy's authorization policy rule language. Operations carry literal
/// hosts, methods and paths (with a trailing `*` for prefixes); headers are
/// literal `when` conditions.
#[derive(Copy, Clone, Debug, Default)]
pub struct ProxyAuthz;

/// Matches a request when every operation field and `when` condition
/// matches. A rule without either matches every request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rule {
    pub to: Vec<Operation>,
    pub when: Vec<Condition>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Operation {
    pub hosts: Vec<String>,
    pub methods: Vec<String>,
    pub paths: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub key: String,
    pub values: Vec<String>,
}

impl Dialect for ProxyAuthz {
    type Output = Vec<Rule>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::PROXY
    }

    fn render(&self, expr: Expr<Criterion>) -> Vec<Rule> {
        match expr {
            Expr::AnyOf(arms) => arms.into_iter().map(rule).collect(),
            expr => vec![rule(expr)],
        }
    }
}

/// Compiles a route rule into proxy rules. A rule without expressible
/// conditions becomes a single rule matching every request.
pub fn rules(rule: &HttpRouteRule, hostnames: &[String]) -> Vec<Rule> {
    super::compile(&ProxyAuthz, rule, hostnames).unwrap_or_else(|| vec![Rule::default()])
}

fn rule(expr: Expr<Criterion>) -> Rule {
    let mut op = Operation::default();
    let mut when = Vec::new();
    let leaves = match expr {
        Expr::Leaf(criterion) => vec![criterion],
        Expr::AllOf(exprs) => exprs
            .into_iter()
            .filter_map(|e| match e {
                Expr::Leaf(criterion) => Some(criterion),
                // Operations cannot nest alternatives; leaving one out widens
                // the rule.
                _ => None,
            })
            .collect(),
        Expr::AnyOf(_) => vec![],
    };

    for criterion in leaves {
        match criterion {
            Criterion::Hosts(hosts) => op.hosts.extend(hosts),
            Criterion::Method(method) => op.methods.push(method.to_string()),
            Criterion::Path(PathMatch::Exact(path)) => op.paths.push(path),
            Criterion::Path(PathMatch::Prefix(prefix)) => op.paths.push(format!("{prefix}*")),
            Criterion::Header(HeaderMatch::Exact(name, value)) => when.push(Condition {
                key: format!("request.headers[{}]", name.as_str()),
                values: vec![value],
            }),
            criterion => tracing::trace!(?criterion, "Not expressible by proxy rules"),
        }
    }

    let to = if op == Operation::default() {
        vec![]
    } else {
        vec![op]
    };
    Rule { to, when }
}
