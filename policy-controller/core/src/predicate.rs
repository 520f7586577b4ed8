//! Compiles HTTPRoute rules into boolean predicate trees.
//!
//! A rule is first lowered into an [`Expr`] over [`Criterion`] leaves that is
//! independent of any consumer. Each [`Dialect`] declares which criteria it
//! can express through its [`Capabilities`]; [`compile`] strips what a
//! dialect cannot express with [`restrict`] and hands the rest to the
//! dialect's renderer.
//!
//! Restriction only ever widens a predicate: a criterion that cannot be
//! expressed is treated as always true, never as always false. A dialect with
//! fewer capabilities therefore matches a superset of the requests matched by
//! a richer one.

use crate::http_route::{
    HeaderMatch, HttpRouteRule, Method, PathMatch, QueryParamMatch, CATCH_ALL_HOSTNAME,
};
use serde::{Deserialize, Serialize};

pub mod authorization;
pub mod proxy;
pub mod rate_limit;

#[cfg(test)]
mod tests;

/// A boolean expression tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr<T> {
    Leaf(T),
    AllOf(Vec<Expr<T>>),
    AnyOf(Vec<Expr<T>>),
}

/// A single route-match criterion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Criterion {
    /// Matches any of the given hostnames. Never contains the catch-all
    /// hostname; wildcard hostnames are kept as written.
    Hosts(Vec<String>),
    Method(Method),
    Path(PathMatch),
    Header(HeaderMatch),
    QueryParam(QueryParamMatch),
}

/// Describes which criteria a dialect can express.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub regex_paths: bool,
    pub regex_headers: bool,
    pub query_params: bool,
}

/// A downstream rule language.
pub trait Dialect {
    type Output;

    fn capabilities(&self) -> Capabilities;

    /// Renders a predicate that has already been restricted to this dialect's
    /// capabilities.
    fn render(&self, expr: Expr<Criterion>) -> Self::Output;
}

/// A `{selector, operator, value}` leaf as understood by the authorization
/// engine and the rate-limit filter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    pub selector: String,
    pub operator: Operator,
    pub value: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    StartsWith,
    EndsWith,
    Incl,
    Excl,
    Matches,
}

// === impl Expr ===

impl<T> Expr<T> {
    /// Visits every leaf, depth first.
    pub fn leaves(&self) -> Vec<&T> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a T>) {
        match self {
            Self::Leaf(leaf) => leaves.push(leaf),
            Self::AllOf(exprs) | Self::AnyOf(exprs) => {
                for expr in exprs {
                    expr.collect_leaves(leaves);
                }
            }
        }
    }
}

// === impl Capabilities ===

impl Capabilities {
    /// Every criterion is expressible.
    pub const ALL: Self = Self {
        regex_paths: true,
        regex_headers: true,
        query_params: true,
    };

    /// Literal operations only: no regular expressions and no query strings.
    pub const PROXY: Self = Self {
        regex_paths: false,
        regex_headers: false,
        query_params: false,
    };

    pub fn admits(&self, criterion: &Criterion) -> bool {
        match criterion {
            Criterion::Hosts(_) | Criterion::Method(_) => true,
            Criterion::Path(PathMatch::Regex(_)) => self.regex_paths,
            Criterion::Path(_) => true,
            Criterion::Header(HeaderMatch::Regex(..)) => self.regex_headers,
            Criterion::Header(_) => true,
            Criterion::QueryParam(_) => self.query_params,
        }
    }
}

/// Lowers a route rule into a predicate over its matches.
///
/// Returns `None` when the rule matches every request: it has no matches and
/// only catch-all hostnames, or one of its matches is empty and unconstrained
/// by hostname.
pub fn conditions(rule: &HttpRouteRule, hostnames: &[String]) -> Option<Expr<Criterion>> {
    let hosts = hostnames
        .iter()
        .filter(|h| *h != CATCH_ALL_HOSTNAME)
        .cloned()
        .collect::<Vec<_>>();
    let host = (!hosts.is_empty()).then(|| Expr::Leaf(Criterion::Hosts(hosts)));

    if rule.matches.is_empty() {
        return host;
    }

    let mut arms = Vec::with_capacity(rule.matches.len());
    for m in rule.matches.iter() {
        let mut all = Vec::new();
        all.extend(host.clone());
        if let Some(method) = m.method.clone() {
            all.push(Expr::Leaf(Criterion::Method(method)));
        }
        if let Some(path) = m.path.clone() {
            all.push(Expr::Leaf(Criterion::Path(path)));
        }
        all.extend(m.headers.iter().cloned().map(|h| Expr::Leaf(Criterion::Header(h))));
        all.extend(
            m.query_params
                .iter()
                .cloned()
                .map(|q| Expr::Leaf(Criterion::QueryParam(q))),
        );

        // An unconstrained match accepts every request, so the rule does.
        if all.is_empty() {
            return None;
        }
        arms.push(Expr::AllOf(all));
    }
    Some(Expr::AnyOf(arms))
}

/// Drops the criteria `caps` cannot express. `None` means the restricted
/// predicate is always true.
pub fn restrict(expr: Expr<Criterion>, caps: Capabilities) -> Option<Expr<Criterion>> {
    match expr {
        Expr::Leaf(criterion) => caps.admits(&criterion).then_some(Expr::Leaf(criterion)),
        Expr::AllOf(exprs) => Some(Expr::AllOf(
            exprs.into_iter().filter_map(|e| restrict(e, caps)).collect(),
        )),
        Expr::AnyOf(exprs) => exprs
            .into_iter()
            .map(|e| restrict(e, caps))
            .collect::<Option<Vec<_>>>()
            .map(Expr::AnyOf),
    }
}

/// Compiles a route rule for the given dialect. `None` means the rule
/// imposes no condition the dialect can express.
pub fn compile<D: Dialect>(
    dialect: &D,
    rule: &HttpRouteRule,
    hostnames: &[String],
) -> Option<D::Output> {
    let expr = conditions(rule, hostnames)?;
    let expr = restrict(expr, dialect.capabilities())?;
    Some(dialect.render(expr))
}

/// Renders a criterion as pattern leaves. Query parameters have no selector
/// of their own, so they are extracted from the raw path and may appear
/// either first or later in the query string.
pub(crate) fn pattern_expr(criterion: Criterion) -> Expr<Pattern> {
    match criterion {
        Criterion::Hosts(hosts) => Expr::Leaf(Pattern::new(
            "request.host",
            Operator::Matches,
            host_regex(&hosts),
        )),
        Criterion::Method(method) => {
            Expr::Leaf(Pattern::new("request.method", Operator::Eq, method.as_str()))
        }
        Criterion::Path(PathMatch::Exact(path)) => {
            Expr::Leaf(Pattern::new("request.url_path", Operator::Eq, path))
        }
        Criterion::Path(PathMatch::Prefix(prefix)) => Expr::Leaf(Pattern::new(
            "request.url_path",
            Operator::Matches,
            format!("{prefix}.*"),
        )),
        Criterion::Path(PathMatch::Regex(regex)) => Expr::Leaf(Pattern::new(
            "request.url_path",
            Operator::Matches,
            regex.as_str(),
        )),
        Criterion::Header(HeaderMatch::Exact(name, value)) => Expr::Leaf(Pattern::new(
            format!("request.headers.{}", name.as_str()),
            Operator::Eq,
            value,
        )),
        Criterion::Header(HeaderMatch::Regex(name, regex)) => Expr::Leaf(Pattern::new(
            format!("request.headers.{}", name.as_str()),
            Operator::Matches,
            regex.as_str(),
        )),
        Criterion::QueryParam(qp) => {
            let (name, operator, value) = match qp {
                QueryParamMatch::Exact(name, value) => (name, Operator::Eq, value),
                QueryParamMatch::Regex(name, regex) => {
                    (name, Operator::Matches, regex.as_str().to_string())
                }
            };
            Expr::AnyOf(
                ["?", "&"]
                    .into_iter()
                    .map(|sep| {
                        Expr::Leaf(Pattern::new(
                            query_param_selector(sep, &name),
                            operator,
                            value.clone(),
                        ))
                    })
                    .collect(),
            )
        }
    }
}

/// Builds an alternation of hostnames where wildcards match any prefix.
/// No anchors are added.
fn host_regex(hosts: &[String]) -> String {
    hosts
        .iter()
        .map(|h| h.replace('.', r"\.").replace('*', ".*"))
        .collect::<Vec<_>>()
        .join("|")
}

fn query_param_selector(sep: &str, name: &str) -> String {
    format!(
        r#"request.path.@extract:{{"sep":"{sep}{name}=","pos":1}}|@extract:{{"sep":"&"}}"#
    )
}

// === impl Operator ===

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Incl => "incl",
            Self::Excl => "excl",
            Self::Matches => "matches",
        }
    }
}

// === impl Pattern ===

impl Pattern {
    pub fn new(selector: impl ToString, operator: Operator, value: impl ToString) -> Self {
        Self {
            selector: selector.to_string(),
            operator,
            value: value.to_string(),
        }
    }
}
