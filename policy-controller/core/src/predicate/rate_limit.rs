use super::{pattern_expr, Capabilities, Criterion, Dialect, Expr, Pattern};

/// The rate-limit filter's condition language.
///
/// A rule's conditions are a list of alternatives, each a conjunction of
/// expressions; query parameters render as nested `anyOf` expressions.
#[derive(Copy, Clone, Debug, Default)]
pub struct RateLimitFilter;

/// Alternatives of conjunctions.
pub type Conditions = Vec<Vec<Expr<Pattern>>>;

impl Dialect for RateLimitFilter {
    type Output = Conditions;

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn render(&self, expr: Expr<Criterion>) -> Conditions {
        match expr {
            Expr::AnyOf(arms) => arms.into_iter().map(conjunction).collect(),
            expr => vec![conjunction(expr)],
        }
    }
}

fn conjunction(expr: Expr<Criterion>) -> Vec<Expr<Pattern>> {
    match expr {
        Expr::Leaf(criterion) => vec![pattern_expr(criterion)],
        Expr::AllOf(exprs) => exprs.into_iter().flat_map(conjunction).collect(),
        Expr::AnyOf(arms) => vec![Expr::AnyOf(
            arms.into_iter()
                .map(|arm| match conjunction(arm) {
                    mut all if all.len() == 1 => all.remove(0),
                    all => Expr::AllOf(all),
                })
                .collect(),
        )],
    }
}

/// Appends `when` patterns to every alternative. A rule without route
/// conditions gets the patterns as its only alternative.
pub fn with_when(conditions: Option<Conditions>, when: &[Pattern]) -> Option<Conditions> {
    let when = when.iter().cloned().map(Expr::Leaf).collect::<Vec<_>>();
    match conditions {
        Some(mut alternatives) => {
            for all in alternatives.iter_mut() {
                all.extend(when.iter().cloned());
            }
            Some(alternatives)
        }
        None if when.is_empty() => None,
        None => Some(vec![when]),
    }
}
