use super::{pattern_expr, Capabilities, Criterion, Dialect, Expr, Pattern};

/// The external authorization engine's condition language. Every criterion is
/// expressible.
#[derive(Copy, Clone, Debug, Default)]
pub struct AuthEngine;

impl Dialect for AuthEngine {
    type Output = Expr<Pattern>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn render(&self, expr: Expr<Criterion>) -> Expr<Pattern> {
        match expr {
            Expr::Leaf(criterion) => pattern_expr(criterion),
            Expr::AllOf(exprs) => Expr::AllOf(exprs.into_iter().map(|e| self.render(e)).collect()),
            Expr::AnyOf(exprs) => Expr::AnyOf(exprs.into_iter().map(|e| self.render(e)).collect()),
        }
    }
}
