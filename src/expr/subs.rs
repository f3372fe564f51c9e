//! Deep, capture-agnostic substitution of variables by expressions.

use std::collections::HashMap;

use super::{Expr, ExprKind};

/// Replaces every `Variable(name)` present in `map` by its image expression,
/// rewriting bottom-up so the arithmetic constructors re-simplify the result.
#[must_use]
pub fn subs(e: &Expr, map: &HashMap<String, Expr>) -> Expr {
    match &**e {
        ExprKind::Number(_) => e.clone(),
        ExprKind::Variable(name) => map.get(name).map_or_else(|| e.clone(), Clone::clone),
        ExprKind::BinaryOp(op, lhs, rhs) => {
            let lhs = subs(lhs, map);
            let rhs = subs(rhs, map);
            super::build_binary_unchecked(*op, lhs, rhs)
        }
        ExprKind::Function(kind, args) => {
            let args: Vec<Expr> = args.iter().map(|a| subs(a, map)).collect();
            // Substitution never changes an argument count, so arity cannot mismatch.
            Expr::call(*kind, args).unwrap_or_else(|_| e.clone())
        }
    }
}
