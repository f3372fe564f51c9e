//! Free-variable collection and renaming.

use std::collections::{BTreeSet, HashMap};

use super::{Expr, ExprKind};

/// Sorted, deduplicated list of the user variable names free in `e`.
#[must_use]
pub fn get_variables(e: &Expr) -> Vec<String> {
    let mut set = BTreeSet::new();
    collect_variables(e, &mut set);
    set.into_iter().collect()
}

fn collect_variables(e: &Expr, out: &mut BTreeSet<String>) {
    match &**e {
        ExprKind::Number(_) => {}
        ExprKind::Variable(name) => {
            out.insert(name.clone());
        }
        ExprKind::BinaryOp(_, lhs, rhs) => {
            collect_variables(lhs, out);
            collect_variables(rhs, out);
        }
        ExprKind::Function(_, args) => {
            for arg in args {
                collect_variables(arg, out);
            }
        }
    }
}

/// Rewrites `e`, replacing every `Variable(name)` present in `map` with its
/// image. Names absent from `map` are left unchanged.
#[must_use]
pub fn rename_variables(e: &Expr, map: &HashMap<String, String>) -> Expr {
    match &**e {
        ExprKind::Number(_) => e.clone(),
        ExprKind::Variable(name) => map.get(name).map_or_else(
            || e.clone(),
            |renamed| Expr::var_unchecked(renamed.clone()),
        ),
        ExprKind::BinaryOp(op, lhs, rhs) => {
            let lhs = rename_variables(lhs, map);
            let rhs = rename_variables(rhs, map);
            super::build_binary_unchecked(*op, lhs, rhs)
        }
        ExprKind::Function(kind, args) => {
            let args = args.iter().map(|a| rename_variables(a, map)).collect();
            // Argument shape cannot change under renaming, so this cannot fail.
            Expr::call(*kind, args).unwrap_or_else(|_| e.clone())
        }
    }
}
