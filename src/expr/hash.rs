//! Structural hash used for `Expr`'s O(1) equality fast-reject.

use super::{BinOp, ExprKind, FuncKind};

const SEED_NUMBER: u64 = 0x9E37_79B9_7F4A_7C15;
const SEED_VARIABLE: u64 = 0xC2B2_AE3D_27D4_EB4F;
const SEED_BINARY: u64 = 0x1656_67B1_9E37_79F9;
const SEED_FUNCTION: u64 = 0xFF51_AFD7_ED55_8CCD;

fn hash_str(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}

fn bin_op_tag(op: BinOp) -> u64 {
    match op {
        BinOp::Add => 0,
        BinOp::Sub => 1,
        BinOp::Mul => 2,
        BinOp::Div => 3,
    }
}

fn func_tag(kind: FuncKind) -> u64 {
    match kind {
        FuncKind::Sin => 0,
        FuncKind::Cos => 1,
        FuncKind::Exp => 2,
        FuncKind::Log => 3,
        FuncKind::Sqrt => 4,
        FuncKind::Pow => 5,
    }
}

/// Computes the structural hash of an `ExprKind`.
///
/// Binary operators use a commutative-insensitive sum of their operand
/// hashes: equal expressions still hash equally, which is all a hash needs
/// to guarantee — it isn't required to distinguish `a op b` from `b op a`,
/// and `Expr::eq` always falls back to a full structural comparison.
/// Function calls combine their argument hashes in order, since argument
/// order is semantically significant there (`pow(b, e) != pow(e, b)`).
pub(super) fn compute_expr_hash(kind: &ExprKind) -> u64 {
    match kind {
        ExprKind::Number(n) => SEED_NUMBER ^ n.to_bits(),
        ExprKind::Variable(name) => SEED_VARIABLE.wrapping_add(hash_str(name)),
        ExprKind::BinaryOp(op, lhs, rhs) => {
            let tag = SEED_BINARY.wrapping_mul(31).wrapping_add(bin_op_tag(*op));
            tag.wrapping_add(lhs.inner.hash).wrapping_add(rhs.inner.hash)
        }
        ExprKind::Function(kind, args) => {
            let mut h = SEED_FUNCTION.wrapping_mul(31).wrapping_add(func_tag(*kind));
            for arg in args {
                h = h.wrapping_mul(31).wrapping_add(arg.inner.hash);
            }
            h
        }
    }
}
