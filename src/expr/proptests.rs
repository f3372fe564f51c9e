//! Property tests for the algebraic invariants: differentiation of an
//! absent variable, linearity of `diff` over `e+e`, substitution
//! round-tripping through a variable swap, and hash/equality consistency.

use quickcheck_macros::quickcheck;

use super::test_support::{Small, build_from_bytes, sample_env, VAR_POOL};
use super::Expr;

#[quickcheck]
fn diff_of_a_variable_absent_from_e_is_zero(e: Small) -> bool {
    // "w" is never a member of VAR_POOL, so it never appears free in `e`.
    e.0.diff("w") == Expr::num(0.0)
}

#[quickcheck]
fn diff_of_sum_with_itself_doubles_numerically(e: Small) -> bool {
    let env = sample_env();
    VAR_POOL.iter().all(|&v| {
        let lhs = e.0.clone().add(e.0.clone()).diff(v);
        let rhs = Expr::num(2.0).mul(e.0.diff(v));
        let l = lhs.eval_dbl(&env).expect("generator stays domain-safe");
        let r = rhs.eval_dbl(&env).expect("generator stays domain-safe");
        (l - r).abs() < 1e-9
    })
}

#[quickcheck]
fn subs_round_trips_through_a_variable_swap(e: Small) -> bool {
    let x = Expr::var("x").expect("valid name");
    let y = Expr::var("y").expect("valid name");

    let mut fwd = std::collections::HashMap::new();
    fwd.insert("x".to_string(), y.clone());
    fwd.insert("y".to_string(), x.clone());
    let swapped = e.0.subs(&fwd);

    let mut back = std::collections::HashMap::new();
    back.insert("x".to_string(), y);
    back.insert("y".to_string(), x);
    let restored = swapped.subs(&back);

    restored == e.0
}

#[quickcheck]
fn equal_expressions_hash_equally(bytes: Vec<u8>) -> bool {
    let e1 = build_from_bytes(&bytes);
    let e2 = build_from_bytes(&bytes);
    e1 == e2 && e1.hash_value() == e2.hash_value()
}
