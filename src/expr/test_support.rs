//! Shared `quickcheck` generator for the expression algebra, used by the
//! property tests in this module and by the decomposition-soundness
//! property in [`crate::decompose`].
//!
//! The generator sticks to the domain-safe subset of the algebra (`+ − ×`,
//! `sin`, `cos`) over a fixed three-variable pool; `/`, `log`, `sqrt` and
//! `pow` are exercised by the targeted unit tests in `diff.rs`/`eval.rs`
//! instead, since a random tree over them would need to dodge division by
//! zero and negative `log`/`sqrt` arguments to stay evaluable everywhere.

use std::collections::HashMap;

use quickcheck::{Arbitrary, Gen};

use super::{Expr, FuncKind};

/// The fixed variable pool arbitrary expressions are built over. `"w"` is
/// deliberately never a member, so it is always free to use as a
/// provably-absent variable in differentiation properties.
pub(crate) const VAR_POOL: [&str; 3] = ["x", "y", "z"];

const MAX_DEPTH: u32 = 4;

/// An arbitrary, bounded-depth [`Expr`] over [`VAR_POOL`] and `{+ − × sin cos}`.
#[derive(Debug, Clone)]
pub(crate) struct Small(pub(crate) Expr);

impl Arbitrary for Small {
    fn arbitrary(g: &mut Gen) -> Self {
        Small(gen_leaf_or_node(g, MAX_DEPTH))
    }
}

fn gen_leaf(g: &mut Gen) -> Expr {
    if bool::arbitrary(g) {
        Expr::num(f64::from(i32::arbitrary(g) % 20))
    } else {
        let name = g.choose(&VAR_POOL).expect("VAR_POOL is non-empty");
        Expr::var(*name).expect("VAR_POOL names are never reserved")
    }
}

fn gen_leaf_or_node(g: &mut Gen, depth: u32) -> Expr {
    if depth == 0 || bool::arbitrary(g) {
        return gen_leaf(g);
    }
    match u32::arbitrary(g) % 5 {
        0 => gen_leaf_or_node(g, depth - 1).add(gen_leaf_or_node(g, depth - 1)),
        1 => gen_leaf_or_node(g, depth - 1).sub(gen_leaf_or_node(g, depth - 1)),
        2 => gen_leaf_or_node(g, depth - 1).mul(gen_leaf_or_node(g, depth - 1)),
        3 => {
            let arg = gen_leaf_or_node(g, depth - 1);
            Expr::call(FuncKind::Sin, vec![arg]).expect("Sin has fixed arity 1")
        }
        _ => {
            let arg = gen_leaf_or_node(g, depth - 1);
            Expr::call(FuncKind::Cos, vec![arg]).expect("Cos has fixed arity 1")
        }
    }
}

/// A fixed, domain-safe environment binding every name in [`VAR_POOL`].
pub(crate) fn sample_env() -> HashMap<String, f64> {
    HashMap::from([
        ("x".to_string(), 1.3),
        ("y".to_string(), -0.7),
        ("z".to_string(), 2.1),
    ])
}

/// A byte-driven cursor producing a deterministic [`Expr`] from a byte
/// string: two calls on the same bytes produce `==` expressions, which is
/// what the hash-consistency property needs (quickcheck's own `Gen` is not
/// guaranteed to replay identically across two separate `arbitrary` calls).
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn next_u8(&mut self) -> u8 {
        if self.bytes.is_empty() {
            return 0;
        }
        let b = self.bytes[self.pos % self.bytes.len()];
        self.pos += 1;
        b
    }
}

/// Deterministically builds an [`Expr`] from `bytes`; identical input always
/// produces a structurally `==` expression.
pub(crate) fn build_from_bytes(bytes: &[u8]) -> Expr {
    let mut cursor = Cursor { bytes, pos: 0 };
    build(&mut cursor, MAX_DEPTH)
}

fn build(cursor: &mut Cursor<'_>, depth: u32) -> Expr {
    if depth == 0 || cursor.next_u8() % 3 == 0 {
        return if cursor.next_u8() % 2 == 0 {
            Expr::num(f64::from(cursor.next_u8() % 20))
        } else {
            let name = VAR_POOL[cursor.next_u8() as usize % VAR_POOL.len()];
            Expr::var(name).expect("VAR_POOL names are never reserved")
        };
    }
    match cursor.next_u8() % 5 {
        0 => build(cursor, depth - 1).add(build(cursor, depth - 1)),
        1 => build(cursor, depth - 1).sub(build(cursor, depth - 1)),
        2 => build(cursor, depth - 1).mul(build(cursor, depth - 1)),
        3 => {
            let arg = build(cursor, depth - 1);
            Expr::call(FuncKind::Sin, vec![arg]).expect("Sin has fixed arity 1")
        }
        _ => {
            let arg = build(cursor, depth - 1);
            Expr::call(FuncKind::Cos, vec![arg]).expect("Cos has fixed arity 1")
        }
    }
}
