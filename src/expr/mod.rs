//! Immutable symbolic expression tree over a fixed algebra.
//!
//! This module defines:
//! - [`Expr`] - the central, reference-counted expression node
//! - [`ExprKind`] - the four variants of the algebra (`Number`, `Variable`, `BinaryOp`, `Function`)
//! - [`BinOp`] / [`FuncKind`] - the fixed operator and function tags
//!
//! # Architecture
//!
//! `Expr` wraps its payload in an `Arc` so cloning is a refcount bump rather
//! than a subtree copy; this is safe because expressions are immutable after
//! construction (structural sharing never becomes observable mutation). Each
//! node carries a pre-computed structural hash for O(1) equality rejection,
//! the same trick this codebase's N-ary expression type uses.
//!
//! Construction-time simplification is limited to the identities and numeric
//! folding below — nothing resembling collection, distribution or trig
//! identities lives here; see [`crate::decompose`] and [`crate::taylor`] for
//! what consumes the resulting tree.

mod analysis;
mod diff;
mod eval;
mod hash;
mod subs;
#[cfg(test)]
mod proptests;
#[cfg(test)]
pub(crate) mod test_support;

use std::ops::{Add, Deref, Mul, Sub};
use std::sync::Arc;

pub use analysis::get_variables;

use crate::error::{OdeError, OdeResult};

/// A single immutable symbolic expression.
///
/// Cloning an `Expr` is cheap (an `Arc` clone); the underlying tree is never
/// mutated after it is built; all transformations (`subs`, `diff`, renaming)
/// produce a new `Expr`.
#[derive(Debug, Clone)]
pub struct Expr {
    inner: Arc<ExprNode>,
}

#[derive(Debug)]
struct ExprNode {
    hash: u64,
    kind: ExprKind,
}

impl Deref for Expr {
    type Target = ExprKind;

    fn deref(&self) -> &Self::Target {
        &self.inner.kind
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.inner.hash == other.inner.hash && self.inner.kind == other.inner.kind
    }
}

impl Eq for Expr {}

impl std::hash::Hash for Expr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.hash.hash(state);
    }
}

/// The binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

/// The fixed set of elementary functions. `Pow` is the only binary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncKind {
    /// `sin(x)`
    Sin,
    /// `cos(x)`
    Cos,
    /// `exp(x)`
    Exp,
    /// natural logarithm `log(x)`
    Log,
    /// `sqrt(x)`
    Sqrt,
    /// `x^y`
    Pow,
}

impl FuncKind {
    /// Number of arguments this function takes.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            FuncKind::Pow => 2,
            _ => 1,
        }
    }
}

/// The four-variant algebra every operation in this module is total over.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A numeric literal. Signed zero is canonicalized to `+0.0` at construction.
    Number(f64),
    /// A named leaf. Names starting with `u_` are reserved for the decomposer.
    Variable(String),
    /// `lhs op rhs`.
    BinaryOp(BinOp, Expr, Expr),
    /// `f(args...)`, `args.len() == f.arity()`.
    Function(FuncKind, Vec<Expr>),
}

fn make_hash(kind: &ExprKind) -> u64 {
    hash::compute_expr_hash(kind)
}

fn node(kind: ExprKind) -> Expr {
    let hash = make_hash(&kind);
    Expr {
        inner: Arc::new(ExprNode { hash, kind }),
    }
}

/// `true` if `name` is reserved for decomposition temporaries.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with("u_")
}

fn is_number(e: &Expr, value: f64) -> bool {
    matches!(&e.inner.kind, ExprKind::Number(n) if *n == value)
}

fn canonicalize_zero(x: f64) -> f64 {
    if x == 0.0 { 0.0 } else { x }
}

impl Expr {
    /// Build a numeric literal. `-0.0` canonicalizes to `0.0`.
    #[must_use]
    pub fn num(x: f64) -> Expr {
        node(ExprKind::Number(canonicalize_zero(x)))
    }

    /// Build a user-facing variable. Rejects names reserved for decomposition
    /// (the `u_` prefix).
    pub fn var(name: impl Into<String>) -> OdeResult<Expr> {
        let name = name.into();
        if is_reserved_name(&name) {
            return Err(OdeError::ReservedVariableName { name });
        }
        Ok(node(ExprKind::Variable(name)))
    }

    /// Build a variable without the reserved-name check. Used internally by
    /// the decomposer to mint `u_k` references; not exposed outside the crate.
    pub(crate) fn var_unchecked(name: impl Into<String>) -> Expr {
        node(ExprKind::Variable(name.into()))
    }

    /// Build a function call, validating arity and folding a numeric `Pow`
    /// when both operands are literals.
    pub fn call(kind: FuncKind, args: Vec<Expr>) -> OdeResult<Expr> {
        if args.len() != kind.arity() {
            return Err(OdeError::ArityMismatch {
                expected: kind.arity(),
                got: args.len(),
            });
        }
        if kind == FuncKind::Pow {
            if let (ExprKind::Number(b), ExprKind::Number(e)) = (&*args[0], &*args[1]) {
                return Ok(Expr::num(b.powf(*e)));
            }
        }
        Ok(node(ExprKind::Function(kind, args)))
    }

    /// `self + rhs`, applying the `0+x`/`x+0` identities and numeric folding.
    #[must_use]
    pub fn add(self, rhs: Expr) -> Expr {
        build_binary_unchecked(BinOp::Add, self, rhs)
    }

    /// `self - rhs`, applying the `0-x -> -x`/`x-0` identities and numeric folding.
    #[must_use]
    pub fn sub(self, rhs: Expr) -> Expr {
        build_binary_unchecked(BinOp::Sub, self, rhs)
    }

    /// `self * rhs`, applying the `0*x`/`x*0`/`1*x`/`x*1` identities and numeric folding.
    #[must_use]
    pub fn mul(self, rhs: Expr) -> Expr {
        build_binary_unchecked(BinOp::Mul, self, rhs)
    }

    /// `self / rhs`. Division by the numeric literal zero is a construction
    /// error; otherwise applies the `x/1`, `x/(-1) -> -x` and `x/c -> x*(1/c)`
    /// identities and numeric folding.
    pub fn div(self, rhs: Expr) -> OdeResult<Expr> {
        if is_number(&rhs, 0.0) {
            return Err(OdeError::DivisionByZeroLiteral);
        }
        Ok(build_binary_unchecked(BinOp::Div, self, rhs))
    }

    /// `-self`, represented per the source convention as `(-1) * self`.
    #[must_use]
    pub fn neg(self) -> Expr {
        negate(self)
    }

    /// The set of free variable names, sorted and deduplicated.
    #[must_use]
    pub fn variables(&self) -> Vec<String> {
        get_variables(self)
    }

    /// Rename variables in place according to `map`; names absent from `map`
    /// are left unchanged.
    pub fn rename_variables(&mut self, map: &std::collections::HashMap<String, String>) {
        *self = analysis::rename_variables(self, map);
    }

    /// Replace variables by expressions via deep, capture-agnostic rewriting.
    #[must_use]
    pub fn subs(&self, map: &std::collections::HashMap<String, Expr>) -> Expr {
        subs::subs(self, map)
    }

    /// Symbolic derivative with respect to the variable named `var`.
    #[must_use]
    pub fn diff(&self, var: &str) -> Expr {
        diff::diff(self, var)
    }

    /// Evaluate on a name -> value environment. Fails if a variable is unbound
    /// or if a runtime domain violation occurs (e.g. `log` of a non-positive
    /// value) — this is the symbolic-layer sibling of the stepper's
    /// `NaNDetected` outcome, surfaced as a `Result` since there is no lane to
    /// report a per-lane outcome to here.
    pub fn eval_dbl(&self, env: &std::collections::HashMap<String, f64>) -> OdeResult<f64> {
        eval::eval_dbl_checked(self, env)
    }

    /// The precomputed structural hash backing this expression's `Eq`/`Hash`
    /// impls. Not part of the public API; exposed crate-internally for the
    /// hash-consistency property test.
    #[cfg(test)]
    pub(crate) fn hash_value(&self) -> u64 {
        self.inner.hash
    }
}

pub(crate) fn build_binary_unchecked(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    use ExprKind::Number;

    if let (Number(a), Number(b)) = (&*lhs, &*rhs) {
        let folded = match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
        };
        return Expr::num(folded);
    }

    match op {
        BinOp::Add => {
            if is_number(&lhs, 0.0) {
                return rhs;
            }
            if is_number(&rhs, 0.0) {
                return lhs;
            }
        }
        BinOp::Sub => {
            if is_number(&lhs, 0.0) {
                return negate(rhs);
            }
            if is_number(&rhs, 0.0) {
                return lhs;
            }
        }
        BinOp::Mul => {
            if is_number(&lhs, 0.0) || is_number(&rhs, 0.0) {
                return Expr::num(0.0);
            }
            if is_number(&lhs, 1.0) {
                return rhs;
            }
            if is_number(&rhs, 1.0) {
                return lhs;
            }
        }
        BinOp::Div => {
            if is_number(&rhs, 1.0) {
                return lhs;
            }
            if is_number(&rhs, -1.0) {
                return negate(lhs);
            }
            if let ExprKind::Number(c) = &*rhs {
                let inv = Expr::num(1.0 / c);
                return build_binary_unchecked(BinOp::Mul, lhs, inv);
            }
        }
    }

    node(ExprKind::BinaryOp(op, lhs, rhs))
}

pub(crate) fn negate(e: Expr) -> Expr {
    build_binary_unchecked(BinOp::Mul, Expr::num(-1.0), e)
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::add(self, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::sub(self, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::mul(self, rhs)
    }
}
