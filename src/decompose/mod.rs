//! Rewrites an expression DAG into a flat, ordered sequence of simple
//! definitions over intermediate variables `u_0, u_1, ...` (see
//! [`crate::taylor`] for the recurrences that consume this list).
//!
//! Every operand of a [`Definition`] is either a numeric constant or a
//! reference to a strictly earlier entry (`u_j`, `j < k`) — including plain
//! state-variable operands, which are given their own `Definition::Var`
//! entry the first time they are referenced so that every operand the
//! coefficient engine touches has a coefficient array to read from.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::{OdeError, OdeResult};
use crate::expr::{BinOp, Expr, ExprKind, FuncKind};

/// A reference to an operand of a [`Definition`]: either a numeric constant
/// folded in directly, or an index into the decomposition's definition list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// A constant known at decomposition time.
    Const(f64),
    /// `u_j` for `j` strictly less than the owning definition's index.
    U(usize),
}

/// The function kinds realized as a generic `Definition::Function`. `Pow` is
/// excluded: its exponent is always a numeric constant by construction, so it
/// is carried as a typed `f64` on `Definition::Pow` instead of as another
/// `Operand`, and this enum never needs a variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementaryFunc {
    /// `sin`.
    Sin,
    /// `cos`.
    Cos,
    /// `exp`.
    Exp,
    /// Natural log.
    Log,
    /// `sqrt`.
    Sqrt,
}

/// Maps the five function kinds realized as `Definition::Function` to their
/// `ElementaryFunc` tag; `None` for `FuncKind::Pow`, which is realized as
/// `Definition::Pow` instead.
fn elementary_func(kind: FuncKind) -> Option<ElementaryFunc> {
    match kind {
        FuncKind::Sin => Some(ElementaryFunc::Sin),
        FuncKind::Cos => Some(ElementaryFunc::Cos),
        FuncKind::Exp => Some(ElementaryFunc::Exp),
        FuncKind::Log => Some(ElementaryFunc::Log),
        FuncKind::Sqrt => Some(ElementaryFunc::Sqrt),
        FuncKind::Pow => None,
    }
}

/// One entry `u_k := def_k` of the decomposition.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    /// `u_k := c`.
    Number(f64),
    /// `u_k := v`, a user state (or otherwise free) variable.
    Var(String),
    /// `u_k := lhs op rhs`.
    BinaryOp(BinOp, Operand, Operand),
    /// `u_k := f(args...)` for every function kind but `pow`.
    Function(ElementaryFunc, Vec<Operand>),
    /// `u_k := base^alpha`, `alpha` a compile-time-known constant.
    Pow {
        /// The base operand.
        base: Operand,
        /// The (always numeric) exponent.
        alpha: f64,
    },
}

/// The ordered list `U` plus the bookkeeping the stepper needs: which entries
/// are the state variables, and which are the `m` equations-of-motion that
/// define their derivatives.
#[derive(Debug, Clone)]
pub struct Decomposition {
    defs: Vec<Definition>,
    /// `state_index[k]` is the `U` index of the `Definition::Var` entry for
    /// the `k`-th state variable, in the user-given order.
    state_index: Vec<usize>,
    /// `rhs_index[k]` is the `U` index of the definition computing the
    /// derivative of the `k`-th state variable.
    rhs_index: Vec<usize>,
    /// Names of the state variables, in the user-given order.
    state_names: Vec<String>,
    /// Reverse of `state_index`: a state variable's own `U` index -> its
    /// position `k` among the state variables.
    state_position: FxHashMap<usize, usize>,
}

impl Decomposition {
    /// The ordered definition list.
    #[must_use]
    pub fn defs(&self) -> &[Definition] {
        &self.defs
    }

    /// Number of entries in `U`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// `true` when the decomposition has no entries (never true for a
    /// successfully built decomposition, since `sys` must be non-empty).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Number of state variables `m`.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.state_names.len()
    }

    /// The `U` index holding the `k`-th state variable's own value.
    #[must_use]
    pub fn state_index(&self, k: usize) -> usize {
        self.state_index[k]
    }

    /// The `U` index computing the derivative (right-hand side) of the
    /// `k`-th state variable.
    #[must_use]
    pub fn rhs_index(&self, k: usize) -> usize {
        self.rhs_index[k]
    }

    /// Names of the state variables, in declared order.
    #[must_use]
    pub fn state_names(&self) -> &[String] {
        &self.state_names
    }

    /// The position `k` of the state variable whose own `U` index is
    /// `u_idx`. Panics if `u_idx` is not a state variable's definition.
    ///
    /// # Panics
    /// Panics if `u_idx` does not name a `Definition::Var` entry for one of
    /// the declared state variables; every `Definition::Var` in a
    /// successfully built decomposition corresponds to exactly one state
    /// variable, so this cannot occur in ordinary use.
    #[must_use]
    pub fn state_position(&self, u_idx: usize) -> usize {
        self.state_position[&u_idx]
    }
}

struct Builder {
    defs: Vec<Definition>,
    cache: FxHashMap<Expr, Operand>,
    var_index: FxHashMap<String, usize>,
}

impl Builder {
    fn new() -> Self {
        Self {
            defs: Vec::new(),
            cache: FxHashMap::default(),
            var_index: FxHashMap::default(),
        }
    }

    fn push(&mut self, def: Definition) -> usize {
        let idx = self.defs.len();
        self.defs.push(def);
        idx
    }

    /// Processes a non-root expression, returning an [`Operand`] reference to
    /// it. Identical subexpressions (by structural `Expr` equality) share one
    /// entry; this is the optional common-subexpression merging the design
    /// permits, and it preserves the strictly-less-index invariant because a
    /// cache hit can only return an index created before the current call.
    fn operand_for(&mut self, e: &Expr) -> OdeResult<Operand> {
        match &**e {
            ExprKind::Number(n) => Ok(Operand::Const(*n)),
            ExprKind::Variable(name) => {
                if let Some(&idx) = self.var_index.get(name) {
                    return Ok(Operand::U(idx));
                }
                let idx = self.push(Definition::Var(name.clone()));
                self.var_index.insert(name.clone(), idx);
                Ok(Operand::U(idx))
            }
            ExprKind::BinaryOp(..) | ExprKind::Function(..) => {
                if let Some(&op) = self.cache.get(e) {
                    return Ok(op);
                }
                let idx = self.push_inner(e)?;
                let op = Operand::U(idx);
                self.cache.insert(e.clone(), op);
                Ok(op)
            }
        }
    }

    fn push_inner(&mut self, e: &Expr) -> OdeResult<usize> {
        match &**e {
            ExprKind::BinaryOp(op, lhs, rhs) => {
                let l = self.operand_for(lhs)?;
                let r = self.operand_for(rhs)?;
                Ok(self.push(Definition::BinaryOp(*op, l, r)))
            }
            ExprKind::Function(kind, args) => self.push_function(*kind, args),
            ExprKind::Number(n) => Ok(self.push(Definition::Number(*n))),
            ExprKind::Variable(name) => Ok(self.push(Definition::Var(name.clone()))),
        }
    }

    /// Shared by `push_inner` and `push_equation_root`: `pow` is realized as
    /// `Definition::Pow` with its exponent read directly as `f64`, everything
    /// else as `Definition::Function`.
    fn push_function(&mut self, kind: FuncKind, args: &[Expr]) -> OdeResult<usize> {
        if let Some(elem) = elementary_func(kind) {
            let operands = args
                .iter()
                .map(|a| self.operand_for(a))
                .collect::<OdeResult<Vec<_>>>()?;
            return Ok(self.push(Definition::Function(elem, operands)));
        }
        let ExprKind::Number(alpha) = &*args[1] else {
            return Err(OdeError::NonNumericExponent);
        };
        let base = self.operand_for(&args[0])?;
        Ok(self.push(Definition::Pow { base, alpha: *alpha }))
    }

    /// Processes the root of one equation's right-hand side. Unlike
    /// `operand_for`, this always appends a fresh definition (never reads the
    /// cache) so that the final `m` entries of `U` are exactly the `m`
    /// equations, in the user-given order, as the decomposer's contract
    /// requires.
    fn push_equation_root(&mut self, e: &Expr) -> OdeResult<usize> {
        match &**e {
            ExprKind::Number(n) => Ok(self.push(Definition::Number(*n))),
            ExprKind::Variable(name) => {
                if let Some(&idx) = self.var_index.get(name) {
                    return Ok(idx);
                }
                let idx = self.push(Definition::Var(name.clone()));
                self.var_index.insert(name.clone(), idx);
                Ok(idx)
            }
            ExprKind::BinaryOp(op, lhs, rhs) => {
                let l = self.operand_for(lhs)?;
                let r = self.operand_for(rhs)?;
                Ok(self.push(Definition::BinaryOp(*op, l, r)))
            }
            ExprKind::Function(kind, args) => self.push_function(*kind, args),
        }
    }
}

/// Builds the `u`-decomposition of a system of ODEs.
///
/// `sys[k]` is the right-hand side of the equation of motion for
/// `state_vars[k]`; the two slices must have equal, non-zero length and the
/// set of free variables across `sys` must equal the set of names in
/// `state_vars`.
pub fn decompose(sys: &[Expr], state_vars: &[String]) -> OdeResult<Decomposition> {
    if sys.is_empty() {
        return Err(OdeError::EmptySystem);
    }
    check_free_variables(sys, state_vars)?;

    let mut builder = Builder::new();

    // Pre-register every state variable so state_index() is always
    // available even for a variable that happens to be referenced only as
    // the bare RHS of its own equation (processed via push_equation_root,
    // which does not consult var_index).
    for name in state_vars {
        if !builder.var_index.contains_key(name) {
            let idx = builder.push(Definition::Var(name.clone()));
            builder.var_index.insert(name.clone(), idx);
        }
    }

    let mut rhs_index = Vec::with_capacity(sys.len());
    for rhs in sys {
        rhs_index.push(builder.push_equation_root(rhs)?);
    }

    let state_index: Vec<usize> = state_vars
        .iter()
        .map(|name| builder.var_index[name])
        .collect();
    let state_position: FxHashMap<usize, usize> = state_index
        .iter()
        .enumerate()
        .map(|(k, &idx)| (idx, k))
        .collect();

    debug!(
        entries = builder.defs.len(),
        states = state_vars.len(),
        "decomposed ODE system into u-list"
    );

    Ok(Decomposition {
        defs: builder.defs,
        state_index,
        rhs_index,
        state_names: state_vars.to_vec(),
        state_position,
    })
}

fn check_free_variables(sys: &[Expr], state_vars: &[String]) -> OdeResult<()> {
    let mut free: FxHashSet<String> = FxHashSet::default();
    for rhs in sys {
        free.extend(rhs.variables());
    }
    let declared: FxHashSet<String> = state_vars.iter().cloned().collect();

    let mut unbound: Vec<String> = free.difference(&declared).cloned().collect();
    let mut unused: Vec<String> = declared.difference(&free).cloned().collect();
    if unbound.is_empty() && unused.is_empty() {
        return Ok(());
    }
    unbound.sort();
    unused.sort();
    Err(OdeError::FreeVariableMismatch { unbound, unused })
}
