//! The Taylor coefficient engine: per-definition recurrences that turn the
//! coefficients already known for a definition's operands (and, for a few
//! kinds, its own lower orders) into its own next coefficient.
//!
//! [`CoeffBuffer`] is the two-dimensional (three, counting the batch lane
//! axis) array `a[i][n][lane]`; it is allocated once per
//! [`crate::stepper::Stepper`] and reused across steps, so no allocation
//! happens on [`Engine::seed_order0`]/[`Engine::compute_order`]'s hot path.
//! [`Engine`] carries the small amount of bookkeeping
//! (`Definition::Var` needs to know which `u` index computes its equation's
//! right-hand side) the recurrences below depend on.

use rustc_hash::FxHashMap;

use crate::decompose::{Decomposition, Definition, ElementaryFunc, Operand};
use crate::expr::BinOp;
use crate::scalar::Scalar;

/// Coefficient storage `a[i][n][lane]`, plus a same-shaped auxiliary array
/// used only by paired `sin`/`cos` definitions to hold the companion series
/// the recurrence needs but that isn't itself a named `u_k`.
pub struct CoeffBuffer<F: Scalar> {
    order: usize,
    batch: usize,
    n_defs: usize,
    data: Vec<F>,
    aux: Vec<F>,
}

impl<F: Scalar> CoeffBuffer<F> {
    /// Allocates a buffer for `n_defs` definitions, Taylor order `order`
    /// (columns `0..=order`), and `batch` independent lanes. This is the
    /// crate's one per-system heap allocation; [`Engine`] never allocates
    /// again.
    #[must_use]
    pub fn new(n_defs: usize, order: usize, batch: usize) -> Self {
        let len = n_defs * (order + 1) * batch;
        Self {
            order,
            batch,
            n_defs,
            data: vec![F::ZERO; len],
            aux: vec![F::ZERO; len],
        }
    }

    /// Taylor order `p` this buffer was sized for.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Batch width `B`.
    #[must_use]
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Number of definitions `|U|`.
    #[must_use]
    pub fn n_defs(&self) -> usize {
        self.n_defs
    }

    #[inline]
    fn idx(&self, i: usize, n: usize, lane: usize) -> usize {
        (i * (self.order + 1) + n) * self.batch + lane
    }

    /// Reads `a[i][n]` for `lane`.
    #[must_use]
    pub fn get(&self, i: usize, n: usize, lane: usize) -> F {
        self.data[self.idx(i, n, lane)]
    }

    /// Writes `a[i][n]` for `lane`.
    pub fn set(&mut self, i: usize, n: usize, lane: usize, value: F) {
        let idx = self.idx(i, n, lane);
        self.data[idx] = value;
    }

    fn get_aux(&self, i: usize, n: usize, lane: usize) -> F {
        self.aux[self.idx(i, n, lane)]
    }

    fn set_aux(&mut self, i: usize, n: usize, lane: usize, value: F) {
        let idx = self.idx(i, n, lane);
        self.aux[idx] = value;
    }
}

fn operand_value<F: Scalar>(op: Operand, buf: &CoeffBuffer<F>, n: usize, lane: usize) -> F {
    match op {
        Operand::Const(c) => {
            if n == 0 {
                F::from_f64(c)
            } else {
                F::ZERO
            }
        }
        Operand::U(idx) => buf.get(idx, n, lane),
    }
}

/// Drives the per-definition recurrences over a [`Decomposition`].
pub struct Engine {
    /// State variable's own `u` index -> the `u` index of its equation's
    /// right-hand side.
    rhs_for_state: FxHashMap<usize, usize>,
}

impl Engine {
    /// Builds the bookkeeping for `decomp`.
    #[must_use]
    pub fn new(decomp: &Decomposition) -> Self {
        let mut rhs_for_state = FxHashMap::default();
        for k in 0..decomp.state_count() {
            rhs_for_state.insert(decomp.state_index(k), decomp.rhs_index(k));
        }
        Self { rhs_for_state }
    }

    /// Seeds `a[i][0]` for every definition: state variables read the
    /// current state (`state[k * batch + lane]`, the row-major batch
    /// layout), numeric constants take their literal, and every other
    /// definition evaluates its order-0 closed form from its operands'
    /// (already-seeded) order-0 coefficients.
    ///
    /// `lane_failed[lane]` is set (never cleared) when a domain violation is
    /// observed for that lane; already-failed lanes are skipped.
    pub fn seed_order0<F: Scalar>(
        &self,
        decomp: &Decomposition,
        buf: &mut CoeffBuffer<F>,
        state: &[F],
        lane_failed: &mut [bool],
    ) {
        let batch = buf.batch();
        for (i, def) in decomp.defs().iter().enumerate() {
            for lane in 0..batch {
                if lane_failed[lane] {
                    continue;
                }
                match def {
                    Definition::Number(c) => buf.set(i, 0, lane, F::from_f64(*c)),
                    Definition::Var(_) => {
                        let k = decomp.state_position(i);
                        buf.set(i, 0, lane, state[k * batch + lane]);
                    }
                    Definition::BinaryOp(op, l, r) => {
                        let lv = operand_value(*l, buf, 0, lane);
                        let rv = operand_value(*r, buf, 0, lane);
                        if *op == BinOp::Div && rv == F::ZERO {
                            lane_failed[lane] = true;
                            continue;
                        }
                        buf.set(i, 0, lane, apply_binary(*op, lv, rv));
                    }
                    Definition::Function(kind, args) => {
                        match function_order0(*kind, args, buf, lane) {
                            Ok((value, companion)) => {
                                buf.set(i, 0, lane, value);
                                if let Some(c) = companion {
                                    buf.set_aux(i, 0, lane, c);
                                }
                            }
                            Err(()) => lane_failed[lane] = true,
                        }
                    }
                    Definition::Pow { base, alpha } => match pow_order0(*base, *alpha, buf, lane) {
                        Ok(value) => buf.set(i, 0, lane, value),
                        Err(()) => lane_failed[lane] = true,
                    },
                }
            }
        }
    }

    /// Computes `a[i][n]` for every definition, `n >= 1`, in decomposition
    /// order (so every operand's coefficient at this or an earlier order,
    /// and this definition's own lower orders, are already available). Must
    /// be called for `n = 1, 2, ..., order` in sequence.
    pub fn compute_order<F: Scalar>(
        &self,
        decomp: &Decomposition,
        buf: &mut CoeffBuffer<F>,
        n: usize,
        lane_failed: &mut [bool],
    ) {
        let batch = buf.batch();
        for (i, def) in decomp.defs().iter().enumerate() {
            for lane in 0..batch {
                if lane_failed[lane] {
                    continue;
                }
                match def {
                    Definition::Number(_) => buf.set(i, n, lane, F::ZERO),
                    Definition::Var(_) => {
                        let rhs = self.rhs_for_state[&i];
                        let value = buf.get(rhs, n - 1, lane) / F::from_f64(n as f64);
                        buf.set(i, n, lane, value);
                    }
                    Definition::BinaryOp(op, l, r) => {
                        match binary_order_n(*op, *l, *r, buf, i, n, lane) {
                            Ok(value) => buf.set(i, n, lane, value),
                            Err(()) => lane_failed[lane] = true,
                        }
                    }
                    Definition::Function(kind, args) => {
                        match function_order_n(*kind, args, buf, i, n, lane) {
                            Ok((value, companion)) => {
                                buf.set(i, n, lane, value);
                                if let Some(c) = companion {
                                    buf.set_aux(i, n, lane, c);
                                }
                            }
                            Err(()) => lane_failed[lane] = true,
                        }
                    }
                    Definition::Pow { base, alpha } => {
                        match pow_order_n(*base, *alpha, buf, i, n, lane) {
                            Ok(value) => buf.set(i, n, lane, value),
                            Err(()) => lane_failed[lane] = true,
                        }
                    }
                }
            }
        }
    }
}

fn apply_binary<F: Scalar>(op: BinOp, l: F, r: F) -> F {
    match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => l / r,
    }
}

/// Returns `(a[0], Some(companion[0]))` for `sin`/`cos`, `(a[0], None)` for
/// everything else.
fn function_order0<F: Scalar>(
    kind: ElementaryFunc,
    args: &[Operand],
    buf: &CoeffBuffer<F>,
    lane: usize,
) -> Result<(F, Option<F>), ()> {
    let b0 = operand_value(args[0], buf, 0, lane);
    match kind {
        ElementaryFunc::Sin => Ok((b0.sin(), Some(b0.cos()))),
        ElementaryFunc::Cos => Ok((b0.cos(), Some(b0.sin()))),
        ElementaryFunc::Exp => Ok((b0.exp(), None)),
        ElementaryFunc::Log => {
            if b0 > F::ZERO {
                Ok((b0.ln(), None))
            } else {
                Err(())
            }
        }
        ElementaryFunc::Sqrt => {
            if b0 >= F::ZERO {
                Ok((b0.sqrt(), None))
            } else {
                Err(())
            }
        }
    }
}

/// Order-0 coefficient of `base^alpha`.
fn pow_order0<F: Scalar>(base: Operand, alpha: f64, buf: &CoeffBuffer<F>, lane: usize) -> Result<F, ()> {
    let b0 = operand_value(base, buf, 0, lane);
    if b0 == F::ZERO && alpha < 0.0 {
        return Err(());
    }
    if b0 < F::ZERO && alpha.fract() != 0.0 {
        return Err(());
    }
    Ok(b0.powf(F::from_f64(alpha)))
}

fn binary_order_n<F: Scalar>(
    op: BinOp,
    l: Operand,
    r: Operand,
    buf: &mut CoeffBuffer<F>,
    i: usize,
    n: usize,
    lane: usize,
) -> Result<F, ()> {
    match op {
        BinOp::Add => Ok(operand_value(l, buf, n, lane) + operand_value(r, buf, n, lane)),
        BinOp::Sub => Ok(operand_value(l, buf, n, lane) - operand_value(r, buf, n, lane)),
        BinOp::Mul => {
            let mut sum = F::ZERO;
            for j in 0..=n {
                let b = operand_value(l, buf, n - j, lane);
                let c = operand_value(r, buf, j, lane);
                sum = sum + b * c;
            }
            Ok(sum)
        }
        BinOp::Div => {
            let c0 = operand_value(r, buf, 0, lane);
            if c0 == F::ZERO {
                return Err(());
            }
            // a[n] = (b[n] - sum_{j=1..n} a[n-j] c[j]) / c[0], where `a`
            // refers to this definition's own, already-computed lower orders.
            let mut sum = operand_value(l, buf, n, lane);
            for j in 1..=n {
                let a_prev = buf.get(i, n - j, lane);
                let cj = operand_value(r, buf, j, lane);
                sum = sum - a_prev * cj;
            }
            Ok(sum / c0)
        }
    }
}

/// Returns `(a[n], Some(companion[n]))` for `sin`/`cos`, `(a[n], None)`
/// otherwise.
fn function_order_n<F: Scalar>(
    kind: ElementaryFunc,
    args: &[Operand],
    buf: &mut CoeffBuffer<F>,
    i: usize,
    n: usize,
    lane: usize,
) -> Result<(F, Option<F>), ()> {
    let b = args[0];
    match kind {
        ElementaryFunc::Exp => {
            // a[n] = sum_{j=1..n} (j/n) b[j] a[n-j]
            let mut sum = F::ZERO;
            for j in 1..=n {
                let bj = operand_value(b, buf, j, lane);
                let a_prev = buf.get(i, n - j, lane);
                sum = sum + F::from_f64(j as f64 / n as f64) * bj * a_prev;
            }
            Ok((sum, None))
        }
        ElementaryFunc::Log => {
            let b0 = operand_value(b, buf, 0, lane);
            let bn = operand_value(b, buf, n, lane);
            let mut sum = F::ZERO;
            for j in 1..n {
                let aj = buf.get(i, j, lane);
                let bnj = operand_value(b, buf, n - j, lane);
                sum = sum + F::from_f64(j as f64) * aj * bnj;
            }
            let value = (bn - sum / F::from_f64(n as f64)) / b0;
            Ok((value, None))
        }
        ElementaryFunc::Sqrt => {
            let a0 = buf.get(i, 0, lane);
            if a0 == F::ZERO {
                return Err(());
            }
            let bn = operand_value(b, buf, n, lane);
            let mut sum = F::ZERO;
            for j in 1..n {
                sum = sum + buf.get(i, j, lane) * buf.get(i, n - j, lane);
            }
            let value = (bn - sum) / (F::from_f64(2.0) * a0);
            Ok((value, None))
        }
        ElementaryFunc::Sin => Ok(trig_order_n(TrigKind::Sin, b, buf, i, n, lane)),
        ElementaryFunc::Cos => Ok(trig_order_n(TrigKind::Cos, b, buf, i, n, lane)),
    }
}

/// Order-`n` (`n >= 1`) coefficient of `base^alpha`.
fn pow_order_n<F: Scalar>(
    base: Operand,
    alpha: f64,
    buf: &mut CoeffBuffer<F>,
    i: usize,
    n: usize,
    lane: usize,
) -> Result<F, ()> {
    let b0 = operand_value(base, buf, 0, lane);
    if b0 == F::ZERO {
        return Err(());
    }
    let mut sum = F::ZERO;
    for j in 0..n {
        let aj = buf.get(i, j, lane);
        let bnj = operand_value(base, buf, n - j, lane);
        let coeff = alpha.mul_add((n - j) as f64, -(j as f64));
        sum = sum + F::from_f64(coeff) * aj * bnj;
    }
    Ok(sum / (F::from_f64(n as f64) * b0))
}

/// Which of the paired `sin`/`cos` series `trig_order_n` is solving for; kept
/// as its own two-variant enum (rather than reusing a function-kind type that
/// also names non-trig functions) so the recurrence's sign choice is an
/// exhaustive match with no catch-all arm.
enum TrigKind {
    Sin,
    Cos,
}

/// `sin_n = sum_{j=1..n} (j/n) b[j] cos_{n-j}`,
/// `cos_n = -sum_{j=1..n} (j/n) b[j] sin_{n-j}`, computed together: whichever
/// of the pair `kind` names is the primary (`u_k`-owning) series, the other
/// lives in the auxiliary array.
fn trig_order_n<F: Scalar>(
    kind: TrigKind,
    b: Operand,
    buf: &mut CoeffBuffer<F>,
    i: usize,
    n: usize,
    lane: usize,
) -> (F, Option<F>) {
    let mut primary = F::ZERO;
    let mut companion = F::ZERO;
    for j in 1..=n {
        let bj = operand_value(b, buf, j, lane);
        let weight = F::from_f64(j as f64 / n as f64);
        let primary_companion_prev = buf.get_aux(i, n - j, lane);
        let primary_self_prev = buf.get(i, n - j, lane);
        match kind {
            TrigKind::Sin => {
                primary = primary + weight * bj * primary_companion_prev;
                companion = companion - weight * bj * primary_self_prev;
            }
            TrigKind::Cos => {
                primary = primary - weight * bj * primary_companion_prev;
                companion = companion + weight * bj * primary_self_prev;
            }
        }
    }
    (primary, Some(companion))
}
