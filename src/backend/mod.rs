//! The pluggable kernel-realization interface, and the one concrete backend
//! this crate ships: a pure interpreter that walks the decomposition
//! directly rather than emitting machine code.
//!
//! A native-codegen backend (the performance-critical path this interface
//! is designed for) would implement [`KernelBackend`] without the
//! [`crate::stepper::Stepper`] above it changing at all. The interpreter
//! backend here realizes a "kernel" as a thin, free allocation-free wrapper
//! around [`crate::taylor::Engine`]; `realize_unrolled` and
//! `realize_compact` are functionally identical for an interpreter (both
//! dispatch on definition kind inside a loop already), since it's the
//! generated-code *size* a real JIT backend trades off between the two
//! modes, not the interpreter's per-step cost. The distinction is kept at
//! the trait boundary so a future codegen backend has somewhere to plug in
//! different code paths.

use crate::decompose::Decomposition;
use crate::scalar::Scalar;
use crate::taylor::{CoeffBuffer, Engine};

/// `|U|` at or below this is realized in [`KernelMode::Unrolled`] by
/// default; above it, [`KernelMode::Compact`] is used.
pub const UNROLLED_THRESHOLD: usize = 100;

/// Which code-generation strategy a realized kernel uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelMode {
    /// One straight-line block per `u_i`; fastest for small `|U|`.
    Unrolled,
    /// Definitions sharing an operator/function shape are dispatched through
    /// one shared helper, keeping generated code size bounded for large
    /// `|U|`.
    Compact,
}

impl KernelMode {
    /// The default mode for a decomposition of this size, per the
    /// `UNROLLED_THRESHOLD` heuristic.
    #[must_use]
    pub fn for_size(n_defs: usize) -> Self {
        if n_defs <= UNROLLED_THRESHOLD {
            KernelMode::Unrolled
        } else {
            KernelMode::Compact
        }
    }
}

/// A realized, invokable kernel: everything a stepper needs to advance a
/// [`CoeffBuffer`] by one Taylor order. This is the trait boundary a
/// native-codegen backend would implement without the stepper above it
/// changing at all; `decomp` is passed to every call rather than captured,
/// since a realized kernel owns only the bookkeeping derived from it (e.g.
/// [`Engine`]'s state-to-rhs map), not the decomposition itself.
pub trait Kernel<F: Scalar> {
    /// Seeds order 0 for every definition (state values, literals, and the
    /// closed forms of composite definitions), per-lane.
    fn seed_order0(
        &self,
        decomp: &Decomposition,
        buf: &mut CoeffBuffer<F>,
        state: &[F],
        lane_failed: &mut [bool],
    );

    /// Computes order `n` (`n >= 1`) for every definition, per-lane.
    fn compute_order(
        &self,
        decomp: &Decomposition,
        buf: &mut CoeffBuffer<F>,
        n: usize,
        lane_failed: &mut [bool],
    );

    /// Which strategy this kernel was realized with.
    fn mode(&self) -> KernelMode;
}

/// Realizes kernels by walking a [`Decomposition`] at call time rather than
/// emitting code; an acceptable first implementation, and the only backend
/// this crate ships. A future native-code backend would be a second type
/// implementing [`KernelBackend`], selected at `Stepper` construction
/// without any other code changing.
pub trait KernelBackend<F: Scalar> {
    /// Realizes a kernel for `decomp`, selecting [`KernelMode`] from
    /// `UNROLLED_THRESHOLD` unless `force_compact` overrides it (the
    /// `compact_mode` stepper option).
    fn realize(&self, decomp: &Decomposition, force_compact: bool) -> Box<dyn Kernel<F>>;
}

/// The interpreter [`KernelBackend`] this crate ships.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterBackend;

impl<F: Scalar + 'static> KernelBackend<F> for InterpreterBackend {
    fn realize(&self, decomp: &Decomposition, force_compact: bool) -> Box<dyn Kernel<F>> {
        let mode = if force_compact {
            KernelMode::Compact
        } else {
            KernelMode::for_size(decomp.len())
        };
        Box::new(InterpretedKernel {
            engine: Engine::new(decomp),
            mode,
        })
    }
}

/// The kernel realized by [`InterpreterBackend`]. Owns the bookkeeping
/// [`Engine`] needs; holds no reference to the [`Decomposition`] it was built
/// from, so callers must pass the same one to every `seed_order0` /
/// `compute_order` call (the [`crate::stepper::Stepper`] does, by keeping it
/// alongside).
///
/// `realize_unrolled` and `realize_compact` are functionally identical for
/// an interpreter (both dispatch on definition kind inside a loop already):
/// it's the generated-code *size* a real JIT backend trades off between the
/// two modes, not this interpreter's per-step cost. `mode` is still tracked
/// so callers can observe which strategy would have been selected.
struct InterpretedKernel {
    engine: Engine,
    mode: KernelMode,
}

impl<F: Scalar> Kernel<F> for InterpretedKernel {
    fn seed_order0(
        &self,
        decomp: &Decomposition,
        buf: &mut CoeffBuffer<F>,
        state: &[F],
        lane_failed: &mut [bool],
    ) {
        self.engine.seed_order0(decomp, buf, state, lane_failed);
    }

    fn compute_order(
        &self,
        decomp: &Decomposition,
        buf: &mut CoeffBuffer<F>,
        n: usize,
        lane_failed: &mut [bool],
    ) {
        self.engine.compute_order(decomp, buf, n, lane_failed);
    }

    fn mode(&self) -> KernelMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_system_realizes_unrolled_by_default() {
        assert_eq!(KernelMode::for_size(3), KernelMode::Unrolled);
    }

    #[test]
    fn large_system_realizes_compact_by_default() {
        assert_eq!(KernelMode::for_size(10_000), KernelMode::Compact);
    }

    #[test]
    fn compact_mode_can_be_forced() {
        let x = crate::expr::Expr::var("x").expect("valid");
        let sys = vec![x];
        let decomp = crate::decompose::decompose(&sys, &["x".to_string()]).expect("valid");
        let backend = InterpreterBackend;
        let kernel: Box<dyn Kernel<f64>> = backend.realize(&decomp, true);
        assert_eq!(kernel.mode(), KernelMode::Compact);
    }
}
