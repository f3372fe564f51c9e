//! Error types surfaced by expression construction, decomposition and stepper setup.
//!
//! This module provides:
//! - [`OdeError`] - the single error enum for all construction-time failures
//!
//! Runtime failures discovered while stepping (domain violations, non-convergence)
//! are not exceptions: they are reported as a per-lane [`crate::stepper::Outcome`]
//! so that one lane's failure never aborts the others in a batch.

use std::fmt;

/// Errors raised while building an expression, a decomposition, or a stepper.
///
/// All of these are construction-time: they fail fast, before any stepping
/// happens, because the inputs they check (names, shapes, bounds) are known
/// in full before the first step.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum OdeError {
    /// A variable name starting with the reserved `u_` prefix was supplied by the caller.
    ReservedVariableName {
        /// The offending name.
        name: String,
    },
    /// A `Pow` node's exponent was not a numeric literal at a point where the
    /// Taylor recurrence requires one.
    NonNumericExponent,
    /// A function call was built with the wrong number of arguments for its kind.
    ArityMismatch {
        /// Arguments required.
        expected: usize,
        /// Arguments supplied.
        got: usize,
    },
    /// The free variables appearing in the right-hand side expressions do not
    /// match the declared state variable names.
    FreeVariableMismatch {
        /// Variables used in the right-hand sides but not declared as state variables.
        unbound: Vec<String>,
        /// Declared state variables never referenced by any right-hand side.
        unused: Vec<String>,
    },
    /// Division by the numeric literal zero at construction time.
    DivisionByZeroLiteral,
    /// A right-hand-side list was empty.
    EmptySystem,
    /// `batch_size` was zero.
    ZeroBatchSize,
    /// `tol` was not strictly positive.
    NonPositiveTolerance {
        /// The rejected tolerance value.
        tol: f64,
    },
    /// `h_min` exceeded `h_max`.
    StepBoundsInverted {
        /// The rejected lower bound.
        h_min: f64,
        /// The rejected upper bound.
        h_max: f64,
    },
    /// The requested Taylor order was less than 1.
    OrderTooLow {
        /// The rejected order.
        order: u32,
    },
    /// `initial_state` did not have the expected `m * batch_size` length.
    StateLengthMismatch {
        /// The length actually supplied.
        got: usize,
        /// The length required (`m * batch_size`).
        expected: usize,
    },
    /// [`crate::expr::Expr::eval_dbl`] referenced a variable absent from the
    /// supplied environment.
    UnboundVariable {
        /// The unbound name.
        name: String,
    },
    /// [`crate::expr::Expr::eval_dbl`] hit a domain violation (e.g. `log` of a
    /// non-positive value, `sqrt` of a negative value, division by a runtime
    /// zero) while walking the tree.
    EvalDomainViolation {
        /// The operation that produced the violation (`"log"`, `"sqrt"`, `"/"`, ...).
        op: &'static str,
    },
}

impl fmt::Display for OdeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OdeError::ReservedVariableName { name } => {
                write!(
                    f,
                    "variable name '{name}' is reserved for decomposition temporaries (the 'u_' prefix)"
                )
            }
            OdeError::NonNumericExponent => {
                write!(f, "pow() exponent must be a numeric literal")
            }
            OdeError::ArityMismatch { expected, got } => {
                write!(f, "function expects {expected} argument(s), got {got}")
            }
            OdeError::FreeVariableMismatch { unbound, unused } => {
                write!(
                    f,
                    "right-hand side free variables do not match state variables (unbound: {unbound:?}, unused: {unused:?})"
                )
            }
            OdeError::DivisionByZeroLiteral => {
                write!(f, "division by the numeric literal zero")
            }
            OdeError::EmptySystem => {
                write!(f, "a system of ordinary differential equations needs at least one equation")
            }
            OdeError::ZeroBatchSize => write!(f, "batch size must be at least 1"),
            OdeError::NonPositiveTolerance { tol } => {
                write!(f, "tolerance must be strictly positive, got {tol}")
            }
            OdeError::StepBoundsInverted { h_min, h_max } => {
                write!(f, "h_min ({h_min}) must not exceed h_max ({h_max})")
            }
            OdeError::OrderTooLow { order } => {
                write!(f, "Taylor order must be at least 1, got {order}")
            }
            OdeError::StateLengthMismatch { got, expected } => {
                write!(f, "initial_state has length {got}, expected {expected}")
            }
            OdeError::UnboundVariable { name } => {
                write!(f, "variable '{name}' is unbound in the evaluation environment")
            }
            OdeError::EvalDomainViolation { op } => {
                write!(f, "domain violation evaluating '{op}'")
            }
        }
    }
}

impl std::error::Error for OdeError {}

/// Convenience alias for results produced by construction-time operations.
pub type OdeResult<T> = Result<T, OdeError>;
