//! Direct (non-Taylor) numeric evaluation on a name -> value environment.
//!
//! This is the symbolic layer's sibling of the stepper's coefficient engine:
//! it evaluates a single expression value rather than a Taylor series, and is
//! used by tests that check decomposition soundness (`eval_dbl(e) ==
//! eval_dbl_on_U(U)`) and by the algebraic differentiation properties.

use std::collections::HashMap;

use super::{BinOp, Expr, ExprKind, FuncKind};
use crate::error::{OdeError, OdeResult};

/// Evaluates `e`, panicking the caller's own logic path never occurs here —
/// unbound variables and domain violations are reported via `OdeResult`.
pub fn eval_dbl_checked(e: &Expr, env: &HashMap<String, f64>) -> OdeResult<f64> {
    match &**e {
        ExprKind::Number(n) => Ok(*n),
        ExprKind::Variable(name) => env.get(name).copied().ok_or_else(|| OdeError::UnboundVariable {
            name: name.clone(),
        }),
        ExprKind::BinaryOp(op, lhs, rhs) => {
            let l = eval_dbl_checked(lhs, env)?;
            let r = eval_dbl_checked(rhs, env)?;
            match op {
                BinOp::Add => Ok(l + r),
                BinOp::Sub => Ok(l - r),
                BinOp::Mul => Ok(l * r),
                BinOp::Div => {
                    if r == 0.0 {
                        Err(OdeError::EvalDomainViolation { op: "/" })
                    } else {
                        Ok(l / r)
                    }
                }
            }
        }
        ExprKind::Function(kind, args) => eval_function(*kind, args, env),
    }
}

fn eval_function(kind: FuncKind, args: &[Expr], env: &HashMap<String, f64>) -> OdeResult<f64> {
    match kind {
        FuncKind::Sin => eval_dbl_checked(&args[0], env).map(f64::sin),
        FuncKind::Cos => eval_dbl_checked(&args[0], env).map(f64::cos),
        FuncKind::Exp => eval_dbl_checked(&args[0], env).map(f64::exp),
        FuncKind::Log => {
            let b = eval_dbl_checked(&args[0], env)?;
            if b > 0.0 {
                Ok(b.ln())
            } else {
                Err(OdeError::EvalDomainViolation { op: "log" })
            }
        }
        FuncKind::Sqrt => {
            let b = eval_dbl_checked(&args[0], env)?;
            if b >= 0.0 {
                Ok(b.sqrt())
            } else {
                Err(OdeError::EvalDomainViolation { op: "sqrt" })
            }
        }
        FuncKind::Pow => {
            let b = eval_dbl_checked(&args[0], env)?;
            let e = eval_dbl_checked(&args[1], env)?;
            Ok(b.powf(e))
        }
    }
}
