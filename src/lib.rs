#![forbid(unsafe_code)]
//! Adaptive, high-order Taylor-method integration for systems of ordinary
//! differential equations, with JIT-realizable right-hand sides.
//!
//! A caller builds a system symbolically from [`expr::Expr`] — variables,
//! numeric constants, the four arithmetic operators, and the elementary
//! functions `sin cos exp log sqrt pow` — declares which variables are the
//! state, and hands both to [`decompose::decompose`]. The resulting
//! [`decompose::Decomposition`] drives [`taylor::Engine`]'s per-operator
//! coefficient recurrences, which [`stepper::Stepper`] uses to advance the
//! state adaptively one Taylor step at a time.
//!
//! # Example
//! ```
//! use symb_anafis::expr::Expr;
//! use symb_anafis::stepper::{Config, Outcome, Stepper};
//!
//! let x = Expr::var("x").expect("valid name");
//! let v = Expr::var("v").expect("valid name");
//! let sys = vec![v.clone(), Expr::num(-1.0).mul(x)];
//! let state_vars = vec!["x".to_string(), "v".to_string()];
//!
//! let mut stepper = Stepper::<f64>::new(&sys, &state_vars, &[1.0, 0.0], Config::default())
//!     .expect("valid system");
//! let mut out = [(Outcome::Success, 0.0)];
//! stepper.step(&mut out);
//! ```

pub mod backend;
pub mod decompose;
pub mod error;
pub mod expr;
pub mod scalar;
pub mod stepper;
pub mod taylor;

pub use error::{OdeError, OdeResult};
pub use expr::Expr;
pub use scalar::Scalar;
pub use stepper::{Config, Outcome, Stepper};
