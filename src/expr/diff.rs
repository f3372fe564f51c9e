//! Symbolic differentiation: linearity, product/quotient rule, chain rule.

use super::{BinOp, Expr, ExprKind, FuncKind, build_binary_unchecked, negate};

/// `d/d(var) e`, as a total function over the four-variant algebra.
#[must_use]
pub fn diff(e: &Expr, var: &str) -> Expr {
    match &**e {
        ExprKind::Number(_) => Expr::num(0.0),
        ExprKind::Variable(name) => {
            if name == var {
                Expr::num(1.0)
            } else {
                Expr::num(0.0)
            }
        }
        ExprKind::BinaryOp(op, lhs, rhs) => diff_binary(*op, lhs, rhs, var),
        ExprKind::Function(kind, args) => diff_function(*kind, args, var),
    }
}

fn mul_u(a: Expr, b: Expr) -> Expr {
    build_binary_unchecked(BinOp::Mul, a, b)
}

fn div_u(a: Expr, b: Expr) -> Expr {
    build_binary_unchecked(BinOp::Div, a, b)
}

fn diff_binary(op: BinOp, lhs: &Expr, rhs: &Expr, var: &str) -> Expr {
    match op {
        BinOp::Add => diff(lhs, var).add(diff(rhs, var)),
        BinOp::Sub => diff(lhs, var).sub(diff(rhs, var)),
        BinOp::Mul => {
            // Product rule: (l*r)' = l'*r + l*r'.
            mul_u(diff(lhs, var), rhs.clone()).add(mul_u(lhs.clone(), diff(rhs, var)))
        }
        BinOp::Div => {
            // Quotient rule: (l/r)' = (l'*r - l*r') / r^2.
            let numerator =
                mul_u(diff(lhs, var), rhs.clone()).sub(mul_u(lhs.clone(), diff(rhs, var)));
            div_u(numerator, mul_u(rhs.clone(), rhs.clone()))
        }
    }
}

fn diff_function(kind: FuncKind, args: &[Expr], var: &str) -> Expr {
    match kind {
        FuncKind::Sin => {
            // sin(b)' = cos(b) * b'
            let b = &args[0];
            let cos_b =
                Expr::call(FuncKind::Cos, vec![b.clone()]).expect("Cos has fixed arity 1");
            mul_u(cos_b, diff(b, var))
        }
        FuncKind::Cos => {
            // cos(b)' = -sin(b) * b'
            let b = &args[0];
            let sin_b =
                Expr::call(FuncKind::Sin, vec![b.clone()]).expect("Sin has fixed arity 1");
            negate(mul_u(sin_b, diff(b, var)))
        }
        FuncKind::Exp => {
            // exp(b)' = exp(b) * b'
            let b = &args[0];
            let exp_b =
                Expr::call(FuncKind::Exp, vec![b.clone()]).expect("Exp has fixed arity 1");
            mul_u(exp_b, diff(b, var))
        }
        FuncKind::Log => {
            // log(b)' = b' / b
            let b = &args[0];
            div_u(diff(b, var), b.clone())
        }
        FuncKind::Sqrt => {
            // sqrt(b)' = b' / (2*sqrt(b))
            let b = &args[0];
            let sqrt_b =
                Expr::call(FuncKind::Sqrt, vec![b.clone()]).expect("Sqrt has fixed arity 1");
            div_u(diff(b, var), mul_u(Expr::num(2.0), sqrt_b))
        }
        FuncKind::Pow => diff_pow(&args[0], &args[1], var),
    }
}

/// `pow(b, e)' `. When `e` is a numeric literal this is the elementary power
/// rule `e * b^(e-1) * b'`; otherwise the general rule via `b^e = exp(e*log(b))`
/// is used, since a symbolic exponent has no closed power-rule form.
fn diff_pow(base: &Expr, exponent: &Expr, var: &str) -> Expr {
    if let ExprKind::Number(alpha) = &**exponent {
        let reduced = Expr::call(FuncKind::Pow, vec![base.clone(), Expr::num(alpha - 1.0)])
            .expect("Pow has fixed arity 2");
        return mul_u(mul_u(Expr::num(*alpha), reduced), diff(base, var));
    }

    // General case: d/dx[b^e] = b^e * (e' * ln(b) + e * b'/b)
    let pow_be = Expr::call(FuncKind::Pow, vec![base.clone(), exponent.clone()])
        .expect("Pow has fixed arity 2");
    let ln_b = Expr::call(FuncKind::Log, vec![base.clone()]).expect("Log has fixed arity 1");
    let term1 = mul_u(diff(exponent, var), ln_b);
    let term2 = mul_u(exponent.clone(), div_u(diff(base, var), base.clone()));
    mul_u(pow_be, term1.add(term2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn derivative_of_a_variable_absent_from_e_is_zero() {
        let x = Expr::var("x").expect("valid");
        assert_eq!(diff(&x, "y"), Expr::num(0.0));
    }

    #[test]
    fn diff_of_sum_with_itself_doubles() {
        let x = Expr::var("x").expect("valid");
        let e = x.clone().add(x.clone());
        let lhs = diff(&e, "x");
        let rhs = mul_u(Expr::num(2.0), diff(&x, "x"));
        let env = HashMap::from([("x".to_string(), 3.7)]);
        assert_eq!(
            lhs.eval_dbl(&env).expect("bound"),
            rhs.eval_dbl(&env).expect("bound")
        );
    }

    #[test]
    fn product_rule_matches_example_from_the_spec() {
        // d/dx[(x+y)*(x-y)] at x=3, y=2 equals 6.
        let x = Expr::var("x").expect("valid");
        let y = Expr::var("y").expect("valid");
        let e = x.clone().add(y.clone()).mul(x.clone().sub(y.clone()));
        let d = diff(&e, "x");
        let env = HashMap::from([("x".to_string(), 3.0), ("y".to_string(), 2.0)]);
        assert_eq!(d.eval_dbl(&env).expect("bound"), 6.0);
    }

    #[test]
    fn quotient_rule_matches_finite_difference() {
        let x = Expr::var("x").expect("valid");
        let e = Expr::call(FuncKind::Sin, vec![x.clone()])
            .expect("valid")
            .div(x.clone())
            .expect("nonzero divisor");
        let d = diff(&e, "x");
        let at = 1.3_f64;
        let eps = 1e-6;
        let env_hi = HashMap::from([("x".to_string(), at + eps)]);
        let env_lo = HashMap::from([("x".to_string(), at - eps)]);
        let fd = (e.eval_dbl(&env_hi).expect("bound") - e.eval_dbl(&env_lo).expect("bound"))
            / (2.0 * eps);
        let env = HashMap::from([("x".to_string(), at)]);
        let exact = d.eval_dbl(&env).expect("bound");
        assert!((fd - exact).abs() < 1e-6);
    }

    #[test]
    fn chain_rule_for_sin_of_square() {
        let x = Expr::var("x").expect("valid");
        let sq = Expr::call(FuncKind::Pow, vec![x.clone(), Expr::num(2.0)]).expect("valid");
        let e = Expr::call(FuncKind::Sin, vec![sq]).expect("valid");
        let d = diff(&e, "x");
        let at = 0.6_f64;
        let env = HashMap::from([("x".to_string(), at)]);
        let exact = d.eval_dbl(&env).expect("bound");
        let expected = 2.0 * at * at.powi(2).cos();
        assert!((exact - expected).abs() < 1e-12);
    }
}
