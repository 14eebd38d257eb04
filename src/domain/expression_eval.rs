//! Alpha expression evaluation.
//!
//! Expressions are evaluated column-wise over a whole [`PriceSeries`]: every
//! node yields one value per date. Semantics:
//!
//! - Missing optional fields (open/high/low/volume) read as NaN
//! - Arithmetic follows IEEE rules, so division by zero gives ±inf or NaN
//! - Comparisons yield 1.0 or 0.0, and NaN when either side is NaN
//! - `ternary(c, a, b)` picks `a` where `c` is non-zero, NaN where `c` is NaN
//! - Window functions are NaN until their window is full and wherever the
//!   window contains a NaN
//! - `rank` and `scale` only see values up to the current date

use crate::domain::expression::{BinaryOp, Expr, Field, Function};
use crate::domain::price::PriceSeries;
use crate::domain::rolling;

pub fn evaluate(expr: &Expr, series: &PriceSeries) -> Vec<f64> {
    match expr {
        Expr::Number(v) => vec![*v; series.len()],
        Expr::Field(field) => field_values(*field, series),
        Expr::Neg(inner) => evaluate(inner, series).into_iter().map(|v| -v).collect(),
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, series);
            let r = evaluate(right, series);
            l.into_iter().zip(r).map(|(a, b)| apply_binary(*op, a, b)).collect()
        }
        Expr::Call {
            function,
            args,
            window,
        } => {
            let values: Vec<Vec<f64>> = args.iter().map(|a| evaluate(a, series)).collect();
            apply_function(*function, &values, window.unwrap_or(0))
        }
    }
}

fn field_values(field: Field, series: &PriceSeries) -> Vec<f64> {
    let points = series.points();
    match field {
        Field::Close => series.closes(),
        Field::Open => points.iter().map(|p| p.open.unwrap_or(f64::NAN)).collect(),
        Field::High => points.iter().map(|p| p.high.unwrap_or(f64::NAN)).collect(),
        Field::Low => points.iter().map(|p| p.low.unwrap_or(f64::NAN)).collect(),
        Field::Volume => points
            .iter()
            .map(|p| p.volume.map(|v| v as f64).unwrap_or(f64::NAN))
            .collect(),
        Field::Returns => rolling::pct_change(&series.closes()),
    }
}

fn truth(condition: bool) -> f64 {
    if condition { 1.0 } else { 0.0 }
}

fn apply_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    let is_comparison = !matches!(
        op,
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow
    );
    if is_comparison && (a.is_nan() || b.is_nan()) {
        return f64::NAN;
    }
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Pow => a.powf(b),
        BinaryOp::Lt => truth(a < b),
        BinaryOp::Le => truth(a <= b),
        BinaryOp::Gt => truth(a > b),
        BinaryOp::Ge => truth(a >= b),
        BinaryOp::Eq => truth(a == b),
        BinaryOp::Ne => truth(a != b),
    }
}

/// sign(x) with sign(0) = 0 and sign(NaN) = NaN.
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        x
    }
}

pub fn signed_power(x: f64, exponent: f64) -> f64 {
    sign(x) * x.abs().powf(exponent)
}

fn map1(values: &[f64], f: impl Fn(f64) -> f64) -> Vec<f64> {
    values.iter().map(|&v| f(v)).collect()
}

fn apply_function(function: Function, args: &[Vec<f64>], window: usize) -> Vec<f64> {
    let x = &args[0];
    match function {
        Function::Abs => map1(x, f64::abs),
        Function::Sign => map1(x, sign),
        Function::Log => map1(x, f64::ln),
        Function::SignedPower => x
            .iter()
            .zip(&args[1])
            .map(|(&v, &e)| signed_power(v, e))
            .collect(),
        Function::Ternary => x
            .iter()
            .zip(&args[1])
            .zip(&args[2])
            .map(|((&c, &a), &b)| {
                if c.is_nan() {
                    f64::NAN
                } else if c != 0.0 {
                    a
                } else {
                    b
                }
            })
            .collect(),
        Function::Rank => map1(&rolling::expanding_pct_rank(x), |r| r - 0.5),
        Function::Scale => rolling::expanding_zscore(x),
        Function::Delay => rolling::delay(x, window),
        Function::Delta => rolling::delta(x, window),
        Function::Sum => rolling::sum(x, window),
        Function::Product => rolling::product(x, window),
        Function::Mean => rolling::mean(x, window),
        Function::Stddev => rolling::stddev(x, window, 0),
        Function::Min => rolling::min(x, window),
        Function::Max => rolling::max(x, window),
        Function::TsArgmax => rolling::ts_argmax(x, window),
        Function::TsArgmin => rolling::ts_argmin(x, window),
        Function::Correlation => rolling::correlation(x, &args[1], window),
        Function::Covariance => rolling::covariance(x, &args[1], window),
    }
}
