//! Alpha expression AST.
//!
//! - `Field`: per-date inputs taken from the price series
//! - `Function`: named operators with their argument shape
//! - `BinaryOp`: arithmetic and comparison operators
//! - `Expr`: the expression tree itself
//!
//! `Display` renders canonical text that parses back to the same tree.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
    /// Simple return of the close, `close / delay(close, 1) - 1`.
    Returns,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
        Field::Returns,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
            Field::Returns => "returns",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Sign,
    Log,
    SignedPower,
    Ternary,
    Rank,
    Scale,
    Delay,
    Delta,
    Sum,
    Product,
    Mean,
    Stddev,
    Min,
    Max,
    TsArgmax,
    TsArgmin,
    Correlation,
    Covariance,
}

impl Function {
    pub const ALL: [Function; 19] = [
        Function::Abs,
        Function::Sign,
        Function::Log,
        Function::SignedPower,
        Function::Ternary,
        Function::Rank,
        Function::Scale,
        Function::Delay,
        Function::Delta,
        Function::Sum,
        Function::Product,
        Function::Mean,
        Function::Stddev,
        Function::Min,
        Function::Max,
        Function::TsArgmax,
        Function::TsArgmin,
        Function::Correlation,
        Function::Covariance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Sign => "sign",
            Function::Log => "log",
            Function::SignedPower => "signedpower",
            Function::Ternary => "ternary",
            Function::Rank => "rank",
            Function::Scale => "scale",
            Function::Delay => "delay",
            Function::Delta => "delta",
            Function::Sum => "sum",
            Function::Product => "product",
            Function::Mean => "mean",
            Function::Stddev => "stddev",
            Function::Min => "min",
            Function::Max => "max",
            Function::TsArgmax => "ts_argmax",
            Function::TsArgmin => "ts_argmin",
            Function::Correlation => "correlation",
            Function::Covariance => "covariance",
        }
    }

    pub fn from_name(name: &str) -> Option<Function> {
        Function::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Number of expression arguments, not counting the window.
    pub fn arity(self) -> usize {
        match self {
            Function::SignedPower | Function::Correlation | Function::Covariance => 2,
            Function::Ternary => 3,
            _ => 1,
        }
    }

    /// Whether the last argument is an integer window literal.
    pub fn takes_window(self) -> bool {
        !matches!(
            self,
            Function::Abs
                | Function::Sign
                | Function::Log
                | Function::SignedPower
                | Function::Ternary
                | Function::Rank
                | Function::Scale
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne => {
                PREC_COMPARISON
            }
            BinaryOp::Add | BinaryOp::Sub => PREC_ADDITIVE,
            BinaryOp::Mul | BinaryOp::Div => PREC_TERM,
            BinaryOp::Pow => PREC_POWER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Field(Field),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
        window: Option<usize>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(function: Function, args: Vec<Expr>, window: Option<usize>) -> Expr {
        Expr::Call {
            function,
            args,
            window,
        }
    }

    /// Largest window used anywhere in the tree; a rough warm-up estimate.
    pub fn max_window(&self) -> usize {
        match self {
            Expr::Number(_) | Expr::Field(_) => 0,
            Expr::Neg(inner) => inner.max_window(),
            Expr::Binary { left, right, .. } => left.max_window().max(right.max_window()),
            Expr::Call { args, window, .. } => args
                .iter()
                .map(Expr::max_window)
                .fold(window.unwrap_or(0), usize::max),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(v) if *v < 0.0 => PREC_UNARY,
            Expr::Number(_) | Expr::Field(_) | Expr::Call { .. } => PREC_PRIMARY,
            Expr::Neg(_) => PREC_UNARY,
            Expr::Binary { op, .. } => op.precedence(),
        }
    }
}

const PREC_COMPARISON: u8 = 1;
const PREC_ADDITIVE: u8 = 2;
const PREC_TERM: u8 = 3;
const PREC_POWER: u8 = 4;
const PREC_UNARY: u8 = 5;
const PREC_PRIMARY: u8 = 6;

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min_prec: u8) -> fmt::Result {
    if expr.precedence() < min_prec {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{v}"),
            Expr::Field(field) => f.write_str(field.name()),
            Expr::Neg(inner) => {
                f.write_str("-")?;
                write_operand(f, inner, PREC_UNARY)
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                // ^ is right-associative and binds its left side at unary level;
                // the rest are left-associative, comparisons do not chain.
                let (left_min, right_min) = match op {
                    BinaryOp::Pow => (PREC_UNARY, PREC_POWER),
                    _ if prec == PREC_COMPARISON => (PREC_ADDITIVE, PREC_ADDITIVE),
                    _ => (prec, prec + 1),
                };
                write_operand(f, left, left_min)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, right_min)
            }
            Expr::Call {
                function,
                args,
                window,
            } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                if let Some(n) = window {
                    write!(f, ", {n}")?;
                }
                f.write_str(")")
            }
        }
    }
}
