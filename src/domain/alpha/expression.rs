//! User-supplied alpha expressions.

use crate::domain::error::ParseError;
use crate::domain::expression::Expr;
use crate::domain::expression_eval;
use crate::domain::expression_parser;
use crate::domain::price::PriceSeries;
use crate::domain::signal::{AlphaSignal, GapPolicy, PositionSignal};

/// An alpha whose weight is a parsed expression, clamped to [-1, 1].
#[derive(Debug, Clone)]
pub struct ExpressionAlpha {
    expr: Expr,
    forward_fill: bool,
    name: String,
}

impl ExpressionAlpha {
    pub fn new(expr: Expr, forward_fill: bool) -> Self {
        let name = format!("expr:{expr}");
        Self {
            expr,
            forward_fill,
            name,
        }
    }

    pub fn parse(input: &str, forward_fill: bool) -> Result<Self, ParseError> {
        Ok(Self::new(expression_parser::parse(input)?, forward_fill))
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl AlphaSignal for ExpressionAlpha {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, series: &PriceSeries) -> PositionSignal {
        let raw = expression_eval::evaluate(&self.expr, series);
        PositionSignal::from_raw(series, &raw)
    }

    fn gap_policy(&self) -> GapPolicy {
        if self.forward_fill {
            GapPolicy::ForwardFill
        } else {
            GapPolicy::Preserve
        }
    }
}
