//! Alpha strategies and the `AlphaSpec` selector used at request time.
//!
//! An [`AlphaSpec`] is the serializable description (JSON body, config file,
//! CLI flag); [`AlphaSpec::build`] validates it and yields the shared
//! [`AlphaSignal`] that workers evaluate.

pub mod alpha1;
pub mod buy_and_hold;
pub mod expression;
pub mod sma_crossover;

pub use alpha1::Alpha1;
pub use buy_and_hold::BuyAndHold;
pub use expression::ExpressionAlpha;
pub use sma_crossover::SmaCrossover;

use crate::domain::error::BacktestError;
use crate::domain::signal::AlphaSignal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Available strategy kinds, as accepted in the `kind` tag.
pub const STRATEGY_NAMES: &[&str] = &["buy_and_hold", "sma_crossover", "alpha1", "expression"];

pub const DEFAULT_VOLATILITY_WINDOW: usize = 20;
pub const DEFAULT_ARGMAX_WINDOW: usize = 5;

fn default_volatility_window() -> usize {
    DEFAULT_VOLATILITY_WINDOW
}

fn default_argmax_window() -> usize {
    DEFAULT_ARGMAX_WINDOW
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlphaSpec {
    #[default]
    BuyAndHold,
    SmaCrossover {
        fast: usize,
        slow: usize,
        #[serde(default)]
        allow_short: bool,
    },
    Alpha1 {
        #[serde(default = "default_volatility_window")]
        volatility_window: usize,
        #[serde(default = "default_argmax_window")]
        argmax_window: usize,
    },
    Expression {
        expression: String,
        #[serde(default)]
        forward_fill: bool,
    },
}

impl AlphaSpec {
    pub fn alpha1() -> Self {
        AlphaSpec::Alpha1 {
            volatility_window: DEFAULT_VOLATILITY_WINDOW,
            argmax_window: DEFAULT_ARGMAX_WINDOW,
        }
    }

    /// Validate parameters and construct the strategy.
    ///
    /// Bad parameters fail with `InvalidRequest` on field `alpha`; an
    /// expression that does not parse fails with `AlphaParse`.
    pub fn build(&self) -> Result<Arc<dyn AlphaSignal>, BacktestError> {
        match self {
            AlphaSpec::BuyAndHold => Ok(Arc::new(BuyAndHold)),
            AlphaSpec::SmaCrossover {
                fast,
                slow,
                allow_short,
            } => {
                if *fast == 0 || *slow == 0 {
                    return Err(BacktestError::invalid_request(
                        "alpha",
                        "sma_crossover windows must be at least 1",
                    ));
                }
                if fast >= slow {
                    return Err(BacktestError::invalid_request(
                        "alpha",
                        format!("sma_crossover fast window ({fast}) must be below slow window ({slow})"),
                    ));
                }
                Ok(Arc::new(SmaCrossover::new(*fast, *slow, *allow_short)))
            }
            AlphaSpec::Alpha1 {
                volatility_window,
                argmax_window,
            } => {
                if *volatility_window < 2 {
                    return Err(BacktestError::invalid_request(
                        "alpha",
                        "alpha1 volatility_window must be at least 2",
                    ));
                }
                if *argmax_window == 0 {
                    return Err(BacktestError::invalid_request(
                        "alpha",
                        "alpha1 argmax_window must be at least 1",
                    ));
                }
                Ok(Arc::new(Alpha1::new(*volatility_window, *argmax_window)))
            }
            AlphaSpec::Expression {
                expression,
                forward_fill,
            } => {
                if expression.trim().is_empty() {
                    return Err(BacktestError::invalid_request("alpha", "expression is empty"));
                }
                Ok(Arc::new(ExpressionAlpha::parse(expression, *forward_fill)?))
            }
        }
    }
}

impl fmt::Display for AlphaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlphaSpec::BuyAndHold => f.write_str("buy_and_hold"),
            AlphaSpec::SmaCrossover {
                fast,
                slow,
                allow_short,
            } => {
                write!(f, "sma_crossover:{fast},{slow}")?;
                if *allow_short {
                    f.write_str(",short")?;
                }
                Ok(())
            }
            AlphaSpec::Alpha1 {
                volatility_window,
                argmax_window,
            } => {
                if *volatility_window == DEFAULT_VOLATILITY_WINDOW
                    && *argmax_window == DEFAULT_ARGMAX_WINDOW
                {
                    f.write_str("alpha1")
                } else {
                    write!(f, "alpha1:{volatility_window},{argmax_window}")
                }
            }
            AlphaSpec::Expression { expression, .. } => write!(f, "expr:{expression}"),
        }
    }
}

fn parse_window(raw: &str, what: &str) -> Result<usize, BacktestError> {
    raw.trim().parse::<usize>().map_err(|_| {
        BacktestError::invalid_request("alpha", format!("{what} must be a non-negative integer, got '{}'", raw.trim()))
    })
}

/// Parse the compact form used on the command line and in config files:
/// `buy_and_hold`, `alpha1[:VOL,ARGMAX]`, `sma_crossover:FAST,SLOW[,short]`,
/// `expr:<expression>`.
impl FromStr for AlphaSpec {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, params) = match s.split_once(':') {
            Some((name, params)) => (name.trim(), Some(params)),
            None => (s, None),
        };

        match (name.to_lowercase().as_str(), params) {
            ("buy_and_hold", None) => Ok(AlphaSpec::BuyAndHold),
            ("alpha1", None) => Ok(AlphaSpec::alpha1()),
            ("alpha1", Some(params)) => {
                let parts: Vec<&str> = params.split(',').collect();
                if parts.len() != 2 {
                    return Err(BacktestError::invalid_request(
                        "alpha",
                        "expected alpha1:VOLATILITY_WINDOW,ARGMAX_WINDOW",
                    ));
                }
                Ok(AlphaSpec::Alpha1 {
                    volatility_window: parse_window(parts[0], "volatility window")?,
                    argmax_window: parse_window(parts[1], "argmax window")?,
                })
            }
            ("sma_crossover", Some(params)) => {
                let parts: Vec<&str> = params.split(',').map(str::trim).collect();
                let allow_short = match parts.get(2) {
                    None => false,
                    Some(flag) if flag.eq_ignore_ascii_case("short") => true,
                    Some(flag) => {
                        return Err(BacktestError::invalid_request(
                            "alpha",
                            format!("unknown sma_crossover flag '{flag}' (expected 'short')"),
                        ));
                    }
                };
                if parts.len() < 2 || parts.len() > 3 {
                    return Err(BacktestError::invalid_request(
                        "alpha",
                        "expected sma_crossover:FAST,SLOW[,short]",
                    ));
                }
                Ok(AlphaSpec::SmaCrossover {
                    fast: parse_window(parts[0], "fast window")?,
                    slow: parse_window(parts[1], "slow window")?,
                    allow_short,
                })
            }
            ("sma_crossover", None) => Err(BacktestError::invalid_request(
                "alpha",
                "expected sma_crossover:FAST,SLOW[,short]",
            )),
            ("expr" | "expression", Some(expression)) => Ok(AlphaSpec::Expression {
                expression: expression.trim().to_string(),
                forward_fill: false,
            }),
            _ => Err(BacktestError::invalid_request(
                "alpha",
                format!(
                    "unknown alpha '{}' (available: {})",
                    s,
                    STRATEGY_NAMES.join(", ")
                ),
            )),
        }
    }
}
