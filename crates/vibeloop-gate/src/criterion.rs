use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CriteriaError;

/// Comparison applied between an observed measurement and a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Passes when `observed >= threshold`
    GreaterEq,
    /// Passes when `observed <= threshold`
    LessEq,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::GreaterEq => ">=",
            Operator::LessEq => "<=",
        }
    }

    /// The symbol describing a failed comparison, for reports.
    pub fn negated_symbol(&self) -> &'static str {
        match self {
            Operator::GreaterEq => "<",
            Operator::LessEq => ">",
        }
    }

    pub fn holds(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Operator::GreaterEq => observed >= threshold,
            Operator::LessEq => observed <= threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A named acceptance threshold, immutable once parsed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub operator: Operator,
    pub threshold: f64,
}

impl Criterion {
    pub fn new(name: impl Into<String>, operator: Operator, threshold: f64) -> Self {
        Self {
            name: name.into(),
            operator,
            threshold,
        }
    }

    /// Parse a criterion expression of the form `<op><number>`.
    ///
    /// Whitespace around the operator and the number is ignored. Only `>=`
    /// and `<=` are accepted; anything else is reported as a configuration
    /// error rather than skipped.
    pub fn parse(name: &str, expr: &str) -> Result<Self, CriteriaError> {
        let trimmed = expr.trim();
        let op_len = trimmed
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '!'))
            .unwrap_or(trimmed.len());
        let (op, rest) = trimmed.split_at(op_len);

        let operator = match op {
            ">=" => Operator::GreaterEq,
            "<=" => Operator::LessEq,
            "" => {
                return Err(CriteriaError::MissingOperator {
                    name: name.to_string(),
                    expr: expr.to_string(),
                })
            }
            other => {
                return Err(CriteriaError::UnsupportedOperator {
                    name: name.to_string(),
                    operator: other.to_string(),
                })
            }
        };

        let value = rest.trim();
        let threshold = value
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| CriteriaError::InvalidThreshold {
                name: name.to_string(),
                value: value.to_string(),
            })?;

        Ok(Self::new(name, operator, threshold))
    }

    pub fn is_satisfied_by(&self, observed: f64) -> bool {
        self.operator.holds(observed, self.threshold)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.operator, self.threshold)
    }
}
