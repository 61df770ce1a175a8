use std::fmt;

use regex::Regex;

use crate::error::{Error, FormatKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl CompareOp {
    fn parse(token: &str) -> Option<Self> {
        match token {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "=" => Some(Self::Eq),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed quantity expression such as `>=8`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub op: CompareOp,
    pub operand: f64,
}

impl Comparison {
    pub fn evaluate(&self, value: f64) -> bool {
        evaluate(value, self.op, self.operand)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.operand)
    }
}

/// Parses `<op><number>` with no surrounding whitespace.
pub fn parse_comparator(expr: &str) -> Result<Comparison> {
    let expr_re = Regex::new(r"^(>=|<=|>|<|=)(\d+(\.\d+)?)$")
        .map_err(|_| Error::format(FormatKind::Quantity, expr))?;

    let caps = expr_re
        .captures(expr)
        .ok_or_else(|| Error::format(FormatKind::Quantity, expr))?;
    let op = CompareOp::parse(&caps[1])
        .ok_or_else(|| Error::format(FormatKind::Quantity, expr))?;
    let operand = caps[2]
        .parse::<f64>()
        .map_err(|_| Error::format(FormatKind::Quantity, expr))?;

    Ok(Comparison { op, operand })
}

/// Equality is exact floating-point comparison.
pub fn evaluate(value: f64, op: CompareOp, operand: f64) -> bool {
    match op {
        CompareOp::Gt => value > operand,
        CompareOp::Lt => value < operand,
        CompareOp::Ge => value >= operand,
        CompareOp::Le => value <= operand,
        CompareOp::Eq => value == operand,
    }
}

#[cfg(test)]
mod tests {
    use super::{CompareOp, Comparison, evaluate, parse_comparator};

    #[test]
    fn parses_each_operator() {
        for (expr, op) in [
            (">8", CompareOp::Gt),
            ("<8", CompareOp::Lt),
            (">=8", CompareOp::Ge),
            ("<=8", CompareOp::Le),
            ("=8", CompareOp::Eq),
        ] {
            assert_eq!(
                parse_comparator(expr).unwrap(),
                Comparison { op, operand: 8.0 }
            );
        }
        assert_eq!(parse_comparator("<=7.25").unwrap().operand, 7.25);
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expr in ["", "8", ">= 8", " >8", "=>8", ">8h", ">-1", ">.5", "≥8"] {
            assert!(parse_comparator(expr).is_err(), "{expr} should be rejected");
        }
    }

    #[test]
    fn boundary_of_greater_or_equal() {
        let cmp = parse_comparator(">=8").unwrap();
        assert!(cmp.evaluate(8.0));
        assert!(!cmp.evaluate(7.99));
        assert!(cmp.evaluate(8.01));
    }

    #[test]
    fn equality_is_exact() {
        assert!(evaluate(0.5, CompareOp::Eq, 0.5));
        assert!(!evaluate(0.1 + 0.2, CompareOp::Eq, 0.3));
        assert!((0.1_f64 + 0.2 - 0.3).abs() < 1e-9);
    }
}
