// SPDX-License-Identifier: Apache-2.0

//! Row expressions with SQL three-valued logic.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use polyfed_core::{EngineError, EngineResult, PolyValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Positional reference into the input row
    Column(usize),
    Literal(PolyValue),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
}

impl Expr {
    pub fn col(index: usize) -> Self {
        Expr::Column(index)
    }

    pub fn lit(value: impl Into<PolyValue>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    /// Conjunction; a single operand is returned as is, none is `TRUE`.
    pub fn and(mut operands: Vec<Expr>) -> Self {
        match operands.len() {
            0 => Expr::Literal(PolyValue::Boolean(true)),
            1 => operands.remove(0),
            _ => Expr::And(operands),
        }
    }

    /// Disjunction; a single operand is returned as is, none is `FALSE`.
    pub fn or(mut operands: Vec<Expr>) -> Self {
        match operands.len() {
            0 => Expr::Literal(PolyValue::Boolean(false)),
            1 => operands.remove(0),
            _ => Expr::Or(operands),
        }
    }

    pub fn is_null(operand: Expr) -> Self {
        Expr::IsNull(Box::new(operand))
    }

    pub fn negate(operand: Expr) -> Self {
        Expr::Not(Box::new(operand))
    }

    /// Highest column index referenced, if any.
    pub fn max_column(&self) -> Option<usize> {
        match self {
            Expr::Column(i) => Some(*i),
            Expr::Literal(_) => None,
            Expr::Compare { left, right, .. } => left.max_column().max(right.max_column()),
            Expr::And(items) | Expr::Or(items) => items.iter().filter_map(Expr::max_column).max(),
            Expr::Not(inner) | Expr::IsNull(inner) => inner.max_column(),
        }
    }

    /// Rewrites every column reference through `f`.
    pub fn map_columns(&self, f: &impl Fn(usize) -> usize) -> Expr {
        match self {
            Expr::Column(i) => Expr::Column(f(*i)),
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Compare { op, left, right } => Expr::compare(*op, left.map_columns(f), right.map_columns(f)),
            Expr::And(items) => Expr::And(items.iter().map(|e| e.map_columns(f)).collect()),
            Expr::Or(items) => Expr::Or(items.iter().map(|e| e.map_columns(f)).collect()),
            Expr::Not(inner) => Expr::negate(inner.map_columns(f)),
            Expr::IsNull(inner) => Expr::is_null(inner.map_columns(f)),
        }
    }

    pub fn evaluate(&self, row: &[PolyValue]) -> EngineResult<PolyValue> {
        match self {
            Expr::Column(i) => row.get(*i).cloned().ok_or_else(|| {
                EngineError::execution_error(format!(
                    "Column ${i} out of range for a row of {} values",
                    row.len()
                ))
            }),
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Compare { op, left, right } => {
                let l = left.evaluate(row)?;
                let r = right.evaluate(row)?;
                Ok(match l.compare(&r) {
                    Some(ordering) => PolyValue::Boolean(op.holds(ordering)),
                    None => PolyValue::Null,
                })
            }
            Expr::And(items) => {
                let mut unknown = false;
                for item in items {
                    match truth(&item.evaluate(row)?)? {
                        Some(false) => return Ok(PolyValue::Boolean(false)),
                        Some(true) => {}
                        None => unknown = true,
                    }
                }
                Ok(if unknown { PolyValue::Null } else { PolyValue::Boolean(true) })
            }
            Expr::Or(items) => {
                let mut unknown = false;
                for item in items {
                    match truth(&item.evaluate(row)?)? {
                        Some(true) => return Ok(PolyValue::Boolean(true)),
                        Some(false) => {}
                        None => unknown = true,
                    }
                }
                Ok(if unknown { PolyValue::Null } else { PolyValue::Boolean(false) })
            }
            Expr::Not(inner) => Ok(match truth(&inner.evaluate(row)?)? {
                Some(b) => PolyValue::Boolean(!b),
                None => PolyValue::Null,
            }),
            Expr::IsNull(inner) => Ok(PolyValue::Boolean(inner.evaluate(row)?.is_null())),
        }
    }

    /// True only when the expression evaluates to `TRUE` (not unknown).
    pub fn matches(&self, row: &[PolyValue]) -> EngineResult<bool> {
        Ok(truth(&self.evaluate(row)?)? == Some(true))
    }
}

fn truth(value: &PolyValue) -> EngineResult<Option<bool>> {
    match value {
        PolyValue::Boolean(b) => Ok(Some(*b)),
        PolyValue::Null => Ok(None),
        other => Err(EngineError::execution_error(format!(
            "Expected a boolean condition, got {}",
            other.kind_name()
        ))),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(i) => write!(f, "${i}"),
            Expr::Literal(PolyValue::String(s)) => write!(f, "'{}'", s.value),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::And(items) => write_joined(f, items, "AND"),
            Expr::Or(items) => write_joined(f, items, "OR"),
            Expr::Not(inner) => write!(f, "NOT ({inner})"),
            Expr::IsNull(inner) => write!(f, "{inner} IS NULL"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " {sep} ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, ")")
}
