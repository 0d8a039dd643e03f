// SPDX-License-Identifier: Apache-2.0

//! In-core evaluation of plan trees.
//!
//! Used for whatever part of a plan no single adapter can run. Subtrees are
//! first offered to a [`SubplanSource`] (normally the adapter registry), so
//! only the cross-adapter glue is evaluated here.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use bigdecimal::BigDecimal;

use polyfed_core::{EngineError, EngineResult, PolyValue};

use super::{AggregateCall, AggregateFunction, JoinKind, Plan, PlanNode, SortKey};
use crate::engine::types::Row;

/// Supplies rows for subtrees an adapter can execute natively.
pub trait SubplanSource {
    /// `Ok(None)` means the subtree must be evaluated in core.
    fn try_execute(&self, plan: &Plan) -> EngineResult<Option<Vec<Row>>>;
}

/// Source that never pushes anything down.
pub struct CoreOnly;

impl SubplanSource for CoreOnly {
    fn try_execute(&self, _plan: &Plan) -> EngineResult<Option<Vec<Row>>> {
        Ok(None)
    }
}

pub fn evaluate(plan: &Plan, source: &dyn SubplanSource) -> EngineResult<Vec<Row>> {
    if let Some(rows) = source.try_execute(plan)? {
        return Ok(rows);
    }
    match &plan.node {
        PlanNode::Values { rows, .. } => Ok(rows.clone()),
        PlanNode::Filter { input, condition } => {
            let mut out = Vec::new();
            for row in evaluate(input, source)? {
                if condition.matches(&row)? {
                    out.push(row);
                }
            }
            Ok(out)
        }
        PlanNode::Project { input, exprs } => evaluate(input, source)?
            .iter()
            .map(|row| exprs.iter().map(|(e, _)| e.evaluate(row)).collect())
            .collect(),
        PlanNode::Sort { input, keys } => {
            let mut rows = evaluate(input, source)?;
            rows.sort_by(|a, b| compare_rows(a, b, keys));
            Ok(rows)
        }
        PlanNode::Union { inputs, all } => {
            let mut out = Vec::new();
            let mut seen = HashSet::new();
            for input in inputs {
                for row in evaluate(input, source)? {
                    if *all || seen.insert(row_key(&row)) {
                        out.push(row);
                    }
                }
            }
            Ok(out)
        }
        PlanNode::Aggregate { input, group, calls } => aggregate(evaluate(input, source)?, group, calls),
        PlanNode::Join {
            left,
            right,
            kind,
            condition,
        } => {
            let left_rows = evaluate(left, source)?;
            let right_rows = evaluate(right, source)?;
            nested_loop_join(
                &left_rows,
                &right_rows,
                left.field_count(),
                right.field_count(),
                *kind,
                |row| condition.matches(row),
            )
        }
        PlanNode::Scan { adapter, table, .. } => Err(EngineError::not_supported(format!(
            "Scan of {table} on adapter {adapter} has no executing adapter"
        ))),
        PlanNode::Modify { .. } | PlanNode::Graph { .. } => Err(EngineError::not_supported(
            "Modify and graph nodes are executed by adapters, not evaluated in core",
        )),
    }
}

/// Nulls sort first in either direction.
fn compare_rows(a: &Row, b: &Row, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let (x, y) = (&a[key.column], &b[key.column]);
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                let o = x.compare(y).unwrap_or(Ordering::Equal);
                if key.descending {
                    o.reverse()
                } else {
                    o
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Identity of a row for duplicate elimination and grouping. Each
/// component is tagged with its kind, so text `"5"` and integer `5` differ
/// while exact numerics of any width still share a tag.
pub(crate) fn row_key(row: &[PolyValue]) -> Vec<String> {
    row.iter()
        .map(|v| {
            let tag = if v.is_exact_numeric() { "exact" } else { v.kind_name() };
            format!("{tag}:{}", v.key_text())
        })
        .collect()
}

fn aggregate(rows: Vec<Row>, group: &[usize], calls: &[AggregateCall]) -> EngineResult<Vec<Row>> {
    let mut order: Vec<Vec<String>> = Vec::new();
    let mut groups: HashMap<Vec<String>, (Row, Vec<Accumulator>)> = HashMap::new();

    for row in &rows {
        let values: Row = group.iter().map(|&i| row[i].clone()).collect();
        let key = row_key(&values);
        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (values, calls.iter().map(|c| Accumulator::new(c.function)).collect())
        });
        for (acc, call) in entry.1.iter_mut().zip(calls) {
            acc.add(call.column.map(|i| &row[i]))?;
        }
    }

    // A global aggregate over no rows still yields one row.
    if group.is_empty() && order.is_empty() {
        return Ok(vec![calls.iter().map(|c| Accumulator::new(c.function).finish()).collect()]);
    }

    Ok(order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|(mut values, accs)| {
            values.extend(accs.into_iter().map(Accumulator::finish));
            values
        })
        .collect())
}

enum Accumulator {
    Count(i64),
    Sum { exact: Option<BigDecimal>, float: Option<f64> },
    Extreme { best: Option<PolyValue>, want: Ordering },
}

impl Accumulator {
    fn new(function: AggregateFunction) -> Self {
        match function {
            AggregateFunction::Count => Accumulator::Count(0),
            AggregateFunction::Sum => Accumulator::Sum { exact: None, float: None },
            AggregateFunction::Min => Accumulator::Extreme {
                best: None,
                want: Ordering::Less,
            },
            AggregateFunction::Max => Accumulator::Extreme {
                best: None,
                want: Ordering::Greater,
            },
        }
    }

    /// `None` stands for `COUNT(*)`'s missing argument.
    fn add(&mut self, value: Option<&PolyValue>) -> EngineResult<()> {
        match self {
            Accumulator::Count(n) => {
                if value.map_or(true, |v| !v.is_null()) {
                    *n += 1;
                }
            }
            Accumulator::Sum { exact, float } => {
                let Some(v) = value.filter(|v| !v.is_null()) else {
                    return Ok(());
                };
                if matches!(v, PolyValue::Real(_) | PolyValue::Double(_)) || float.is_some() {
                    let carried = exact.take().and_then(|d| PolyValue::Decimal(d).as_f64()).unwrap_or(0.0);
                    let addend = v
                        .as_f64()
                        .ok_or_else(|| EngineError::execution_error(format!("SUM over {}", v.kind_name())))?;
                    *float = Some(float.unwrap_or(carried) + addend);
                } else {
                    let addend = v
                        .as_decimal()
                        .ok_or_else(|| EngineError::execution_error(format!("SUM over {}", v.kind_name())))?;
                    *exact = Some(exact.take().map_or(addend.clone(), |acc| acc + addend));
                }
            }
            Accumulator::Extreme { best, want } => {
                let Some(v) = value.filter(|v| !v.is_null()) else {
                    return Ok(());
                };
                let replace = match best {
                    None => true,
                    Some(current) => v.compare(current) == Some(*want),
                };
                if replace {
                    *best = Some(v.clone());
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> PolyValue {
        match self {
            Accumulator::Count(n) => PolyValue::BigInt(n),
            Accumulator::Sum { float: Some(f), .. } => PolyValue::Double(f),
            Accumulator::Sum { exact: Some(d), .. } => PolyValue::Decimal(d),
            Accumulator::Sum { .. } => PolyValue::Null,
            Accumulator::Extreme { best, .. } => best.unwrap_or(PolyValue::Null),
        }
    }
}

/// Joins two row sets. The predicate sees the concatenated row.
pub(crate) fn nested_loop_join(
    left: &[Row],
    right: &[Row],
    left_width: usize,
    right_width: usize,
    kind: JoinKind,
    predicate: impl Fn(&[PolyValue]) -> EngineResult<bool>,
) -> EngineResult<Vec<Row>> {
    let mut out = Vec::new();
    let mut right_matched = vec![false; right.len()];

    for l in left {
        let mut matched = false;
        for (j, r) in right.iter().enumerate() {
            let mut joined = Vec::with_capacity(left_width + right_width);
            joined.extend_from_slice(l);
            joined.extend_from_slice(r);
            if predicate(&joined)? {
                matched = true;
                right_matched[j] = true;
                out.push(joined);
            }
        }
        if !matched && matches!(kind, JoinKind::Left | JoinKind::Full) {
            let mut padded = l.clone();
            padded.resize(left_width + right_width, PolyValue::Null);
            out.push(padded);
        }
    }

    if matches!(kind, JoinKind::Right | JoinKind::Full) {
        for (r, _) in right.iter().zip(&right_matched).filter(|(_, m)| !**m) {
            let mut padded = vec![PolyValue::Null; left_width];
            padded.extend_from_slice(r);
            out.push(padded);
        }
    }
    Ok(out)
}
