// SPDX-License-Identifier: Apache-2.0

//! Filter synthesis for the pending side of a streamed join.
//!
//! Each received row becomes one conjunction of `pending_column = literal`
//! terms; the conjunctions are OR-ed together. Rows are normally projected
//! onto the equality pairs, one value per pair. Two other shapes are
//! accepted: a row wider than the pair list is a full executed-side row and
//! is read at each pair's executed column; a narrower row binds only the
//! leading pairs it has values for.

use std::collections::HashSet;

use polyfed_core::PolyValue;

use crate::engine::types::Row;
use crate::plan::eval::row_key;
use crate::plan::Expr;

use super::condition::JoinPair;

/// Builds the pending-side filter, or `None` when there is nothing to
/// filter on. No rows yields a filter that matches nothing.
pub fn synthesize(pairs: &[JoinPair], rows: &[Row]) -> Option<Expr> {
    if pairs.is_empty() {
        return None;
    }
    let mut seen = HashSet::new();
    let mut disjuncts = Vec::new();
    for row in rows {
        let Some(terms) = terms_for(pairs, row) else {
            continue;
        };
        let values: Vec<PolyValue> = terms.iter().map(|(_, v)| v.clone()).collect();
        if !seen.insert(row_key(&values)) {
            continue;
        }
        disjuncts.push(Expr::and(
            terms
                .into_iter()
                .map(|(column, value)| Expr::eq(Expr::col(column), Expr::Literal(value)))
                .collect(),
        ));
    }
    Some(Expr::or(disjuncts))
}

/// `(pending column, literal)` terms for one row; `None` when a bound
/// value is null, since null never satisfies `=`.
fn terms_for(pairs: &[JoinPair], row: &[PolyValue]) -> Option<Vec<(usize, PolyValue)>> {
    let wide = row.len() > pairs.len();
    let mut terms = Vec::with_capacity(pairs.len());
    for (position, pair) in pairs.iter().enumerate() {
        let index = if wide { pair.executed } else { position };
        let Some(value) = row.get(index) else {
            break;
        };
        if value.is_null() {
            return None;
        }
        terms.push((pair.pending, value.clone()));
    }
    if terms.is_empty() {
        None
    } else {
        Some(terms)
    }
}
