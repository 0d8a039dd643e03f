// SPDX-License-Identifier: Apache-2.0

//! Join condition extraction.
//!
//! Walks a join condition and pairs every column compared across the two
//! sides. Column indexes are local to their side. A pair reached only
//! through conjunctions must hold for every joined row; one under a
//! disjunction need not.

use crate::plan::{CompareOp, Expr};

/// Side of a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

impl JoinSide {
    pub fn other(self) -> JoinSide {
        match self {
            JoinSide::Left => JoinSide::Right,
            JoinSide::Right => JoinSide::Left,
        }
    }
}

/// One cross-side comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPair {
    pub executed: usize,
    pub pending: usize,
    pub op: CompareOp,
    /// Reached from the root through `AND` nodes only.
    pub conjunct: bool,
}

/// Parallel projection lists of the executed and the pending side, in
/// traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinProjections {
    pub pairs: Vec<JoinPair>,
}

impl JoinProjections {
    pub fn executed(&self) -> Vec<usize> {
        self.pairs.iter().map(|p| p.executed).collect()
    }

    pub fn pending(&self) -> Vec<usize> {
        self.pairs.iter().map(|p| p.pending).collect()
    }

    /// Pairs usable as equality filters on the pending side: equalities
    /// every joined row satisfies.
    pub fn equalities(&self) -> Vec<JoinPair> {
        self.pairs
            .iter()
            .copied()
            .filter(|p| p.op == CompareOp::Eq && p.conjunct)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Extracts the `=`/`<>` column pairs of `condition`, a predicate over the
/// concatenation of a `left_width`-wide left row and the right row.
pub fn extract(condition: &Expr, left_width: usize, executed: JoinSide) -> JoinProjections {
    let mut out = JoinProjections::default();
    visit(condition, left_width, executed, true, &mut out);
    out
}

fn visit(expr: &Expr, left_width: usize, executed: JoinSide, conjunct: bool, out: &mut JoinProjections) {
    match expr {
        Expr::And(items) => {
            for item in items {
                visit(item, left_width, executed, conjunct, out);
            }
        }
        Expr::Or(items) => {
            // A single disjunct is the whole condition.
            let conjunct = conjunct && items.len() == 1;
            for item in items {
                visit(item, left_width, executed, conjunct, out);
            }
        }
        Expr::Compare { op, left, right } if matches!(op, CompareOp::Eq | CompareOp::NotEq) => {
            let (Expr::Column(a), Expr::Column(b)) = (left.as_ref(), right.as_ref()) else {
                return;
            };
            let side = |i: usize| if i < left_width { (JoinSide::Left, i) } else { (JoinSide::Right, i - left_width) };
            let ((side_a, a), (side_b, b)) = (side(*a), side(*b));
            if side_a == side_b {
                return;
            }
            let (executed_index, pending_index) = if side_a == executed { (a, b) } else { (b, a) };
            out.pairs.push(JoinPair {
                executed: executed_index,
                pending: pending_index,
                op: *op,
                conjunct,
            });
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_local_to_each_side() {
        // l.0 = r.1 AND r.0 <> l.2, left is 3 wide
        let cond = Expr::and(vec![
            Expr::eq(Expr::col(0), Expr::col(4)),
            Expr::compare(CompareOp::NotEq, Expr::col(3), Expr::col(2)),
        ]);
        let right_first = extract(&cond, 3, JoinSide::Right);
        assert_eq!(right_first.executed(), vec![1, 0]);
        assert_eq!(right_first.pending(), vec![0, 2]);
        assert_eq!(right_first.equalities().len(), 1);

        let left_first = extract(&cond, 3, JoinSide::Left);
        assert_eq!(left_first.executed(), vec![0, 2]);
        assert_eq!(left_first.pending(), vec![1, 0]);
    }

    #[test]
    fn same_side_and_literal_comparisons_are_ignored() {
        let cond = Expr::or(vec![
            Expr::eq(Expr::col(0), Expr::col(1)),
            Expr::eq(Expr::col(0), Expr::lit(5)),
            Expr::compare(CompareOp::Lt, Expr::col(0), Expr::col(2)),
        ]);
        assert!(extract(&cond, 2, JoinSide::Right).is_empty());
    }

    #[test]
    fn disjunctive_pairs_are_not_pushed_as_equalities() {
        // (l.0 = r.0 OR l.1 = r.1) AND l.0 = r.1, left is 2 wide
        let cond = Expr::and(vec![
            Expr::or(vec![Expr::eq(Expr::col(0), Expr::col(2)), Expr::eq(Expr::col(1), Expr::col(3))]),
            Expr::eq(Expr::col(0), Expr::col(3)),
        ]);
        let projections = extract(&cond, 2, JoinSide::Left);
        assert_eq!(projections.pairs.len(), 3);
        assert_eq!(
            projections.equalities(),
            vec![JoinPair { executed: 0, pending: 1, op: CompareOp::Eq, conjunct: true }]
        );

        let only_or = Expr::or(vec![Expr::eq(Expr::col(0), Expr::col(2)), Expr::eq(Expr::col(1), Expr::col(3))]);
        let projections = extract(&only_or, 2, JoinSide::Left);
        assert_eq!(projections.pairs.len(), 2);
        assert!(projections.equalities().is_empty());
    }
}
