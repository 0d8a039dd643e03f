// SPDX-License-Identifier: Apache-2.0

//! Partition assignment
//!
//! A row's partition is a pure function of its partitioning-column value.
//! Missing values are represented by [`PartitionKey::Unassigned`], never by
//! a reserved data value, and always land in the function's unbound
//! partition.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use polyfed_core::{EngineError, EngineResult, PartitionId, PolyValue};

/// Partitioning-column value of one row
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionKey {
    Value(PolyValue),
    Unassigned,
}

impl PartitionKey {
    /// SQL null becomes `Unassigned`.
    pub fn from_value(value: &PolyValue) -> Self {
        if value.is_null() {
            PartitionKey::Unassigned
        } else {
            PartitionKey::Value(value.clone())
        }
    }
}

/// Inclusive value range owned by one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBound {
    pub partition: PartitionId,
    pub lower: PolyValue,
    pub upper: PolyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionFunction {
    /// CRC32 of the canonical key text modulo the partition count
    Hash {
        partitions: Vec<PartitionId>,
        unbound: PartitionId,
    },
    /// First range containing the value wins
    Range {
        ranges: Vec<RangeBound>,
        unbound: PartitionId,
    },
    /// First list containing an equal value wins
    List {
        lists: Vec<(PartitionId, Vec<PolyValue>)>,
        unbound: PartitionId,
    },
}

impl PartitionFunction {
    pub fn hash(partitions: Vec<PartitionId>) -> EngineResult<Self> {
        let unbound = *partitions
            .first()
            .ok_or_else(|| EngineError::validation("Hash partitioning needs at least one partition"))?;
        Ok(PartitionFunction::Hash { partitions, unbound })
    }

    /// Partition receiving rows whose key is unassigned or unmatched.
    pub fn unbound(&self) -> PartitionId {
        match self {
            PartitionFunction::Hash { unbound, .. }
            | PartitionFunction::Range { unbound, .. }
            | PartitionFunction::List { unbound, .. } => *unbound,
        }
    }

    /// Every partition this function can return.
    pub fn partitions(&self) -> Vec<PartitionId> {
        let mut ids: Vec<PartitionId> = match self {
            PartitionFunction::Hash { partitions, .. } => partitions.clone(),
            PartitionFunction::Range { ranges, .. } => ranges.iter().map(|r| r.partition).collect(),
            PartitionFunction::List { lists, .. } => lists.iter().map(|(p, _)| *p).collect(),
        };
        ids.push(self.unbound());
        ids.sort();
        ids.dedup();
        ids
    }

    /// Fails if the function refers to partitions outside `known`.
    pub fn validate(&self, known: &[PartitionId]) -> EngineResult<()> {
        if let PartitionFunction::Hash { partitions, .. } = self {
            if partitions.is_empty() {
                return Err(EngineError::validation("Hash partitioning needs at least one partition"));
            }
        }
        if let PartitionFunction::Range { ranges, .. } = self {
            for range in ranges {
                if range.lower.compare(&range.upper) == Some(Ordering::Greater) {
                    return Err(EngineError::validation(format!(
                        "Range of partition {} has lower bound {} above upper bound {}",
                        range.partition, range.lower, range.upper
                    )));
                }
            }
        }
        match self.partitions().into_iter().find(|p| !known.contains(p)) {
            Some(unknown) => Err(EngineError::validation(format!("Unknown partition {unknown}"))),
            None => Ok(()),
        }
    }

    pub fn assign(&self, key: &PartitionKey) -> PartitionId {
        let PartitionKey::Value(value) = key else {
            return self.unbound();
        };
        match self {
            PartitionFunction::Hash { partitions, unbound } => {
                if partitions.is_empty() {
                    return *unbound;
                }
                let hash = crc32fast::hash(value.key_text().as_bytes());
                partitions[hash as usize % partitions.len()]
            }
            PartitionFunction::Range { ranges, unbound } => ranges
                .iter()
                .find(|r| {
                    matches!(value.compare(&r.lower), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(value.compare(&r.upper), Some(Ordering::Less | Ordering::Equal))
                })
                .map_or(*unbound, |r| r.partition),
            PartitionFunction::List { lists, unbound } => lists
                .iter()
                .find(|(_, values)| values.iter().any(|v| value.sql_eq(v) == Some(true)))
                .map_or(*unbound, |(p, _)| *p),
        }
    }

    pub fn assign_value(&self, value: &PolyValue) -> PartitionId {
        self.assign(&PartitionKey::from_value(value))
    }
}
