// SPDX-License-Identifier: Apache-2.0

//! Join streaming: runs one side of a cross-store join first and pushes its
//! key values into the other side as a disjunctive equality filter.

pub mod condition;
pub mod executor;
pub mod filter;

pub use condition::{extract, JoinPair, JoinProjections, JoinSide};
pub use executor::JoinStreamer;
pub use filter::synthesize;
