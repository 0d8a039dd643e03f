// SPDX-License-Identifier: Apache-2.0

//! Per-call execution context.
//!
//! One context exists per migration or query. It owns the planning context
//! fragments are rebound to and the wall-clock deadline every blocking
//! adapter call is checked against.

use std::time::{Duration, Instant};

use uuid::Uuid;

use polyfed_core::{EngineError, EngineResult};

use crate::metrics;
use crate::plan::PlannerContext;

#[derive(Debug)]
pub struct ExecutionContext {
    pub id: Uuid,
    started: Instant,
    timeout: Duration,
    planner: PlannerContext,
}

impl ExecutionContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            started: Instant::now(),
            timeout,
            planner: PlannerContext::new(),
        }
    }

    pub fn planner(&self) -> &PlannerContext {
        &self.planner
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started.elapsed())
    }

    /// Fails with `Timeout` when no time is left; called right before every
    /// blocking adapter call.
    pub fn check_deadline(&self) -> EngineResult<()> {
        if self.remaining().is_zero() {
            metrics::record_timeout();
            tracing::warn!(context = %self.id, timeout_ms = self.timeout.as_millis() as u64, "Deadline exceeded");
            return Err(EngineError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            });
        }
        Ok(())
    }
}
