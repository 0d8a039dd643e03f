// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the PolyFed core
//!
//! Type-mapping, planning, migration and adapter failures all surface as
//! one of these variants so callers can diagnose a failure (table, adapter,
//! poly type) without re-running it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{AdapterId, TableId};
use crate::types::PolyType;

/// Unified error type for all polystore operations
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
pub enum EngineError {
    #[error("No {family} mapping defined for type {poly_type}")]
    UnmappedType { poly_type: String, family: String },

    #[error(
        "The {family} type space cannot map {poly_type} to canonical form; use the other mapping direction"
    )]
    WrongDirection { poly_type: PolyType, family: String },

    #[error("Cannot convert {family} value to {poly_type}: {message}")]
    ConversionCast {
        poly_type: PolyType,
        family: String,
        message: String,
    },

    #[error("Planning failed for table {table_id}: {message}")]
    Planning { table_id: TableId, message: String },

    #[error("Migration of table {table_id} to adapter {adapter_id} failed: {message}")]
    Migration {
        table_id: TableId,
        adapter_id: AdapterId,
        message: String,
        cause: Box<EngineError>,
    },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Query execution error: {message}")]
    ExecutionError { message: String },

    #[error("Adapter not found: {adapter_id}")]
    AdapterNotFound { adapter_id: AdapterId },

    #[error("Invalid plan payload: {message}")]
    Payload { message: String },

    #[error("Feature not supported: {message}")]
    NotSupported { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn unmapped(poly_type: impl Into<String>, family: impl Into<String>) -> Self {
        Self::UnmappedType {
            poly_type: poly_type.into(),
            family: family.into(),
        }
    }

    pub fn wrong_direction(poly_type: PolyType, family: impl Into<String>) -> Self {
        Self::WrongDirection {
            poly_type,
            family: family.into(),
        }
    }

    pub fn conversion_cast(
        poly_type: PolyType,
        family: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::ConversionCast {
            poly_type,
            family: family.into(),
            message: msg.into(),
        }
    }

    pub fn planning(table_id: TableId, msg: impl Into<String>) -> Self {
        Self::Planning {
            table_id,
            message: msg.into(),
        }
    }

    /// Wraps any failure raised while a migration call was in flight.
    pub fn migration(table_id: TableId, adapter_id: AdapterId, cause: EngineError) -> Self {
        Self::Migration {
            table_id,
            adapter_id,
            message: cause.to_string(),
            cause: Box::new(cause),
        }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn adapter_not_found(adapter_id: AdapterId) -> Self {
        Self::AdapterNotFound { adapter_id }
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload { message: msg.into() }
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// Innermost error, unwrapping migration wrappers.
    pub fn root_cause(&self) -> &EngineError {
        match self {
            Self::Migration { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Self::Timeout { .. })
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
