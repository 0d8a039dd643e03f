// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration
//!
//! Two knobs: the number of rows pulled per migration batch and the
//! wall-clock timeout applied to each query or migration call. Both can be
//! changed while the engine runs; a migration reads them once at start.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use polyfed_core::{EngineError, EngineResult};

pub const DEFAULT_MIGRATION_BATCH_SIZE: usize = 1000;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 60_000;

const BATCH_SIZE_ENV: &str = "POLYFED_MIGRATION_BATCH_SIZE";
const TIMEOUT_ENV: &str = "POLYFED_QUERY_TIMEOUT_MS";

/// Serializable form of the runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_batch_size")]
    pub migration_batch_size: usize,
    #[serde(default = "default_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    DEFAULT_MIGRATION_BATCH_SIZE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            migration_batch_size: DEFAULT_MIGRATION_BATCH_SIZE,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
        }
    }
}

impl RuntimeSettings {
    pub fn validate(&self) -> EngineResult<()> {
        if self.migration_batch_size == 0 {
            return Err(EngineError::validation("migration_batch_size must be at least 1"));
        }
        if self.query_timeout_ms == 0 {
            return Err(EngineError::validation("query_timeout_ms must be at least 1"));
        }
        Ok(())
    }
}

/// Live configuration shared as `Arc<RuntimeConfig>`
#[derive(Debug)]
pub struct RuntimeConfig {
    migration_batch_size: AtomicUsize,
    query_timeout_ms: AtomicU64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_settings(RuntimeSettings::default())
    }
}

impl RuntimeConfig {
    fn from_settings(settings: RuntimeSettings) -> Self {
        Self {
            migration_batch_size: AtomicUsize::new(settings.migration_batch_size),
            query_timeout_ms: AtomicU64::new(settings.query_timeout_ms),
        }
    }

    pub fn new(settings: RuntimeSettings) -> EngineResult<Self> {
        settings.validate()?;
        Ok(Self::from_settings(settings))
    }

    /// Defaults overridden by `POLYFED_MIGRATION_BATCH_SIZE` and
    /// `POLYFED_QUERY_TIMEOUT_MS` when set.
    pub fn from_env() -> EngineResult<Self> {
        let mut settings = RuntimeSettings::default();
        if let Some(value) = read_env(BATCH_SIZE_ENV)? {
            settings.migration_batch_size = value as usize;
        }
        if let Some(value) = read_env(TIMEOUT_ENV)? {
            settings.query_timeout_ms = value;
        }
        Self::new(settings)
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        let settings: RuntimeSettings = serde_json::from_str(json)
            .map_err(|e| EngineError::validation(format!("Invalid runtime configuration: {e}")))?;
        Self::new(settings)
    }

    pub fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            migration_batch_size: self.migration_batch_size(),
            query_timeout_ms: self.query_timeout_ms.load(Ordering::Relaxed),
        }
    }

    pub fn migration_batch_size(&self) -> usize {
        self.migration_batch_size.load(Ordering::Relaxed)
    }

    pub fn set_migration_batch_size(&self, size: usize) -> EngineResult<()> {
        if size == 0 {
            return Err(EngineError::validation("migration_batch_size must be at least 1"));
        }
        self.migration_batch_size.store(size, Ordering::Relaxed);
        tracing::info!(batch_size = size, "Migration batch size changed");
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_query_timeout(&self, timeout: Duration) -> EngineResult<()> {
        let ms = timeout.as_millis() as u64;
        if ms == 0 {
            return Err(EngineError::validation("query_timeout_ms must be at least 1"));
        }
        self.query_timeout_ms.store(ms, Ordering::Relaxed);
        Ok(())
    }
}

fn read_env(name: &str) -> EngineResult<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| EngineError::validation(format!("{name}='{raw}': {e}"))),
        Err(_) => Ok(None),
    }
}
