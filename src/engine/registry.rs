// SPDX-License-Identifier: Apache-2.0

//! Adapter Registry
//!
//! Central registry of the backing stores known to this process, keyed by
//! adapter id.

use std::collections::HashMap;
use std::sync::Arc;

use polyfed_core::{AdapterId, EngineError, EngineResult};

use crate::engine::traits::AdapterDriver;
use crate::engine::types::AdapterInfo;

/// Registry that holds all available adapters
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<AdapterId, Arc<dyn AdapterDriver>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its `adapter_id()`, replacing any previous
    /// adapter with the same id.
    pub fn register(&mut self, adapter: Arc<dyn AdapterDriver>) {
        self.adapters.insert(adapter.adapter_id(), adapter);
    }

    pub fn get(&self, id: AdapterId) -> Option<Arc<dyn AdapterDriver>> {
        self.adapters.get(&id).cloned()
    }

    /// Like [`AdapterRegistry::get`] but fails with `AdapterNotFound`.
    pub fn require(&self, id: AdapterId) -> EngineResult<Arc<dyn AdapterDriver>> {
        self.get(id).ok_or_else(|| EngineError::adapter_not_found(id))
    }

    /// Registered adapter ids, ascending.
    pub fn list(&self) -> Vec<AdapterId> {
        let mut ids: Vec<AdapterId> = self.adapters.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn list_infos(&self) -> Vec<AdapterInfo> {
        let mut infos: Vec<AdapterInfo> = self
            .adapters
            .values()
            .map(|adapter| AdapterInfo {
                id: adapter.adapter_id(),
                name: adapter.adapter_name().to_string(),
                family: adapter.family(),
                capabilities: adapter.capabilities(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::traits::{BoundStatement, RowCursor};
    use crate::engine::types::{AdapterCapabilities, TableDefinition};
    use crate::mapping::Family;
    use crate::plan::{PhysicalTable, Plan};

    struct MockAdapter {
        id: AdapterId,
    }

    impl AdapterDriver for MockAdapter {
        fn adapter_id(&self) -> AdapterId {
            self.id
        }

        fn adapter_name(&self) -> &str {
            "Mock Adapter"
        }

        fn family(&self) -> Family {
            Family::Canonical
        }

        fn capabilities(&self) -> AdapterCapabilities {
            AdapterCapabilities {
                transactions: false,
                pushdown: false,
                documents: false,
                graphs: false,
                blob_files: false,
            }
        }

        fn create_table(&self, _definition: &TableDefinition) -> EngineResult<()> {
            Ok(())
        }

        fn drop_table(&self, _table: &PhysicalTable) -> EngineResult<()> {
            Ok(())
        }

        fn row_count_estimate(&self, _table: &PhysicalTable) -> EngineResult<Option<u64>> {
            Ok(None)
        }

        fn cursor(&self, plan: &Plan) -> EngineResult<RowCursor> {
            Ok(RowCursor::from_rows(plan.fields(), vec![]))
        }

        fn prepare(&self, _plan: &Plan) -> EngineResult<Box<dyn BoundStatement>> {
            Err(EngineError::not_supported("mock"))
        }
    }

    #[test]
    fn test_registry_basics() {
        let mut registry = AdapterRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(MockAdapter { id: AdapterId(2) }));
        registry.register(Arc::new(MockAdapter { id: AdapterId(1) }));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list(), vec![AdapterId(1), AdapterId(2)]);

        assert!(registry.get(AdapterId(1)).is_some());
        assert!(matches!(
            registry.require(AdapterId(7)),
            Err(EngineError::AdapterNotFound { adapter_id: AdapterId(7) })
        ));
    }

    #[test]
    fn test_list_infos() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(MockAdapter { id: AdapterId(3) }));

        let infos = registry.list_infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].id, AdapterId(3));
        assert_eq!(infos[0].name, "Mock Adapter");
        assert_eq!(infos[0].family, Family::Canonical);
    }
}
