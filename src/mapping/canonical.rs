// SPDX-License-Identifier: Apache-2.0

//! Identity family for adapters that store canonical values directly.

use polyfed_core::{ColumnType, Conversion, EngineResult, PolyType, PolyValue};

use super::{Family, TypeSpace};

#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalSpace;

impl TypeSpace for CanonicalSpace {
    type Native = PolyValue;

    fn family(&self) -> Family {
        Family::Canonical
    }

    fn null(&self) -> PolyValue {
        PolyValue::Null
    }

    fn is_null(&self, native: &PolyValue) -> bool {
        native.is_null()
    }

    fn needs_mapping(&self, _ty: PolyType) -> bool {
        false
    }

    fn passthrough_native(&self, value: &PolyValue) -> Option<PolyValue> {
        Some(value.clone())
    }

    fn passthrough_canonical(&self, native: &PolyValue) -> Option<PolyValue> {
        Some(native.clone())
    }

    fn encode(&self, _conversion: Conversion, value: &PolyValue, _ty: &ColumnType) -> EngineResult<PolyValue> {
        Ok(value.clone())
    }

    fn decode(&self, _conversion: Conversion, native: &PolyValue, _ty: &ColumnType) -> EngineResult<PolyValue> {
        Ok(native.clone())
    }
}
