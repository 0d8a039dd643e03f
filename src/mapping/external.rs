// SPDX-License-Identifier: Apache-2.0

//! Generic external family (JSON values).
//!
//! This family only ever receives data: canonical values are rendered to
//! `serde_json::Value` for consumers outside the engine. Reading JSON back
//! into canonical form is refused with [`EngineError::WrongDirection`].

use serde_json::{Map, Number, Value};

use polyfed_core::{ColumnType, Conversion, EngineError, EngineResult, PolyValue};

use super::{
    canonical_bool, canonical_bytes, canonical_date, canonical_decimal, canonical_f32,
    canonical_f64, canonical_i64, canonical_interval, canonical_json, canonical_list,
    canonical_map, canonical_text, canonical_time, canonical_timestamp, reject_non_null, Family,
    TypeSpace,
};

const FAMILY: Family = Family::External;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalSpace;

impl TypeSpace for ExternalSpace {
    type Native = Value;

    fn family(&self) -> Family {
        FAMILY
    }

    fn null(&self) -> Value {
        Value::Null
    }

    fn is_null(&self, native: &Value) -> bool {
        native.is_null()
    }

    fn encode(&self, conversion: Conversion, value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
        match conversion {
            Conversion::Boolean => canonical_bool(value, ty, FAMILY).map(Value::Bool),
            Conversion::TinyInt
            | Conversion::SmallInt
            | Conversion::Integer
            | Conversion::BigInt => canonical_i64(value, ty, FAMILY).map(|v| Value::Number(v.into())),
            // Text keeps arbitrary precision; JSON numbers are doubles for most consumers.
            Conversion::Decimal => canonical_decimal(value, ty, FAMILY).map(|d| Value::String(d.to_string())),
            Conversion::Real => canonical_f32(value, ty, FAMILY).map(|f| float(f as f64)),
            Conversion::Double => canonical_f64(value, ty, FAMILY).map(float),
            Conversion::Date => canonical_date(value, ty, FAMILY).map(|d| Value::String(d.to_string())),
            Conversion::Time => canonical_time(value, ty, FAMILY).map(|t| Value::String(t.to_string())),
            Conversion::Timestamp => {
                canonical_timestamp(value, ty, FAMILY).map(|t| Value::String(t.to_string()))
            }
            Conversion::Interval => canonical_interval(value, ty, FAMILY).map(|v| Value::Number(v.into())),
            Conversion::Char | Conversion::Varchar => {
                canonical_text(value, ty, FAMILY).map(|s| Value::String(s.value.clone()))
            }
            Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => {
                canonical_bytes(value, ty, FAMILY).map(|b| Value::String(b.to_base64()))
            }
            Conversion::Array => self.to_array(value, ty),
            Conversion::Map => self.to_map(value, ty),
            Conversion::Json => {
                let text = canonical_json(value, ty, FAMILY)?;
                Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
            }
            Conversion::Object => serde_json::to_value(value)
                .map_err(|e| EngineError::conversion_cast(ty.kind, FAMILY.as_str(), e.to_string())),
            Conversion::Null => Err(reject_non_null(value, ty, FAMILY)),
        }
    }

    fn decode(&self, _conversion: Conversion, _native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
        Err(EngineError::wrong_direction(ty.kind, FAMILY.as_str()))
    }
}

impl ExternalSpace {
    fn to_array(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
        let component = ty.component_type()?;
        let items = canonical_list(value, ty, FAMILY)?
            .iter()
            .map(|item| self.map_to_native(item, component))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Value::Array(items))
    }

    /// Maps with text keys become objects; any other key type becomes a
    /// list of `{"key", "value"}` entries.
    fn to_map(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
        let key_ty = ty.key_type()?;
        let value_ty = ty.value_type()?;
        let map = canonical_map(value, ty, FAMILY)?;

        if map.iter().all(|(k, _)| matches!(k, PolyValue::String(_))) {
            let mut object = Map::new();
            for (k, v) in map.iter() {
                object.insert(k.to_text(), self.map_to_native(v, value_ty)?);
            }
            return Ok(Value::Object(object));
        }

        let entries = map
            .iter()
            .map(|(k, v)| {
                let mut entry = Map::new();
                entry.insert("key".into(), self.map_to_native(k, key_ty)?);
                entry.insert("value".into(), self.map_to_native(v, value_ty)?);
                Ok(Value::Object(entry))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Value::Array(entries))
    }
}

fn float(v: f64) -> Value {
    Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}
