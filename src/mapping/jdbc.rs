// SPDX-License-Identifier: Apache-2.0

//! Relational (JDBC-style) family backed by DuckDB values.
//!
//! Encoding produces exactly the value the DuckDB adapter binds: plain
//! scalars, blobs and text. Decimals and temporal values travel as their
//! canonical text and are cast into the typed column by the statement;
//! intervals are a scalar; arrays and maps are JSON text.
//!
//! Decoding is lenient the way a result-set getter is: an integer column
//! may come back as any integer width, a decimal as text, a date as a
//! timestamp or a typed `DATE`.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use duckdb::types::{TimeUnit, Value};

use polyfed_core::{
    ColumnType, Conversion, DateString, EngineError, EngineResult, PolyList, PolyMap, PolyValue,
    TimeString, TimestampString,
};

use super::{
    canonical_bool, canonical_bytes, canonical_date, canonical_decimal, canonical_f32,
    canonical_f64, canonical_i64, canonical_interval, canonical_json, canonical_list,
    canonical_map, canonical_text, canonical_time, canonical_timestamp, cast_error, from_decimal,
    object_from_text, object_to_text, reject_non_null, text_value, Family, TypeSpace,
};

const FAMILY: Family = Family::Jdbc;
const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct JdbcSpace;

impl TypeSpace for JdbcSpace {
    type Native = Value;

    fn family(&self) -> Family {
        FAMILY
    }

    fn null(&self) -> Value {
        Value::Null
    }

    fn is_null(&self, native: &Value) -> bool {
        matches!(native, Value::Null)
    }

    fn encode(&self, conversion: Conversion, value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
        match conversion {
            Conversion::Boolean => canonical_bool(value, ty, FAMILY).map(Value::Boolean),
            Conversion::TinyInt => to_tiny_int(value, ty),
            Conversion::SmallInt => to_small_int(value, ty),
            Conversion::Integer => to_integer(value, ty),
            Conversion::BigInt => canonical_i64(value, ty, FAMILY).map(Value::BigInt),
            Conversion::Decimal => {
                canonical_decimal(value, ty, FAMILY).map(|d| Value::Text(d.normalized().to_string()))
            }
            Conversion::Real => canonical_f32(value, ty, FAMILY).map(Value::Float),
            Conversion::Double => canonical_f64(value, ty, FAMILY).map(Value::Double),
            Conversion::Date => canonical_date(value, ty, FAMILY).map(|d| Value::Text(d.to_string())),
            Conversion::Time => canonical_time(value, ty, FAMILY).map(|t| Value::Text(t.to_string())),
            Conversion::Timestamp => canonical_timestamp(value, ty, FAMILY).map(|t| Value::Text(t.to_string())),
            Conversion::Interval => canonical_interval(value, ty, FAMILY).map(Value::BigInt),
            Conversion::Char | Conversion::Varchar => {
                canonical_text(value, ty, FAMILY).map(|s| Value::Text(s.value.clone()))
            }
            Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => {
                canonical_bytes(value, ty, FAMILY).map(|b| Value::Blob(b.0.clone()))
            }
            Conversion::Array => self.to_array(value, ty),
            Conversion::Map => self.to_map(value, ty),
            Conversion::Json => canonical_json(value, ty, FAMILY).map(|s| Value::Text(s.to_string())),
            Conversion::Object => object_to_text(value, ty, FAMILY).map(Value::Text),
            Conversion::Null => Err(reject_non_null(value, ty, FAMILY)),
        }
    }

    fn decode(&self, conversion: Conversion, native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
        match conversion {
            Conversion::Boolean => from_boolean(native, ty),
            Conversion::TinyInt
            | Conversion::SmallInt
            | Conversion::Integer
            | Conversion::BigInt
            | Conversion::Decimal => {
                let decimal = native_decimal(native, ty).ok_or_else(|| cast_error(ty, FAMILY, kind(native)))??;
                from_decimal(conversion, decimal, ty, FAMILY)
            }
            Conversion::Real => from_float(native, ty).map(|f| PolyValue::Real(f as f32)),
            Conversion::Double => from_float(native, ty).map(PolyValue::Double),
            Conversion::Date => from_date(native, ty),
            Conversion::Time => from_time(native, ty),
            Conversion::Timestamp => from_timestamp(native, ty),
            Conversion::Interval => from_interval(native, ty),
            Conversion::Char | Conversion::Varchar => match native {
                Value::Text(s) | Value::Enum(s) => Ok(text_value(s.clone(), ty)),
                other => Err(cast_error(ty, FAMILY, kind(other))),
            },
            Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => match native {
                Value::Blob(b) => Ok(PolyValue::Binary(polyfed_core::ByteString(b.clone()))),
                other => Err(cast_error(ty, FAMILY, kind(other))),
            },
            Conversion::Array => self.from_array(native, ty),
            Conversion::Map => self.from_map(native, ty),
            Conversion::Json => match native {
                Value::Text(s) => Ok(PolyValue::Json(s.clone())),
                other => Err(cast_error(ty, FAMILY, kind(other))),
            },
            Conversion::Object => match native {
                Value::Text(s) => object_from_text(s, ty, FAMILY),
                other => Err(cast_error(ty, FAMILY, kind(other))),
            },
            Conversion::Null => Ok(PolyValue::Null),
        }
    }
}

impl JdbcSpace {
    /// Arrays travel as the JSON of their canonical list, after every item
    /// has been checked against the component type.
    fn to_array(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
        let list = canonical_list(value, ty, FAMILY)?;
        self.check_items(list, ty)?;
        composite_to_text(value, ty)
    }

    fn from_array(&self, native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
        match composite_from_text(native, ty)? {
            PolyValue::List(list) => {
                self.check_items(&list, ty)?;
                Ok(PolyValue::List(list))
            }
            other => Err(cast_error(ty, FAMILY, format!("JSON {}", other.kind_name()))),
        }
    }

    fn check_items(&self, list: &PolyList, ty: &ColumnType) -> EngineResult<()> {
        let component = ty.component_type()?;
        for item in list.iter() {
            self.map_to_native(item, component)?;
        }
        Ok(())
    }

    /// Maps travel as the JSON of their `[key, value]` entries; keys need
    /// not be text.
    fn to_map(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
        let map = canonical_map(value, ty, FAMILY)?;
        self.check_entries(map, ty)?;
        composite_to_text(value, ty)
    }

    fn from_map(&self, native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
        match composite_from_text(native, ty)? {
            PolyValue::Map(map) => {
                self.check_entries(&map, ty)?;
                Ok(PolyValue::Map(map))
            }
            other => Err(cast_error(ty, FAMILY, format!("JSON {}", other.kind_name()))),
        }
    }

    fn check_entries(&self, map: &PolyMap, ty: &ColumnType) -> EngineResult<()> {
        let key_ty = ty.key_type()?;
        let value_ty = ty.value_type()?;
        for (k, v) in map.iter() {
            self.map_to_native(k, key_ty)?;
            self.map_to_native(v, value_ty)?;
        }
        Ok(())
    }
}

fn composite_to_text(value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
    serde_json::to_string(value)
        .map(Value::Text)
        .map_err(|e| EngineError::conversion_cast(ty.kind, FAMILY.as_str(), e.to_string()))
}

fn composite_from_text(native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
    let Value::Text(text) = native else {
        return Err(cast_error(ty, FAMILY, kind(native)));
    };
    serde_json::from_str(text)
        .map_err(|e| EngineError::conversion_cast(ty.kind, FAMILY.as_str(), e.to_string()))
}

fn to_tiny_int(value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
    let v = canonical_i64(value, ty, FAMILY)?;
    i8::try_from(v)
        .map(Value::TinyInt)
        .map_err(|_| cast_error(ty, FAMILY, format!("{v} outside TINYINT")))
}

fn to_small_int(value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
    let v = canonical_i64(value, ty, FAMILY)?;
    i16::try_from(v)
        .map(Value::SmallInt)
        .map_err(|_| cast_error(ty, FAMILY, format!("{v} outside SMALLINT")))
}

fn to_integer(value: &PolyValue, ty: &ColumnType) -> EngineResult<Value> {
    let v = canonical_i64(value, ty, FAMILY)?;
    i32::try_from(v)
        .map(Value::Int)
        .map_err(|_| cast_error(ty, FAMILY, format!("{v} outside INTEGER")))
}

/// Decimal intermediate of any numeric native; `None` for non-numerics.
fn native_decimal(native: &Value, ty: &ColumnType) -> Option<EngineResult<BigDecimal>> {
    let parse = |text: &str| {
        BigDecimal::from_str(text.trim()).map_err(|e| {
            EngineError::conversion_cast(ty.kind, FAMILY.as_str(), format!("'{text}' is not a number: {e}"))
        })
    };
    Some(match native {
        Value::TinyInt(v) => Ok(BigDecimal::from(*v)),
        Value::SmallInt(v) => Ok(BigDecimal::from(*v)),
        Value::Int(v) => Ok(BigDecimal::from(*v)),
        Value::BigInt(v) => Ok(BigDecimal::from(*v)),
        Value::HugeInt(v) => parse(&v.to_string()),
        Value::UTinyInt(v) => Ok(BigDecimal::from(*v)),
        Value::USmallInt(v) => Ok(BigDecimal::from(*v)),
        Value::UInt(v) => Ok(BigDecimal::from(*v)),
        Value::UBigInt(v) => Ok(BigDecimal::from(*v)),
        Value::Decimal(d) => parse(&d.to_string()),
        Value::Text(s) => parse(s),
        _ => return None,
    })
}

fn from_boolean(native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
    match native {
        Value::Boolean(b) => Ok(PolyValue::Boolean(*b)),
        Value::TinyInt(v) => Ok(PolyValue::Boolean(*v != 0)),
        Value::Int(v) => Ok(PolyValue::Boolean(*v != 0)),
        other => Err(cast_error(ty, FAMILY, kind(other))),
    }
}

fn from_float(native: &Value, ty: &ColumnType) -> EngineResult<f64> {
    match native {
        Value::Float(f) => Ok(*f as f64),
        Value::Double(f) => Ok(*f),
        other => match native_decimal(other, ty) {
            Some(decimal) => {
                use bigdecimal::ToPrimitive;
                decimal?.to_f64().ok_or_else(|| cast_error(ty, FAMILY, kind(other)))
            }
            None => Err(cast_error(ty, FAMILY, kind(other))),
        },
    }
}

fn from_date(native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
    match native {
        Value::Date32(days) => Ok(PolyValue::Date(DateString::from_days_since_epoch(*days))),
        Value::Timestamp(unit, v) => {
            let millis = unit_to_millis(*unit, *v, ty)?;
            Ok(PolyValue::Date(DateString::from_days_since_epoch(
                millis.div_euclid(MILLIS_PER_DAY) as i32,
            )))
        }
        Value::Text(s) => s.parse().map(PolyValue::Date),
        other => Err(cast_error(ty, FAMILY, kind(other))),
    }
}

fn from_time(native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
    match native {
        Value::Time64(unit, v) => TimeString::from_millis_of_day(unit_to_millis(*unit, *v, ty)?).map(PolyValue::Time),
        Value::Text(s) => s.parse().map(PolyValue::Time),
        other => Err(cast_error(ty, FAMILY, kind(other))),
    }
}

fn from_timestamp(native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
    match native {
        Value::Timestamp(unit, v) => Ok(PolyValue::Timestamp(TimestampString::from_millis_since_epoch(
            unit_to_millis(*unit, *v, ty)?,
        ))),
        Value::Date32(days) => Ok(PolyValue::Timestamp(TimestampString::from_millis_since_epoch(
            *days as i64 * MILLIS_PER_DAY,
        ))),
        Value::Text(s) => s.parse().map(PolyValue::Timestamp),
        other => Err(cast_error(ty, FAMILY, kind(other))),
    }
}

fn from_interval(native: &Value, ty: &ColumnType) -> EngineResult<PolyValue> {
    match native {
        Value::Interval { months, days, nanos } => {
            if ty.kind.is_year_month_interval() {
                Ok(PolyValue::Interval(*months as i64))
            } else {
                let day_millis = (*months as i64 * 30 + *days as i64) * MILLIS_PER_DAY;
                Ok(PolyValue::Interval(day_millis + nanos.div_euclid(1_000_000)))
            }
        }
        Value::BigInt(v) => Ok(PolyValue::Interval(*v)),
        Value::Int(v) => Ok(PolyValue::Interval(*v as i64)),
        other => Err(cast_error(ty, FAMILY, kind(other))),
    }
}

fn unit_to_millis(unit: TimeUnit, v: i64, ty: &ColumnType) -> EngineResult<i64> {
    match unit {
        TimeUnit::Second => v
            .checked_mul(1000)
            .ok_or_else(|| cast_error(ty, FAMILY, format!("{v}s overflows milliseconds"))),
        TimeUnit::Millisecond => Ok(v),
        TimeUnit::Microsecond => Ok(v.div_euclid(1000)),
        TimeUnit::Nanosecond => Ok(v.div_euclid(1_000_000)),
    }
}

fn kind(native: &Value) -> &'static str {
    match native {
        Value::Null => "NULL",
        Value::Boolean(_) => "BOOLEAN",
        Value::TinyInt(_) => "TINYINT",
        Value::SmallInt(_) => "SMALLINT",
        Value::Int(_) => "INTEGER",
        Value::BigInt(_) => "BIGINT",
        Value::HugeInt(_) => "HUGEINT",
        Value::UTinyInt(_) | Value::USmallInt(_) | Value::UInt(_) | Value::UBigInt(_) => "UNSIGNED",
        Value::Float(_) => "FLOAT",
        Value::Double(_) => "DOUBLE",
        Value::Decimal(_) => "DECIMAL",
        Value::Timestamp(..) => "TIMESTAMP",
        Value::Text(_) => "VARCHAR",
        Value::Blob(_) => "BLOB",
        Value::Date32(_) => "DATE",
        Value::Time64(..) => "TIME",
        Value::Interval { .. } => "INTERVAL",
        Value::List(_) => "LIST",
        Value::Enum(_) => "ENUM",
        Value::Array(_) => "ARRAY",
        _ => "composite",
    }
}
