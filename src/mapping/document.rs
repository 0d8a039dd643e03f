// SPDX-License-Identifier: Apache-2.0

//! Document-store family (BSON).

use std::str::FromStr;

use bigdecimal::BigDecimal;
use mongodb::bson::{self, spec::BinarySubtype, Binary, Bson, Document};

use polyfed_core::{
    ColumnType, Conversion, DateString, EngineError, EngineResult, PolyList, PolyMap, PolyValue,
    TimeString, TimestampString,
};

use super::{
    canonical_bool, canonical_bytes, canonical_date, canonical_decimal, canonical_f32,
    canonical_f64, canonical_i64, canonical_interval, canonical_json, canonical_list,
    canonical_map, canonical_text, canonical_time, canonical_timestamp, cast_error, from_decimal,
    reject_non_null, text_value, ByteSource, Family, TypeSpace,
};

const FAMILY: Family = Family::Document;
const MILLIS_PER_DAY: i64 = 86_400_000;
const MAP_KEY: &str = "k";
const MAP_VALUE: &str = "v";

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentSpace;

impl TypeSpace for DocumentSpace {
    type Native = Bson;

    fn family(&self) -> Family {
        FAMILY
    }

    fn null(&self) -> Bson {
        Bson::Null
    }

    fn is_null(&self, native: &Bson) -> bool {
        matches!(native, Bson::Null | Bson::Undefined)
    }

    fn encode(&self, conversion: Conversion, value: &PolyValue, ty: &ColumnType) -> EngineResult<Bson> {
        match conversion {
            Conversion::Boolean => canonical_bool(value, ty, FAMILY).map(Bson::Boolean),
            Conversion::TinyInt | Conversion::SmallInt | Conversion::Integer => {
                let v = canonical_i64(value, ty, FAMILY)?;
                i32::try_from(v)
                    .map(Bson::Int32)
                    .map_err(|_| cast_error(ty, FAMILY, format!("{v} outside INTEGER")))
            }
            Conversion::BigInt => canonical_i64(value, ty, FAMILY).map(Bson::Int64),
            // Decimal128 has no lossless path for arbitrary precision; text does.
            Conversion::Decimal => canonical_decimal(value, ty, FAMILY).map(|d| Bson::String(d.to_string())),
            Conversion::Real => canonical_f32(value, ty, FAMILY).map(|f| Bson::Double(f as f64)),
            Conversion::Double => canonical_f64(value, ty, FAMILY).map(Bson::Double),
            Conversion::Date => canonical_date(value, ty, FAMILY)
                .map(|d| Bson::DateTime(bson::DateTime::from_millis(d.millis_since_epoch()))),
            Conversion::Time => canonical_time(value, ty, FAMILY).map(|t| Bson::Int64(t.millis_of_day())),
            Conversion::Timestamp => canonical_timestamp(value, ty, FAMILY)
                .map(|t| Bson::DateTime(bson::DateTime::from_millis(t.millis_since_epoch()))),
            Conversion::Interval => canonical_interval(value, ty, FAMILY).map(Bson::Int64),
            Conversion::Char | Conversion::Varchar => {
                canonical_text(value, ty, FAMILY).map(|s| Bson::String(s.value.clone()))
            }
            Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => {
                canonical_bytes(value, ty, FAMILY).map(|b| {
                    Bson::Binary(Binary {
                        subtype: BinarySubtype::Generic,
                        bytes: b.0.clone(),
                    })
                })
            }
            Conversion::Array => self.to_array(value, ty),
            Conversion::Map => self.to_map(value, ty),
            Conversion::Json => canonical_json(value, ty, FAMILY).map(|s| Bson::String(s.to_string())),
            Conversion::Object => bson::to_bson(value)
                .map_err(|e| EngineError::conversion_cast(ty.kind, FAMILY.as_str(), e.to_string())),
            Conversion::Null => Err(reject_non_null(value, ty, FAMILY)),
        }
    }

    fn decode(&self, conversion: Conversion, native: &Bson, ty: &ColumnType) -> EngineResult<PolyValue> {
        match conversion {
            Conversion::Boolean => match native {
                Bson::Boolean(b) => Ok(PolyValue::Boolean(*b)),
                other => Err(cast_error(ty, FAMILY, other.element_type_name())),
            },
            Conversion::TinyInt
            | Conversion::SmallInt
            | Conversion::Integer
            | Conversion::BigInt
            | Conversion::Decimal => {
                let decimal = native_decimal(native, ty)?;
                from_decimal(conversion, decimal, ty, FAMILY)
            }
            Conversion::Real => from_double(native, ty).map(|f| PolyValue::Real(f as f32)),
            Conversion::Double => from_double(native, ty).map(PolyValue::Double),
            Conversion::Date => from_date(native, ty),
            Conversion::Time => from_time(native, ty),
            Conversion::Timestamp => from_timestamp(native, ty),
            Conversion::Interval => match native {
                Bson::Int64(v) => Ok(PolyValue::Interval(*v)),
                Bson::Int32(v) => Ok(PolyValue::Interval(*v as i64)),
                other => Err(cast_error(ty, FAMILY, other.element_type_name())),
            },
            Conversion::Char | Conversion::Varchar => match native {
                Bson::String(s) | Bson::Symbol(s) => Ok(text_value(s.clone(), ty)),
                other => Err(cast_error(ty, FAMILY, other.element_type_name())),
            },
            Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => {
                let source = match native {
                    Bson::Binary(b) => ByteSource::Bytes(b.bytes.clone()),
                    Bson::String(s) => ByteSource::Base64(s.clone()),
                    other => return Err(cast_error(ty, FAMILY, other.element_type_name())),
                };
                source.drain().map(PolyValue::Binary)
            }
            Conversion::Array => self.from_array(native, ty),
            Conversion::Map => self.from_map(native, ty),
            Conversion::Json => match native {
                Bson::String(s) => Ok(PolyValue::Json(s.clone())),
                Bson::Document(d) => serde_json::to_string(d)
                    .map(PolyValue::Json)
                    .map_err(|e| EngineError::conversion_cast(ty.kind, FAMILY.as_str(), e.to_string())),
                other => Err(cast_error(ty, FAMILY, other.element_type_name())),
            },
            Conversion::Object => bson::from_bson(native.clone())
                .map_err(|e| EngineError::conversion_cast(ty.kind, FAMILY.as_str(), e.to_string())),
            Conversion::Null => Ok(PolyValue::Null),
        }
    }
}

impl DocumentSpace {
    fn to_array(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<Bson> {
        let component = ty.component_type()?;
        canonical_list(value, ty, FAMILY)?
            .iter()
            .map(|item| self.map_to_native(item, component))
            .collect::<EngineResult<Vec<_>>>()
            .map(Bson::Array)
    }

    fn from_array(&self, native: &Bson, ty: &ColumnType) -> EngineResult<PolyValue> {
        let component = ty.component_type()?;
        let Bson::Array(items) = native else {
            return Err(cast_error(ty, FAMILY, native.element_type_name()));
        };
        items
            .iter()
            .map(|item| self.map_to_canonical(item, component))
            .collect::<EngineResult<PolyList>>()
            .map(PolyValue::List)
    }

    /// Document keys must be strings, so maps are stored as an array of
    /// `{k, v}` entries to keep non-text keys intact.
    fn to_map(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<Bson> {
        let key_ty = ty.key_type()?;
        let value_ty = ty.value_type()?;
        canonical_map(value, ty, FAMILY)?
            .iter()
            .map(|(k, v)| {
                let mut entry = Document::new();
                entry.insert(MAP_KEY, self.map_to_native(k, key_ty)?);
                entry.insert(MAP_VALUE, self.map_to_native(v, value_ty)?);
                Ok(Bson::Document(entry))
            })
            .collect::<EngineResult<Vec<_>>>()
            .map(Bson::Array)
    }

    fn from_map(&self, native: &Bson, ty: &ColumnType) -> EngineResult<PolyValue> {
        let key_ty = ty.key_type()?;
        let value_ty = ty.value_type()?;
        let mut map = PolyMap::new();
        match native {
            Bson::Array(entries) => {
                for entry in entries {
                    let Bson::Document(entry) = entry else {
                        return Err(cast_error(ty, FAMILY, format!("map entry {}", entry.element_type_name())));
                    };
                    let key = entry.get(MAP_KEY).unwrap_or(&Bson::Null);
                    let value = entry.get(MAP_VALUE).unwrap_or(&Bson::Null);
                    map.insert(
                        self.map_to_canonical(key, key_ty)?,
                        self.map_to_canonical(value, value_ty)?,
                    );
                }
            }
            // Plain sub-documents written by other clients.
            Bson::Document(document) => {
                for (key, value) in document {
                    map.insert(
                        self.map_to_canonical(&Bson::String(key.clone()), key_ty)?,
                        self.map_to_canonical(value, value_ty)?,
                    );
                }
            }
            other => return Err(cast_error(ty, FAMILY, other.element_type_name())),
        }
        Ok(PolyValue::Map(map))
    }
}

fn native_decimal(native: &Bson, ty: &ColumnType) -> EngineResult<BigDecimal> {
    let parse = |text: &str| {
        BigDecimal::from_str(text.trim()).map_err(|e| {
            EngineError::conversion_cast(ty.kind, FAMILY.as_str(), format!("'{text}' is not a number: {e}"))
        })
    };
    match native {
        Bson::Int32(v) => Ok(BigDecimal::from(*v)),
        Bson::Int64(v) => Ok(BigDecimal::from(*v)),
        Bson::String(s) => parse(s),
        Bson::Double(f) => BigDecimal::try_from(*f)
            .map_err(|e| EngineError::conversion_cast(ty.kind, FAMILY.as_str(), e.to_string())),
        other => Err(cast_error(ty, FAMILY, other.element_type_name())),
    }
}

fn from_double(native: &Bson, ty: &ColumnType) -> EngineResult<f64> {
    match native {
        Bson::Double(f) => Ok(*f),
        Bson::Int32(v) => Ok(*v as f64),
        Bson::Int64(v) => Ok(*v as f64),
        other => Err(cast_error(ty, FAMILY, other.element_type_name())),
    }
}

fn from_date(native: &Bson, ty: &ColumnType) -> EngineResult<PolyValue> {
    match native {
        Bson::DateTime(dt) => Ok(PolyValue::Date(DateString::from_days_since_epoch(
            dt.timestamp_millis().div_euclid(MILLIS_PER_DAY) as i32,
        ))),
        Bson::String(s) => s.parse().map(PolyValue::Date),
        other => Err(cast_error(ty, FAMILY, other.element_type_name())),
    }
}

fn from_time(native: &Bson, ty: &ColumnType) -> EngineResult<PolyValue> {
    match native {
        Bson::Int64(v) => TimeString::from_millis_of_day(*v).map(PolyValue::Time),
        Bson::Int32(v) => TimeString::from_millis_of_day(*v as i64).map(PolyValue::Time),
        Bson::String(s) => s.parse().map(PolyValue::Time),
        other => Err(cast_error(ty, FAMILY, other.element_type_name())),
    }
}

fn from_timestamp(native: &Bson, ty: &ColumnType) -> EngineResult<PolyValue> {
    match native {
        Bson::DateTime(dt) => Ok(PolyValue::Timestamp(TimestampString::from_millis_since_epoch(
            dt.timestamp_millis(),
        ))),
        Bson::String(s) => s.parse().map(PolyValue::Timestamp),
        other => Err(cast_error(ty, FAMILY, other.element_type_name())),
    }
}

trait ElementTypeName {
    fn element_type_name(&self) -> &'static str;
}

impl ElementTypeName for Bson {
    fn element_type_name(&self) -> &'static str {
        match self {
            Bson::Null => "null",
            Bson::Boolean(_) => "boolean",
            Bson::Int32(_) => "int32",
            Bson::Int64(_) => "int64",
            Bson::Double(_) => "double",
            Bson::String(_) => "string",
            Bson::ObjectId(_) => "ObjectId",
            Bson::DateTime(_) => "datetime",
            Bson::Array(_) => "array",
            Bson::Document(_) => "document",
            Bson::Binary(_) => "binary",
            Bson::Decimal128(_) => "decimal128",
            _ => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use polyfed_core::{ByteString, PolyType};

    #[test]
    fn small_integers_widen_to_int32() {
        let space = DocumentSpace;
        let ty = ColumnType::of(PolyType::TinyInt);
        let native = space.map_to_native(&PolyValue::TinyInt(-128), &ty).unwrap();
        assert_eq!(native, Bson::Int32(-128));
        assert_eq!(space.map_to_canonical(&native, &ty).unwrap(), PolyValue::TinyInt(-128));
    }

    #[test]
    fn base64_strings_are_accepted_for_binary() {
        let space = DocumentSpace;
        let ty = ColumnType::of(PolyType::Image);
        let value = space
            .map_to_canonical(&Bson::String("AAH/".into()), &ty)
            .unwrap();
        assert_eq!(value, PolyValue::Binary(ByteString::new(vec![0, 1, 255])));
    }

    #[test]
    fn maps_accept_plain_sub_documents() {
        let space = DocumentSpace;
        let ty = ColumnType::map(PolyType::Varchar.into(), PolyType::Integer.into());
        let native = Bson::Document(doc! { "a": 1, "b": 2 });
        let value = space.map_to_canonical(&native, &ty).unwrap();
        assert_eq!(value, PolyValue::Map(PolyMap::new().with("a", 1).with("b", 2)));
    }

    #[test]
    fn dates_before_epoch_floor_to_the_day() {
        let space = DocumentSpace;
        let ty = ColumnType::of(PolyType::Date);
        let date = PolyValue::Date("1950-06-15".parse().unwrap());
        let native = space.map_to_native(&date, &ty).unwrap();
        assert_eq!(space.map_to_canonical(&native, &ty).unwrap(), date);
    }

    #[test]
    fn opaque_values_survive_as_bson() {
        let space = DocumentSpace;
        let ty = ColumnType::of(PolyType::Any);
        let value = PolyValue::List(PolyList::new(vec![
            PolyValue::Symbol("x".into()),
            PolyValue::decimal("3.25").unwrap(),
        ]));
        let native = space.map_to_native(&value, &ty).unwrap();
        assert_eq!(space.map_to_canonical(&native, &ty).unwrap(), value);
    }
}
