// SPDX-License-Identifier: Apache-2.0

//! Flat-text family used by the file store.
//!
//! Every value becomes a text cell. Composites are JSON arrays of nested
//! cells. Multimedia cells written by the file adapter may instead point
//! at a side file, which is read in full on the way back to canonical.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use polyfed_core::{
    ByteString, ColumnType, Conversion, EngineError, EngineResult, PolyList, PolyMap, PolyValue,
};

use super::{
    canonical_bool, canonical_bytes, canonical_date, canonical_decimal, canonical_f32,
    canonical_f64, canonical_i64, canonical_interval, canonical_json, canonical_list,
    canonical_map, canonical_text, canonical_time, canonical_timestamp, cast_error, from_decimal,
    object_from_text, object_to_text, reject_non_null, text_value, ByteSource, Family, TypeSpace,
};

const FAMILY: Family = Family::File;
const BLOB_KEY: &str = "blob";

/// Native cell of the file store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileCell {
    Null,
    Text(String),
    /// Reference to a side file holding raw bytes
    Blob(PathBuf),
}

impl FileCell {
    fn to_json(&self) -> Json {
        match self {
            FileCell::Null => Json::Null,
            FileCell::Text(s) => Json::String(s.clone()),
            FileCell::Blob(path) => {
                let mut object = serde_json::Map::new();
                object.insert(BLOB_KEY.into(), Json::String(path.display().to_string()));
                Json::Object(object)
            }
        }
    }

    fn from_json(json: &Json) -> FileCell {
        match json {
            Json::Null => FileCell::Null,
            Json::String(s) => FileCell::Text(s.clone()),
            Json::Object(object) => match object.get(BLOB_KEY).and_then(Json::as_str) {
                Some(path) => FileCell::Blob(PathBuf::from(path)),
                None => FileCell::Text(json.to_string()),
            },
            other => FileCell::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileSpace;

impl TypeSpace for FileSpace {
    type Native = FileCell;

    fn family(&self) -> Family {
        FAMILY
    }

    fn null(&self) -> FileCell {
        FileCell::Null
    }

    fn is_null(&self, native: &FileCell) -> bool {
        matches!(native, FileCell::Null)
    }

    fn encode(&self, conversion: Conversion, value: &PolyValue, ty: &ColumnType) -> EngineResult<FileCell> {
        let text = match conversion {
            Conversion::Boolean => canonical_bool(value, ty, FAMILY)?.to_string(),
            Conversion::TinyInt
            | Conversion::SmallInt
            | Conversion::Integer
            | Conversion::BigInt => canonical_i64(value, ty, FAMILY)?.to_string(),
            Conversion::Decimal => canonical_decimal(value, ty, FAMILY)?.to_string(),
            Conversion::Real => canonical_f32(value, ty, FAMILY)?.to_string(),
            Conversion::Double => canonical_f64(value, ty, FAMILY)?.to_string(),
            Conversion::Date => canonical_date(value, ty, FAMILY)?.to_string(),
            Conversion::Time => canonical_time(value, ty, FAMILY)?.to_string(),
            Conversion::Timestamp => canonical_timestamp(value, ty, FAMILY)?.to_string(),
            Conversion::Interval => canonical_interval(value, ty, FAMILY)?.to_string(),
            Conversion::Char | Conversion::Varchar => canonical_text(value, ty, FAMILY)?.value.clone(),
            Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => {
                canonical_bytes(value, ty, FAMILY)?.to_base64()
            }
            Conversion::Array => self.to_array(value, ty)?,
            Conversion::Map => self.to_map(value, ty)?,
            Conversion::Json => canonical_json(value, ty, FAMILY)?.to_string(),
            Conversion::Object => object_to_text(value, ty, FAMILY)?,
            Conversion::Null => return Err(reject_non_null(value, ty, FAMILY)),
        };
        Ok(FileCell::Text(text))
    }

    fn decode(&self, conversion: Conversion, native: &FileCell, ty: &ColumnType) -> EngineResult<PolyValue> {
        if let FileCell::Blob(path) = native {
            return match conversion {
                Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => {
                    Self::read_blob(path).map(PolyValue::Binary)
                }
                _ => Err(cast_error(ty, FAMILY, "blob reference")),
            };
        }
        let FileCell::Text(text) = native else {
            return Ok(PolyValue::Null);
        };
        let parse_err = |e: &dyn std::fmt::Display| {
            EngineError::conversion_cast(ty.kind, FAMILY.as_str(), format!("'{text}': {e}"))
        };

        match conversion {
            Conversion::Boolean => match text.as_str() {
                "true" => Ok(PolyValue::Boolean(true)),
                "false" => Ok(PolyValue::Boolean(false)),
                _ => Err(parse_err(&"not a boolean")),
            },
            Conversion::TinyInt
            | Conversion::SmallInt
            | Conversion::Integer
            | Conversion::BigInt
            | Conversion::Decimal => {
                let decimal = text.trim().parse().map_err(|e| parse_err(&e))?;
                from_decimal(conversion, decimal, ty, FAMILY)
            }
            Conversion::Real => text.trim().parse::<f32>().map(PolyValue::Real).map_err(|e| parse_err(&e)),
            Conversion::Double => text.trim().parse::<f64>().map(PolyValue::Double).map_err(|e| parse_err(&e)),
            Conversion::Date => text.parse().map(PolyValue::Date),
            Conversion::Time => text.parse().map(PolyValue::Time),
            Conversion::Timestamp => text.parse().map(PolyValue::Timestamp),
            Conversion::Interval => text.trim().parse::<i64>().map(PolyValue::Interval).map_err(|e| parse_err(&e)),
            Conversion::Char | Conversion::Varchar => Ok(text_value(text.clone(), ty)),
            Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => {
                ByteSource::Base64(text.clone()).drain().map(PolyValue::Binary)
            }
            Conversion::Array => self.from_array(text, ty),
            Conversion::Map => self.from_map(text, ty),
            Conversion::Json => Ok(PolyValue::Json(text.clone())),
            Conversion::Object => object_from_text(text, ty, FAMILY),
            Conversion::Null => Ok(PolyValue::Null),
        }
    }
}

impl FileSpace {
    /// Reads a side file into a canonical byte string.
    pub fn read_blob(path: &Path) -> EngineResult<ByteString> {
        let file = File::open(path)
            .map_err(|e| EngineError::execution_error(format!("Cannot open blob {}: {e}", path.display())))?;
        ByteSource::Reader(Box::new(file)).drain()
    }

    fn to_array(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<String> {
        let component = ty.component_type()?;
        let cells = canonical_list(value, ty, FAMILY)?
            .iter()
            .map(|item| self.map_to_native(item, component).map(|cell| cell.to_json()))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Json::Array(cells).to_string())
    }

    fn from_array(&self, text: &str, ty: &ColumnType) -> EngineResult<PolyValue> {
        let component = ty.component_type()?;
        parse_json_array(text, ty)?
            .iter()
            .map(|item| self.map_to_canonical(&FileCell::from_json(item), component))
            .collect::<EngineResult<PolyList>>()
            .map(PolyValue::List)
    }

    fn to_map(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<String> {
        let key_ty = ty.key_type()?;
        let value_ty = ty.value_type()?;
        let entries = canonical_map(value, ty, FAMILY)?
            .iter()
            .map(|(k, v)| {
                Ok(Json::Array(vec![
                    self.map_to_native(k, key_ty)?.to_json(),
                    self.map_to_native(v, value_ty)?.to_json(),
                ]))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Json::Array(entries).to_string())
    }

    fn from_map(&self, text: &str, ty: &ColumnType) -> EngineResult<PolyValue> {
        let key_ty = ty.key_type()?;
        let value_ty = ty.value_type()?;
        let mut map = PolyMap::new();
        for entry in parse_json_array(text, ty)? {
            match entry.as_array().map(Vec::as_slice) {
                Some([k, v]) => map.insert(
                    self.map_to_canonical(&FileCell::from_json(k), key_ty)?,
                    self.map_to_canonical(&FileCell::from_json(v), value_ty)?,
                ),
                _ => return Err(cast_error(ty, FAMILY, format!("map entry {entry}"))),
            }
        }
        Ok(PolyValue::Map(map))
    }
}

fn parse_json_array(text: &str, ty: &ColumnType) -> EngineResult<Vec<Json>> {
    match serde_json::from_str::<Json>(text) {
        Ok(Json::Array(items)) => Ok(items),
        Ok(other) => Err(cast_error(ty, FAMILY, format!("JSON {other}"))),
        Err(e) => Err(EngineError::conversion_cast(ty.kind, FAMILY.as_str(), e.to_string())),
    }
}
