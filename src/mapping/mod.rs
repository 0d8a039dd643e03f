// SPDX-License-Identifier: Apache-2.0

//! Type-space mapping
//!
//! One [`TypeSpace`] per adapter family converts values between the
//! canonical domain ([`PolyValue`]) and the family's native representation.
//! Null short-circuits in the provided `map_to_*` methods; everything else
//! is dispatched by an exhaustive `match` over [`Conversion`] inside each
//! family's `encode`/`decode`.

pub mod bytes;
pub mod canonical;
pub mod document;
pub mod external;
pub mod file;
pub mod jdbc;

use std::fmt;

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};

use polyfed_core::{
    ByteString, ColumnType, Conversion, DateString, EngineError, EngineResult, NlsString, PolyList,
    PolyMap, PolyType, PolyValue, TimeString, TimestampString,
};

pub use bytes::ByteSource;
pub use canonical::CanonicalSpace;
pub use document::DocumentSpace;
pub use external::ExternalSpace;
pub use file::{FileCell, FileSpace};
pub use jdbc::JdbcSpace;

/// Adapter family a type space belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Canonical,
    External,
    Jdbc,
    Document,
    File,
}

impl Family {
    pub fn as_str(self) -> &'static str {
        match self {
            Family::Canonical => "canonical",
            Family::External => "external",
            Family::Jdbc => "jdbc",
            Family::Document => "document",
            Family::File => "file",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bidirectional conversion contract between canonical and native values.
///
/// Implementations are stateless and safe to share across threads.
pub trait TypeSpace: Send + Sync {
    type Native: Clone + fmt::Debug + Send + Sync + 'static;

    fn family(&self) -> Family;

    /// Native null representation.
    fn null(&self) -> Self::Native;

    fn is_null(&self, native: &Self::Native) -> bool;

    /// Whether values of `ty` need converting at all. Adapters whose
    /// native form already equals the canonical form opt out.
    fn needs_mapping(&self, ty: PolyType) -> bool {
        let _ = ty;
        true
    }

    /// Canonical to native for a non-null value.
    fn encode(
        &self,
        conversion: Conversion,
        value: &PolyValue,
        ty: &ColumnType,
    ) -> EngineResult<Self::Native>;

    /// Native to canonical for a non-null value.
    fn decode(
        &self,
        conversion: Conversion,
        native: &Self::Native,
        ty: &ColumnType,
    ) -> EngineResult<PolyValue>;

    /// The canonical value taken unchanged as native. Only families whose
    /// native form is the canonical form return `Some`.
    fn passthrough_native(&self, value: &PolyValue) -> Option<Self::Native> {
        let _ = value;
        None
    }

    fn passthrough_canonical(&self, native: &Self::Native) -> Option<PolyValue> {
        let _ = native;
        None
    }

    /// Adapter write path: skips conversion for types the family opts out of.
    fn to_stored(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<Self::Native> {
        if !self.needs_mapping(ty.kind) {
            if let Some(native) = self.passthrough_native(value) {
                return Ok(native);
            }
        }
        self.map_to_native(value, ty)
    }

    /// Adapter read path, the counterpart of [`TypeSpace::to_stored`].
    fn from_stored(&self, native: &Self::Native, ty: &ColumnType) -> EngineResult<PolyValue> {
        if !self.needs_mapping(ty.kind) {
            if let Some(value) = self.passthrough_canonical(native) {
                return Ok(value);
            }
        }
        self.map_to_canonical(native, ty)
    }

    fn map_to_native(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<Self::Native> {
        if value.is_null() {
            return Ok(self.null());
        }
        self.encode(ty.conversion(), value, ty)
    }

    fn map_to_canonical(&self, native: &Self::Native, ty: &ColumnType) -> EngineResult<PolyValue> {
        if self.is_null(native) {
            return Ok(PolyValue::Null);
        }
        self.decode(ty.conversion(), native, ty)
    }

    fn map_row_to_native(
        &self,
        row: &[PolyValue],
        types: &[ColumnType],
    ) -> EngineResult<Vec<Self::Native>> {
        if row.len() != types.len() {
            return Err(EngineError::validation(format!(
                "Row has {} values but {} column types",
                row.len(),
                types.len()
            )));
        }
        row.iter()
            .zip(types)
            .map(|(value, ty)| self.to_stored(value, ty))
            .collect()
    }

    fn map_row_to_canonical(
        &self,
        row: &[Self::Native],
        types: &[ColumnType],
    ) -> EngineResult<Vec<PolyValue>> {
        if row.len() != types.len() {
            return Err(EngineError::validation(format!(
                "Row has {} values but {} column types",
                row.len(),
                types.len()
            )));
        }
        row.iter()
            .zip(types)
            .map(|(native, ty)| self.from_stored(native, ty))
            .collect()
    }
}

// ==================== Shared canonical-side helpers ====================

pub(crate) fn cast_error(ty: &ColumnType, family: Family, found: impl fmt::Display) -> EngineError {
    EngineError::conversion_cast(ty.kind, family.as_str(), format!("unexpected {found}"))
}

/// Exact numeric value of a canonical number.
pub(crate) fn canonical_decimal(
    value: &PolyValue,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<BigDecimal> {
    match value {
        v if v.is_exact_numeric() => v
            .as_decimal()
            .ok_or_else(|| cast_error(ty, family, v.kind_name())),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

/// Canonical integral value as `i64`, rejecting fractions and overflow.
pub(crate) fn canonical_i64(value: &PolyValue, ty: &ColumnType, family: Family) -> EngineResult<i64> {
    let decimal = canonical_decimal(value, ty, family)?;
    integral_i64(&decimal, ty, family)
}

pub(crate) fn integral_i64(decimal: &BigDecimal, ty: &ColumnType, family: Family) -> EngineResult<i64> {
    if !decimal.is_integer() {
        return Err(EngineError::conversion_cast(
            ty.kind,
            family.as_str(),
            format!("{decimal} is not integral"),
        ));
    }
    decimal.to_i64().ok_or_else(|| {
        EngineError::conversion_cast(ty.kind, family.as_str(), format!("{decimal} overflows BIGINT"))
    })
}

/// Builds the canonical wrapper for an exact-numeric conversion from its
/// decimal intermediate.
pub(crate) fn from_decimal(
    conversion: Conversion,
    decimal: BigDecimal,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<PolyValue> {
    let overflow = |target: &str| {
        EngineError::conversion_cast(
            ty.kind,
            family.as_str(),
            format!("{decimal} does not fit {target}"),
        )
    };
    match conversion {
        Conversion::Decimal => Ok(PolyValue::Decimal(decimal)),
        Conversion::TinyInt => {
            let v = integral_i64(&decimal, ty, family)?;
            i8::try_from(v).map(PolyValue::TinyInt).map_err(|_| overflow("TINYINT"))
        }
        Conversion::SmallInt => {
            let v = integral_i64(&decimal, ty, family)?;
            i16::try_from(v).map(PolyValue::SmallInt).map_err(|_| overflow("SMALLINT"))
        }
        Conversion::Integer => {
            let v = integral_i64(&decimal, ty, family)?;
            i32::try_from(v).map(PolyValue::Integer).map_err(|_| overflow("INTEGER"))
        }
        Conversion::BigInt => integral_i64(&decimal, ty, family).map(PolyValue::BigInt),
        other => Err(EngineError::internal(format!(
            "{} is not an exact numeric conversion",
            other.suffix()
        ))),
    }
}

pub(crate) fn canonical_bool(value: &PolyValue, ty: &ColumnType, family: Family) -> EngineResult<bool> {
    value.as_bool().ok_or_else(|| cast_error(ty, family, value.kind_name()))
}

pub(crate) fn canonical_f32(value: &PolyValue, ty: &ColumnType, family: Family) -> EngineResult<f32> {
    match value {
        PolyValue::Real(v) => Ok(*v),
        v if v.is_numeric() => v
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| cast_error(ty, family, v.kind_name())),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_f64(value: &PolyValue, ty: &ColumnType, family: Family) -> EngineResult<f64> {
    match value {
        PolyValue::Double(v) => Ok(*v),
        v if v.is_numeric() => v.as_f64().ok_or_else(|| cast_error(ty, family, v.kind_name())),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_date(
    value: &PolyValue,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<DateString> {
    match value {
        PolyValue::Date(d) => Ok(*d),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_time(
    value: &PolyValue,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<TimeString> {
    match value {
        PolyValue::Time(t) => Ok(*t),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_timestamp(
    value: &PolyValue,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<TimestampString> {
    match value {
        PolyValue::Timestamp(t) => Ok(*t),
        PolyValue::Date(d) => Ok(TimestampString::from_millis_since_epoch(d.millis_since_epoch())),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_interval(value: &PolyValue, ty: &ColumnType, family: Family) -> EngineResult<i64> {
    match value {
        PolyValue::Interval(v) => Ok(*v),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_text<'a>(
    value: &'a PolyValue,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<&'a NlsString> {
    match value {
        PolyValue::String(s) => Ok(s),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_bytes<'a>(
    value: &'a PolyValue,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<&'a ByteString> {
    match value {
        PolyValue::Binary(b) => Ok(b),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_list<'a>(
    value: &'a PolyValue,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<&'a PolyList> {
    match value {
        PolyValue::List(l) => Ok(l),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_map<'a>(
    value: &'a PolyValue,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<&'a PolyMap> {
    match value {
        PolyValue::Map(m) => Ok(m),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

pub(crate) fn canonical_json<'a>(
    value: &'a PolyValue,
    ty: &ColumnType,
    family: Family,
) -> EngineResult<&'a str> {
    match value {
        PolyValue::Json(s) => Ok(s),
        PolyValue::String(s) => Ok(&s.value),
        other => Err(cast_error(ty, family, other.kind_name())),
    }
}

/// A non-null value declared as the NULL type cannot be represented.
pub(crate) fn reject_non_null(value: &PolyValue, ty: &ColumnType, family: Family) -> EngineError {
    cast_error(ty, family, format!("non-null {} for NULL type", value.kind_name()))
}

/// Canonical string for a native text, carrying the column's charset and
/// collation (or the defaults when the column declares none).
pub(crate) fn text_value(text: impl Into<String>, ty: &ColumnType) -> PolyValue {
    PolyValue::String(NlsString::for_column(text, ty))
}

/// Serialized form of an opaque canonical value (ANY, SYMBOL, ROW).
pub(crate) fn object_to_text(value: &PolyValue, ty: &ColumnType, family: Family) -> EngineResult<String> {
    serde_json::to_string(value)
        .map_err(|e| EngineError::conversion_cast(ty.kind, family.as_str(), e.to_string()))
}

pub(crate) fn object_from_text(text: &str, ty: &ColumnType, family: Family) -> EngineResult<PolyValue> {
    serde_json::from_str(text)
        .map_err(|e| EngineError::conversion_cast(ty.kind, family.as_str(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn from_decimal_narrows_exactly() {
        let ty = ColumnType::of(PolyType::TinyInt);
        let v = from_decimal(Conversion::TinyInt, BigDecimal::from(127), &ty, Family::Jdbc).unwrap();
        assert_eq!(v, PolyValue::TinyInt(127));

        let err = from_decimal(Conversion::TinyInt, BigDecimal::from(128), &ty, Family::Jdbc)
            .unwrap_err();
        assert!(matches!(err, EngineError::ConversionCast { .. }));

        let fractional = BigDecimal::from_str("1.5").unwrap();
        assert!(from_decimal(Conversion::Integer, fractional, &ty, Family::Jdbc).is_err());
    }

    #[test]
    fn integral_decimal_with_scale_is_accepted() {
        let ty = ColumnType::of(PolyType::BigInt);
        let d = BigDecimal::from_str("42.000").unwrap();
        assert_eq!(integral_i64(&d, &ty, Family::Document).unwrap(), 42);
    }

    #[test]
    fn text_value_keeps_column_collation() {
        let ty = ColumnType::of(PolyType::Varchar)
            .with_collation("ISO-8859-1", polyfed_core::Collation::new("latin1$de_DE$secondary"));
        match text_value("grüß", &ty) {
            PolyValue::String(s) => {
                assert_eq!(s.charset, "ISO-8859-1");
                assert_eq!(s.collation.0, "latin1$de_DE$secondary");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
