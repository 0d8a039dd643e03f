// SPDX-License-Identifier: Apache-2.0

//! Canonical logical types.
//!
//! `PolyType` is the closed set of column types every adapter must be able
//! to round-trip. Each type resolves to exactly one [`Conversion`] (the
//! dispatch key used by every type space) and one [`WrapperKind`] (the
//! canonical value shape). Both tables are exhaustive `match`es kept next to
//! the enum so that adding a type fails to compile until it is mapped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolyType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Real,
    Float,
    Double,
    Date,
    Time,
    TimeWithLocalTimeZone,
    Timestamp,
    TimestampWithLocalTimeZone,
    IntervalYear,
    IntervalYearMonth,
    IntervalMonth,
    IntervalDay,
    IntervalDayHour,
    IntervalDayMinute,
    IntervalDaySecond,
    IntervalHour,
    IntervalHourMinute,
    IntervalHourSecond,
    IntervalMinute,
    IntervalMinuteSecond,
    IntervalSecond,
    Char,
    Varchar,
    Binary,
    Varbinary,
    Null,
    Any,
    Symbol,
    Multiset,
    Array,
    Map,
    Row,
    File,
    Image,
    Video,
    Sound,
    Json,
}

/// Dispatch key selecting the paired conversion functions of a type space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conversion {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Real,
    Double,
    Date,
    Time,
    Timestamp,
    Interval,
    Char,
    Varchar,
    Binary,
    Varbinary,
    Array,
    Map,
    Multimedia,
    Json,
    Object,
    Null,
}

/// Shape of a canonical value holding a given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapperKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    BigDecimal,
    Float,
    Double,
    DateString,
    TimeString,
    TimestampString,
    Interval,
    NlsString,
    ByteString,
    PolyList,
    PolyMap,
    Json,
    /// Any canonical value, carried opaquely
    Object,
    Null,
}

impl PolyType {
    /// Every type, in declaration order.
    pub const ALL: [PolyType; 43] = [
        PolyType::Boolean,
        PolyType::TinyInt,
        PolyType::SmallInt,
        PolyType::Integer,
        PolyType::BigInt,
        PolyType::Decimal,
        PolyType::Real,
        PolyType::Float,
        PolyType::Double,
        PolyType::Date,
        PolyType::Time,
        PolyType::TimeWithLocalTimeZone,
        PolyType::Timestamp,
        PolyType::TimestampWithLocalTimeZone,
        PolyType::IntervalYear,
        PolyType::IntervalYearMonth,
        PolyType::IntervalMonth,
        PolyType::IntervalDay,
        PolyType::IntervalDayHour,
        PolyType::IntervalDayMinute,
        PolyType::IntervalDaySecond,
        PolyType::IntervalHour,
        PolyType::IntervalHourMinute,
        PolyType::IntervalHourSecond,
        PolyType::IntervalMinute,
        PolyType::IntervalMinuteSecond,
        PolyType::IntervalSecond,
        PolyType::Char,
        PolyType::Varchar,
        PolyType::Binary,
        PolyType::Varbinary,
        PolyType::Null,
        PolyType::Any,
        PolyType::Symbol,
        PolyType::Multiset,
        PolyType::Array,
        PolyType::Map,
        PolyType::Row,
        PolyType::File,
        PolyType::Image,
        PolyType::Video,
        PolyType::Sound,
        PolyType::Json,
    ];

    pub fn conversion(self) -> Conversion {
        match self {
            PolyType::Boolean => Conversion::Boolean,
            PolyType::TinyInt => Conversion::TinyInt,
            PolyType::SmallInt => Conversion::SmallInt,
            PolyType::Integer => Conversion::Integer,
            PolyType::BigInt => Conversion::BigInt,
            PolyType::Decimal => Conversion::Decimal,
            PolyType::Real => Conversion::Real,
            PolyType::Float | PolyType::Double => Conversion::Double,
            PolyType::Date => Conversion::Date,
            PolyType::Time | PolyType::TimeWithLocalTimeZone => Conversion::Time,
            PolyType::Timestamp | PolyType::TimestampWithLocalTimeZone => Conversion::Timestamp,
            PolyType::IntervalYear
            | PolyType::IntervalYearMonth
            | PolyType::IntervalMonth
            | PolyType::IntervalDay
            | PolyType::IntervalDayHour
            | PolyType::IntervalDayMinute
            | PolyType::IntervalDaySecond
            | PolyType::IntervalHour
            | PolyType::IntervalHourMinute
            | PolyType::IntervalHourSecond
            | PolyType::IntervalMinute
            | PolyType::IntervalMinuteSecond
            | PolyType::IntervalSecond => Conversion::Interval,
            PolyType::Char => Conversion::Char,
            PolyType::Varchar => Conversion::Varchar,
            PolyType::Binary => Conversion::Binary,
            PolyType::Varbinary => Conversion::Varbinary,
            PolyType::Array | PolyType::Multiset => Conversion::Array,
            PolyType::Map => Conversion::Map,
            PolyType::File | PolyType::Image | PolyType::Video | PolyType::Sound => {
                Conversion::Multimedia
            }
            PolyType::Json => Conversion::Json,
            PolyType::Any | PolyType::Symbol | PolyType::Row => Conversion::Object,
            PolyType::Null => Conversion::Null,
        }
    }

    pub fn wrapper(self) -> WrapperKind {
        match self.conversion() {
            Conversion::Boolean => WrapperKind::Boolean,
            Conversion::TinyInt => WrapperKind::Byte,
            Conversion::SmallInt => WrapperKind::Short,
            Conversion::Integer => WrapperKind::Int,
            Conversion::BigInt => WrapperKind::Long,
            Conversion::Decimal => WrapperKind::BigDecimal,
            Conversion::Real => WrapperKind::Float,
            Conversion::Double => WrapperKind::Double,
            Conversion::Date => WrapperKind::DateString,
            Conversion::Time => WrapperKind::TimeString,
            Conversion::Timestamp => WrapperKind::TimestampString,
            Conversion::Interval => WrapperKind::Interval,
            Conversion::Char | Conversion::Varchar => WrapperKind::NlsString,
            Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => {
                WrapperKind::ByteString
            }
            Conversion::Array => WrapperKind::PolyList,
            Conversion::Map => WrapperKind::PolyMap,
            Conversion::Json => WrapperKind::Json,
            Conversion::Object => WrapperKind::Object,
            Conversion::Null => WrapperKind::Null,
        }
    }

    /// Year/month intervals count months, all others count milliseconds.
    pub fn is_year_month_interval(self) -> bool {
        matches!(
            self,
            PolyType::IntervalYear | PolyType::IntervalYearMonth | PolyType::IntervalMonth
        )
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self.conversion(),
            Conversion::TinyInt
                | Conversion::SmallInt
                | Conversion::Integer
                | Conversion::BigInt
                | Conversion::Decimal
                | Conversion::Real
                | Conversion::Double
        )
    }

    pub fn is_composite(self) -> bool {
        matches!(self.conversion(), Conversion::Array | Conversion::Map)
    }

    pub fn name(self) -> &'static str {
        match self {
            PolyType::Boolean => "BOOLEAN",
            PolyType::TinyInt => "TINYINT",
            PolyType::SmallInt => "SMALLINT",
            PolyType::Integer => "INTEGER",
            PolyType::BigInt => "BIGINT",
            PolyType::Decimal => "DECIMAL",
            PolyType::Real => "REAL",
            PolyType::Float => "FLOAT",
            PolyType::Double => "DOUBLE",
            PolyType::Date => "DATE",
            PolyType::Time => "TIME",
            PolyType::TimeWithLocalTimeZone => "TIME_WITH_LOCAL_TIME_ZONE",
            PolyType::Timestamp => "TIMESTAMP",
            PolyType::TimestampWithLocalTimeZone => "TIMESTAMP_WITH_LOCAL_TIME_ZONE",
            PolyType::IntervalYear => "INTERVAL_YEAR",
            PolyType::IntervalYearMonth => "INTERVAL_YEAR_MONTH",
            PolyType::IntervalMonth => "INTERVAL_MONTH",
            PolyType::IntervalDay => "INTERVAL_DAY",
            PolyType::IntervalDayHour => "INTERVAL_DAY_HOUR",
            PolyType::IntervalDayMinute => "INTERVAL_DAY_MINUTE",
            PolyType::IntervalDaySecond => "INTERVAL_DAY_SECOND",
            PolyType::IntervalHour => "INTERVAL_HOUR",
            PolyType::IntervalHourMinute => "INTERVAL_HOUR_MINUTE",
            PolyType::IntervalHourSecond => "INTERVAL_HOUR_SECOND",
            PolyType::IntervalMinute => "INTERVAL_MINUTE",
            PolyType::IntervalMinuteSecond => "INTERVAL_MINUTE_SECOND",
            PolyType::IntervalSecond => "INTERVAL_SECOND",
            PolyType::Char => "CHAR",
            PolyType::Varchar => "VARCHAR",
            PolyType::Binary => "BINARY",
            PolyType::Varbinary => "VARBINARY",
            PolyType::Null => "NULL",
            PolyType::Any => "ANY",
            PolyType::Symbol => "SYMBOL",
            PolyType::Multiset => "MULTISET",
            PolyType::Array => "ARRAY",
            PolyType::Map => "MAP",
            PolyType::Row => "ROW",
            PolyType::File => "FILE",
            PolyType::Image => "IMAGE",
            PolyType::Video => "VIDEO",
            PolyType::Sound => "SOUND",
            PolyType::Json => "JSON",
        }
    }
}

impl fmt::Display for PolyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolyType {
    type Err = EngineError;

    /// Unknown names are a configuration error, never a silent default.
    fn from_str(s: &str) -> EngineResult<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace(' ', "_");
        PolyType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == normalized)
            .ok_or_else(|| EngineError::unmapped(s.trim(), "canonical"))
    }
}

impl Conversion {
    /// Suffix naming the paired `to*`/`from*` conversion functions.
    pub fn suffix(self) -> &'static str {
        match self {
            Conversion::Boolean => "Boolean",
            Conversion::TinyInt => "TinyInt",
            Conversion::SmallInt => "SmallInt",
            Conversion::Integer => "Integer",
            Conversion::BigInt => "BigInt",
            Conversion::Decimal => "Decimal",
            Conversion::Real => "Real",
            Conversion::Double => "Double",
            Conversion::Date => "Date",
            Conversion::Time => "Time",
            Conversion::Timestamp => "Timestamp",
            Conversion::Interval => "Interval",
            Conversion::Char => "Char",
            Conversion::Varchar => "Varchar",
            Conversion::Binary => "Binary",
            Conversion::Varbinary => "Varbinary",
            Conversion::Array => "Array",
            Conversion::Map => "Map",
            Conversion::Multimedia => "Multimedia",
            Conversion::Json => "Json",
            Conversion::Object => "Object",
            Conversion::Null => "Null",
        }
    }
}

/// Collation tag attached to character data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collation(pub String);

impl Collation {
    pub const DEFAULT_NAME: &'static str = "UTF-8$en_US$primary";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Default for Collation {
    fn default() -> Self {
        Self(Self::DEFAULT_NAME.to_string())
    }
}

/// Character set applied when a column declares none.
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Full type of a column: the poly type plus sub-types for composites and
/// character metadata for strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    pub kind: PolyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<Box<ColumnType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Box<ColumnType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Box<ColumnType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<Collation>,
}

impl ColumnType {
    pub fn of(kind: PolyType) -> Self {
        Self {
            kind,
            component: None,
            key: None,
            value: None,
            charset: None,
            collation: None,
        }
    }

    pub fn array(component: ColumnType) -> Self {
        Self {
            component: Some(Box::new(component)),
            ..Self::of(PolyType::Array)
        }
    }

    pub fn map(key: ColumnType, value: ColumnType) -> Self {
        Self {
            key: Some(Box::new(key)),
            value: Some(Box::new(value)),
            ..Self::of(PolyType::Map)
        }
    }

    pub fn with_collation(mut self, charset: impl Into<String>, collation: Collation) -> Self {
        self.charset = Some(charset.into());
        self.collation = Some(collation);
        self
    }

    pub fn conversion(&self) -> Conversion {
        self.kind.conversion()
    }

    pub fn component_type(&self) -> EngineResult<&ColumnType> {
        self.component
            .as_deref()
            .ok_or_else(|| EngineError::unmapped(format!("{} without component type", self.kind), "canonical"))
    }

    pub fn key_type(&self) -> EngineResult<&ColumnType> {
        self.key
            .as_deref()
            .ok_or_else(|| EngineError::unmapped(format!("{} without key type", self.kind), "canonical"))
    }

    pub fn value_type(&self) -> EngineResult<&ColumnType> {
        self.value
            .as_deref()
            .ok_or_else(|| EngineError::unmapped(format!("{} without value type", self.kind), "canonical"))
    }

    /// Character set used when materializing strings of this column.
    pub fn effective_charset(&self) -> &str {
        self.charset.as_deref().unwrap_or(DEFAULT_CHARSET)
    }

    pub fn effective_collation(&self) -> Collation {
        self.collation.clone().unwrap_or_default()
    }
}

impl From<PolyType> for ColumnType {
    fn from(kind: PolyType) -> Self {
        Self::of(kind)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.component, &self.key, &self.value) {
            (Some(component), _, _) => write!(f, "{} {}", component, self.kind),
            (_, Some(key), Some(value)) => write!(f, "{}({}, {})", self.kind, key, value),
            _ => write!(f, "{}", self.kind),
        }
    }
}
