// SPDX-License-Identifier: Apache-2.0

//! Canonical value domain
//!
//! Every adapter converts its native values to and from these wrappers.
//! Dates, times and timestamps are held as epoch offsets (days or
//! milliseconds) and render to their ISO text form on demand.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::{Collation, ColumnType, PolyType, DEFAULT_CHARSET};

/// Day number (from 0001-01-01) of the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Universal canonical value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolyValue {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Decimal(#[serde(with = "decimal_text")] BigDecimal),
    Real(f32),
    Double(f64),
    Date(DateString),
    Time(TimeString),
    Timestamp(TimestampString),
    /// Months for year/month intervals, milliseconds otherwise
    Interval(i64),
    String(NlsString),
    Binary(ByteString),
    List(PolyList),
    Map(PolyMap),
    Json(String),
    Symbol(String),
}

impl PolyValue {
    /// Varchar value with the default charset and collation.
    pub fn text(value: impl Into<String>) -> Self {
        PolyValue::String(NlsString::new(value))
    }

    pub fn decimal(text: &str) -> EngineResult<Self> {
        BigDecimal::from_str(text)
            .map(PolyValue::Decimal)
            .map_err(|e| EngineError::conversion_cast(PolyType::Decimal, "canonical", e.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PolyValue::Null)
    }

    pub fn is_exact_numeric(&self) -> bool {
        matches!(
            self,
            PolyValue::TinyInt(_)
                | PolyValue::SmallInt(_)
                | PolyValue::Integer(_)
                | PolyValue::BigInt(_)
                | PolyValue::Decimal(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_exact_numeric() || matches!(self, PolyValue::Real(_) | PolyValue::Double(_))
    }

    /// Short name of the held wrapper, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PolyValue::Null => "null",
            PolyValue::Boolean(_) => "boolean",
            PolyValue::TinyInt(_) => "tinyint",
            PolyValue::SmallInt(_) => "smallint",
            PolyValue::Integer(_) => "integer",
            PolyValue::BigInt(_) => "bigint",
            PolyValue::Decimal(_) => "decimal",
            PolyValue::Real(_) => "real",
            PolyValue::Double(_) => "double",
            PolyValue::Date(_) => "date",
            PolyValue::Time(_) => "time",
            PolyValue::Timestamp(_) => "timestamp",
            PolyValue::Interval(_) => "interval",
            PolyValue::String(_) => "string",
            PolyValue::Binary(_) => "binary",
            PolyValue::List(_) => "list",
            PolyValue::Map(_) => "map",
            PolyValue::Json(_) => "json",
            PolyValue::Symbol(_) => "symbol",
        }
    }

    /// Exact numeric value as an arbitrary-precision decimal.
    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            PolyValue::TinyInt(v) => Some(BigDecimal::from(*v)),
            PolyValue::SmallInt(v) => Some(BigDecimal::from(*v)),
            PolyValue::Integer(v) => Some(BigDecimal::from(*v)),
            PolyValue::BigInt(v) => Some(BigDecimal::from(*v)),
            PolyValue::Decimal(v) => Some(v.clone()),
            PolyValue::Real(v) => BigDecimal::try_from(*v as f64).ok(),
            PolyValue::Double(v) => BigDecimal::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PolyValue::Real(v) => Some(*v as f64),
            PolyValue::Double(v) => Some(*v),
            other => other.as_decimal().and_then(|d| d.to_f64()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PolyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PolyValue::String(s) => Some(&s.value),
            PolyValue::Json(s) | PolyValue::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// SQL comparison; `None` when either side is null or the kinds are
    /// not comparable.
    pub fn compare(&self, other: &PolyValue) -> Option<Ordering> {
        use PolyValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (a, b) if a.is_exact_numeric() && b.is_exact_numeric() => {
                Some(a.as_decimal()?.cmp(&b.as_decimal()?))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
            (String(a), String(b)) => Some(a.value.cmp(&b.value)),
            (Json(a), Json(b)) | (Symbol(a), Symbol(b)) => Some(a.cmp(b)),
            (String(a), Symbol(b)) | (String(a), Json(b)) => Some(a.value.as_str().cmp(b.as_str())),
            (Symbol(a), String(b)) | (Json(a), String(b)) => Some(a.as_str().cmp(b.value.as_str())),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Interval(a), Interval(b)) => Some(a.cmp(b)),
            (Binary(a), Binary(b)) => Some(a.0.cmp(&b.0)),
            (List(a), List(b)) => {
                for (x, y) in a.0.iter().zip(b.0.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.0.len().cmp(&b.0.len()))
            }
            (Map(a), Map(b)) => (a == b).then_some(Ordering::Equal),
            _ => None,
        }
    }

    /// Three-valued SQL equality.
    pub fn sql_eq(&self, other: &PolyValue) -> Option<bool> {
        self.compare(other).map(|o| o == Ordering::Equal)
    }

    /// Plain text rendering (no quoting).
    pub fn to_text(&self) -> String {
        match self {
            PolyValue::Null => "null".to_string(),
            PolyValue::Boolean(b) => b.to_string(),
            PolyValue::TinyInt(v) => v.to_string(),
            PolyValue::SmallInt(v) => v.to_string(),
            PolyValue::Integer(v) => v.to_string(),
            PolyValue::BigInt(v) => v.to_string(),
            PolyValue::Decimal(v) => v.to_string(),
            PolyValue::Real(v) => v.to_string(),
            PolyValue::Double(v) => v.to_string(),
            PolyValue::Date(v) => v.to_string(),
            PolyValue::Time(v) => v.to_string(),
            PolyValue::Timestamp(v) => v.to_string(),
            PolyValue::Interval(v) => v.to_string(),
            PolyValue::String(v) => v.value.clone(),
            PolyValue::Binary(v) => v.to_base64(),
            PolyValue::List(items) => {
                let parts: Vec<String> = items.0.iter().map(PolyValue::to_text).collect();
                format!("[{}]", parts.join(", "))
            }
            PolyValue::Map(entries) => {
                let parts: Vec<String> = entries
                    .0
                    .iter()
                    .map(|(k, v)| format!("{}={}", k.to_text(), v.to_text()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            PolyValue::Json(v) | PolyValue::Symbol(v) => v.clone(),
        }
    }

    /// Text that is identical for numerically equal exact values, so
    /// `Integer(5)` and `BigInt(5)` produce the same key.
    pub fn key_text(&self) -> String {
        if self.is_exact_numeric() {
            if let Some(d) = self.as_decimal() {
                return d.normalized().to_string();
            }
        }
        self.to_text()
    }
}

impl fmt::Display for PolyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<bool> for PolyValue {
    fn from(v: bool) -> Self {
        PolyValue::Boolean(v)
    }
}

impl From<i32> for PolyValue {
    fn from(v: i32) -> Self {
        PolyValue::Integer(v)
    }
}

impl From<i64> for PolyValue {
    fn from(v: i64) -> Self {
        PolyValue::BigInt(v)
    }
}

impl From<f64> for PolyValue {
    fn from(v: f64) -> Self {
        PolyValue::Double(v)
    }
}

impl From<&str> for PolyValue {
    fn from(v: &str) -> Self {
        PolyValue::text(v)
    }
}

impl From<String> for PolyValue {
    fn from(v: String) -> Self {
        PolyValue::text(v)
    }
}

/// Character data with its charset and collation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NlsString {
    pub value: String,
    pub charset: String,
    pub collation: Collation,
}

impl NlsString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            charset: DEFAULT_CHARSET.to_string(),
            collation: Collation::default(),
        }
    }

    /// String carrying the charset and collation declared by `ty`.
    pub fn for_column(value: impl Into<String>, ty: &ColumnType) -> Self {
        Self {
            value: value.into(),
            charset: ty.effective_charset().to_string(),
            collation: ty.effective_collation(),
        }
    }
}

impl fmt::Display for NlsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Immutable byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ByteString(#[serde(with = "base64_bytes")] pub Vec<u8>);

impl ByteString {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine};
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(text: &str) -> EngineResult<Self> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        STANDARD
            .decode(text.trim())
            .map(ByteString)
            .map_err(|e| EngineError::validation(format!("Invalid base64 payload: {e}")))
    }
}

/// Calendar date stored as days since 1970-01-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateString {
    days: i32,
}

impl DateString {
    pub fn from_days_since_epoch(days: i32) -> Self {
        Self { days }
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> EngineResult<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self::from_naive)
            .ok_or_else(|| EngineError::validation(format!("Invalid date {year}-{month}-{day}")))
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self {
            days: date.num_days_from_ce() - EPOCH_DAYS_FROM_CE,
        }
    }

    pub fn days_since_epoch(&self) -> i32 {
        self.days
    }

    pub fn millis_since_epoch(&self) -> i64 {
        self.days as i64 * MILLIS_PER_DAY
    }

    pub fn to_naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_num_days_from_ce_opt(self.days.checked_add(EPOCH_DAYS_FROM_CE)?)
    }
}

impl FromStr for DateString {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        // Days outside the calendar range print as `<n>d`.
        if let Some(days) = s.trim().strip_suffix('d').and_then(|d| d.parse().ok()) {
            return Ok(Self::from_days_since_epoch(days));
        }
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self::from_naive)
            .map_err(|e| EngineError::conversion_cast(PolyType::Date, "canonical", format!("'{s}': {e}")))
    }
}

impl fmt::Display for DateString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            None => write!(f, "{}d", self.days),
        }
    }
}

/// Time of day stored as milliseconds since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeString {
    millis: u32,
}

impl TimeString {
    pub fn from_millis_of_day(millis: i64) -> EngineResult<Self> {
        if !(0..MILLIS_PER_DAY).contains(&millis) {
            return Err(EngineError::conversion_cast(
                PolyType::Time,
                "canonical",
                format!("{millis}ms is outside a single day"),
            ));
        }
        Ok(Self {
            millis: millis as u32,
        })
    }

    pub fn from_hms_milli(hour: u32, minute: u32, second: u32, milli: u32) -> EngineResult<Self> {
        Self::from_millis_of_day(
            ((hour as i64 * 60 + minute as i64) * 60 + second as i64) * 1000 + milli as i64,
        )
    }

    pub fn millis_of_day(&self) -> i64 {
        self.millis as i64
    }
}

impl FromStr for TimeString {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let time = NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .map_err(|e| EngineError::conversion_cast(PolyType::Time, "canonical", format!("'{s}': {e}")))?;
        Self::from_millis_of_day(
            time.num_seconds_from_midnight() as i64 * 1000 + (time.nanosecond() / 1_000_000) as i64,
        )
    }
}

impl fmt::Display for TimeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.millis / 1000;
        let frac = self.millis % 1000;
        write!(
            f,
            "{:02}:{:02}:{:02}",
            total_secs / 3600,
            (total_secs / 60) % 60,
            total_secs % 60
        )?;
        if frac != 0 {
            write!(f, ".{frac:03}")?;
        }
        Ok(())
    }
}

/// Instant stored as milliseconds since the Unix epoch (UTC, no zone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimestampString {
    millis: i64,
}

impl TimestampString {
    pub fn from_millis_since_epoch(millis: i64) -> Self {
        Self { millis }
    }

    pub fn millis_since_epoch(&self) -> i64 {
        self.millis
    }

    pub fn date(&self) -> DateString {
        DateString::from_days_since_epoch(self.millis.div_euclid(MILLIS_PER_DAY) as i32)
    }
}

impl FromStr for TimestampString {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let trimmed = s.trim();
        // Instants outside the calendar range print as `<n>ms`.
        if let Some(millis) = trimmed.strip_suffix("ms").and_then(|m| m.parse().ok()) {
            return Ok(Self::from_millis_since_epoch(millis));
        }
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
            .map(|dt| Self::from_millis_since_epoch(dt.and_utc().timestamp_millis()))
            .map_err(|e| {
                EngineError::conversion_cast(PolyType::Timestamp, "canonical", format!("'{s}': {e}"))
            })
    }
}

impl fmt::Display for TimestampString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp_millis(self.millis) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            None => write!(f, "{}ms", self.millis),
        }
    }
}

/// Ordered list of canonical values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PolyList(pub Vec<PolyValue>);

impl PolyList {
    pub fn new(items: Vec<PolyValue>) -> Self {
        Self(items)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PolyValue> {
        self.0.iter()
    }
}

impl FromIterator<PolyValue> for PolyList {
    fn from_iter<I: IntoIterator<Item = PolyValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Insertion-ordered map of canonical values; keys may be any value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PolyMap(pub Vec<(PolyValue, PolyValue)>);

impl PolyMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &PolyValue) -> Option<&PolyValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Replaces the value of an existing key, otherwise appends.
    pub fn insert(&mut self, key: PolyValue, value: PolyValue) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<PolyValue>, value: impl Into<PolyValue>) -> Self {
        self.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (PolyValue, PolyValue)> {
        self.0.iter()
    }
}

mod decimal_text {
    use std::str::FromStr;

    use bigdecimal::BigDecimal;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BigDecimal::from_str(&s).map_err(serde::de::Error::custom)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
