//! Query-related data models.
//!
//! This module defines bind parameters and the positional row set returned by
//! `Session::query`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A positional parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// SQL DATE
    Date(NaiveDate),
    /// SQL TIME
    Time(NaiveTime),
    /// SQL TIMESTAMP (no zone)
    Timestamp(NaiveDateTime),
    /// Zone-aware instant; bound as a UTC `Timestamp`
    DateTime(DateTime<Utc>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
            Self::DateTime(_) => "datetime",
        }
    }

    /// Convert the generic date type into its SQL-specific counterpart.
    ///
    /// Every other variant is returned unchanged.
    pub fn normalized(self) -> Self {
        match self {
            Self::DateTime(dt) => Self::Timestamp(dt.naive_utc()),
            other => other,
        }
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NaiveDate> for QueryParam {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for QueryParam {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for QueryParam {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Normalize a parameter list before binding.
pub fn normalize_params(params: &[QueryParam]) -> Vec<QueryParam> {
    params.iter().cloned().map(QueryParam::normalized).collect()
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Rows returned by a query, cells in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl QueryRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self { columns, rows }
    }

    /// Get the number of rows in the result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cell at (`row`, `column`), `None` when either is out of range.
    pub fn get(&self, row: usize, column: &str) -> Option<&JsonValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Non-null text values of the `idx`-th column. Numbers are rendered as text.
    pub fn strings_at(&self, idx: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|r| r.get(idx))
            .filter_map(|v| match v {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Null => None,
                other => Some(other.to_string()),
            })
            .collect()
    }

    /// First cell of the first row, if any.
    pub fn scalar(&self) -> Option<&JsonValue> {
        self.rows.first().and_then(|r| r.first())
    }

    /// Iterate rows as JSON objects keyed by column name.
    pub fn to_json_maps(&self) -> Vec<serde_json::Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|r| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(r.iter().cloned())
                    .collect()
            })
            .collect()
    }
}
