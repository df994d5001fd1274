//! Row decoding into positional JSON cells.
//!
//! Each column is classified by its reported type name ([`TypeCategory`]) and
//! then decoded by the driver-specific module. Exact decimals are kept as text
//! so that sequence peeks can be normalized without floating point loss.

use crate::models::DbType;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

/// Logical category of a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Temporal,
    /// Decoded as text
    Unknown,
}

/// Classify a driver type name.
pub fn categorize_type(type_name: &str, db: DbType) -> TypeCategory {
    let name = type_name.to_ascii_lowercase();
    let has = |needle: &str| name.contains(needle);

    if has("decimal") || has("numeric") {
        // SQLite's NUMERIC affinity holds floats
        return if db == DbType::Sqlite && name == "numeric" {
            TypeCategory::Float
        } else {
            TypeCategory::Decimal
        };
    }

    match name.as_str() {
        "bool" | "boolean" => TypeCategory::Boolean,
        "json" | "jsonb" => TypeCategory::Json,
        "real" | "float4" | "float8" => TypeCategory::Float,
        "bytea" => TypeCategory::Binary,
        _ if has("int") || has("serial") || has("tiny") => TypeCategory::Integer,
        _ if has("float") || has("double") => TypeCategory::Float,
        _ if has("blob") || has("binary") => TypeCategory::Binary,
        // SQLite keeps dates as text or numbers
        _ if db != DbType::Sqlite && (name == "date" || has("time")) => TypeCategory::Temporal,
        _ => TypeCategory::Unknown,
    }
}

/// DECIMAL/NUMERIC value in the database's own text rendering.
#[derive(Debug)]
pub struct RawDecimal(pub String);

macro_rules! raw_decimal_for {
    ($db:ty, $info:ty, $value:ident) => {
        impl Type<$db> for RawDecimal {
            fn type_info() -> $info {
                <String as Type<$db>>::type_info()
            }

            fn compatible(ty: &$info) -> bool {
                let name = ty.name().to_ascii_lowercase();
                name.contains("decimal") || name.contains("numeric")
            }
        }

        impl<'r> Decode<'r, $db> for RawDecimal {
            fn decode(value: $value<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                Ok(RawDecimal(<&str as Decode<$db>>::decode(value)?.to_string()))
            }
        }
    };
}

raw_decimal_for!(sqlx::MySql, MySqlTypeInfo, MySqlValueRef);
raw_decimal_for!(sqlx::Postgres, PgTypeInfo, PgValueRef);

/// Binary data as base64 text.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

/// NaN and infinities have no JSON number form.
fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Non-null cell decoded as `T`, if the column type allows it.
fn cell<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn or_null<T: Into<JsonValue>>(value: Option<T>) -> JsonValue {
    value.map(Into::into).unwrap_or(JsonValue::Null)
}

/// Positional JSON view of a driver row.
pub trait RowToJson {
    fn column_names(&self) -> Vec<String>;
    fn to_json_values(&self) -> Vec<JsonValue>;
}

macro_rules! row_to_json {
    ($row:ty, $db:expr, $decoder:ident) => {
        impl RowToJson for $row {
            fn column_names(&self) -> Vec<String> {
                self.columns().iter().map(|c| c.name().to_string()).collect()
            }

            fn to_json_values(&self) -> Vec<JsonValue> {
                self.columns()
                    .iter()
                    .map(|col| {
                        let category = categorize_type(col.type_info().name(), $db);
                        $decoder::decode_column(self, col.ordinal(), category)
                    })
                    .collect()
            }
        }
    };
}

row_to_json!(MySqlRow, DbType::MySql, mysql);
row_to_json!(PgRow, DbType::Postgres, postgres);
row_to_json!(SqliteRow, DbType::Sqlite, sqlite);

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => match row.try_get::<Option<RawDecimal>, _>(idx) {
                Ok(v) => or_null(v.map(|d| d.0)),
                Err(e) => {
                    tracing::error!(column = idx, error = ?e, "Failed to decode DECIMAL");
                    JsonValue::Null
                }
            },
            // Signed first; unsigned columns (AUTO_INCREMENT counters among them) next
            TypeCategory::Integer => cell::<_, i64>(row, idx)
                .map(JsonValue::from)
                .or_else(|| cell::<_, u64>(row, idx).map(JsonValue::from))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => cell::<_, f64>(row, idx)
                .or_else(|| cell::<_, f32>(row, idx).map(f64::from))
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Boolean => or_null(cell::<_, bool>(row, idx)),
            TypeCategory::Binary => cell::<_, Vec<u8>>(row, idx)
                .map(|v| encode_binary_value(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => cell::<_, JsonValue>(row, idx).unwrap_or(JsonValue::Null),
            TypeCategory::Temporal => cell::<_, NaiveDateTime>(row, idx)
                .map(|v| v.to_string())
                .or_else(|| cell::<_, DateTime<Utc>>(row, idx).map(|v| v.to_rfc3339()))
                .or_else(|| cell::<_, NaiveDate>(row, idx).map(|v| v.to_string()))
                .or_else(|| cell::<_, NaiveTime>(row, idx).map(|v| v.to_string()))
                .map(JsonValue::String)
                .unwrap_or_else(|| decode_text(row, idx)),
            TypeCategory::Unknown => decode_text(row, idx),
        }
    }

    /// information_schema on MySQL 8 can report names as VARBINARY.
    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        let text = cell::<_, String>(row, idx).or_else(|| {
            cell::<_, Vec<u8>>(row, idx).and_then(|bytes| String::from_utf8(bytes).ok())
        });
        or_null(text)
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => match row.try_get::<Option<RawDecimal>, _>(idx) {
                Ok(v) => or_null(v.map(|d| d.0)),
                Err(e) => {
                    tracing::error!(column = idx, error = ?e, "Failed to decode NUMERIC");
                    JsonValue::Null
                }
            },
            // Postgres integer types only decode into their exact width
            TypeCategory::Integer => cell::<_, i64>(row, idx)
                .or_else(|| cell::<_, i32>(row, idx).map(i64::from))
                .or_else(|| cell::<_, i16>(row, idx).map(i64::from))
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => cell::<_, f64>(row, idx)
                .or_else(|| cell::<_, f32>(row, idx).map(f64::from))
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Boolean => or_null(cell::<_, bool>(row, idx)),
            TypeCategory::Binary => cell::<_, Vec<u8>>(row, idx)
                .map(|v| encode_binary_value(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => cell::<_, JsonValue>(row, idx).unwrap_or(JsonValue::Null),
            TypeCategory::Temporal => or_null(
                cell::<_, DateTime<Utc>>(row, idx)
                    .map(|v| v.to_rfc3339())
                    .or_else(|| cell::<_, NaiveDateTime>(row, idx).map(|v| v.to_string()))
                    .or_else(|| cell::<_, NaiveDate>(row, idx).map(|v| v.to_string()))
                    .or_else(|| cell::<_, NaiveTime>(row, idx).map(|v| v.to_string())),
            ),
            TypeCategory::Unknown => or_null(cell::<_, String>(row, idx)),
        }
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => or_null(cell::<_, i64>(row, idx)),
            TypeCategory::Boolean => or_null(cell::<_, bool>(row, idx)),
            TypeCategory::Float | TypeCategory::Decimal => cell::<_, f64>(row, idx)
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => cell::<_, Vec<u8>>(row, idx)
                .map(|v| encode_binary_value(&v))
                .unwrap_or(JsonValue::Null),
            _ => decode_text(row, idx),
        }
    }

    /// Text, JSON documents stored as text, or the runtime storage class of
    /// untyped expression columns.
    fn decode_text(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Some(text) = cell::<_, String>(row, idx) {
            return match serde_json::from_str::<JsonValue>(&text) {
                Ok(doc) if doc.is_object() || doc.is_array() => doc,
                _ => JsonValue::String(text),
            };
        }
        cell::<_, i64>(row, idx)
            .map(JsonValue::from)
            .or_else(|| cell::<_, f64>(row, idx).map(float_value))
            .unwrap_or(JsonValue::Null)
    }
}
