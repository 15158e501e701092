//! Tiberius row values to [`SqlValue`].

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::xml::XmlData;
use tiberius::Row;
use uuid::Uuid;

use crate::core::SqlValue;
use crate::error::Result;

/// How a column's values are read off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Bool,
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Uuid,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
    Bytes,
    Decimal,
    Xml,
    /// Character types; anything unknown is tried as text, then as bytes.
    Text,
}

impl ValueKind {
    fn of(data_type: &str) -> Self {
        match data_type.to_lowercase().as_str() {
            "bit" => ValueKind::Bool,
            "tinyint" => ValueKind::U8,
            "smallint" => ValueKind::I16,
            "int" => ValueKind::I32,
            "bigint" => ValueKind::I64,
            "real" => ValueKind::F32,
            "float" => ValueKind::F64,
            "uniqueidentifier" => ValueKind::Uuid,
            "datetime" | "datetime2" | "smalldatetime" => ValueKind::DateTime,
            "datetimeoffset" => ValueKind::DateTimeOffset,
            "date" => ValueKind::Date,
            "time" => ValueKind::Time,
            "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => ValueKind::Bytes,
            "decimal" | "numeric" | "money" | "smallmoney" => ValueKind::Decimal,
            "xml" => ValueKind::Xml,
            _ => ValueKind::Text,
        }
    }
}

/// Convert column `idx` of `row`, borrowing text and binary payloads.
pub fn convert_row_value<'r>(row: &'r Row, idx: usize, data_type: &str) -> Result<SqlValue<'r>> {
    let value = match ValueKind::of(data_type) {
        ValueKind::Bool => row.try_get::<bool, _>(idx)?.map(SqlValue::Bool),
        ValueKind::U8 => row.try_get::<u8, _>(idx)?.map(SqlValue::U8),
        ValueKind::I16 => row.try_get::<i16, _>(idx)?.map(SqlValue::I16),
        ValueKind::I32 => row.try_get::<i32, _>(idx)?.map(SqlValue::I32),
        ValueKind::I64 => row.try_get::<i64, _>(idx)?.map(SqlValue::I64),
        ValueKind::F32 => row.try_get::<f32, _>(idx)?.map(SqlValue::F32),
        ValueKind::F64 => row.try_get::<f64, _>(idx)?.map(SqlValue::F64),
        ValueKind::Uuid => row.try_get::<Uuid, _>(idx)?.map(SqlValue::Uuid),
        ValueKind::DateTime => row
            .try_get::<NaiveDateTime, _>(idx)?
            .map(SqlValue::DateTime),
        ValueKind::DateTimeOffset => row
            .try_get::<DateTime<FixedOffset>, _>(idx)?
            .map(SqlValue::DateTimeOffset),
        ValueKind::Date => row.try_get::<NaiveDate, _>(idx)?.map(SqlValue::Date),
        ValueKind::Time => row.try_get::<NaiveTime, _>(idx)?.map(SqlValue::Time),
        ValueKind::Bytes => row
            .try_get::<&[u8], _>(idx)?
            .map(|v| SqlValue::Bytes(Cow::Borrowed(v))),
        ValueKind::Decimal => match row.try_get::<Decimal, _>(idx) {
            Ok(v) => v.map(SqlValue::Decimal),
            // money arrives as a float
            Err(_) => row.try_get::<f64, _>(idx)?.map(|f| {
                Decimal::try_from(f)
                    .map(SqlValue::Decimal)
                    .unwrap_or(SqlValue::F64(f))
            }),
        },
        ValueKind::Xml => row
            .try_get::<&XmlData, _>(idx)?
            .map(|x| SqlValue::Text(Cow::Borrowed(x.as_ref()))),
        ValueKind::Text => match row.try_get::<&str, _>(idx) {
            Ok(v) => v.map(|s| SqlValue::Text(Cow::Borrowed(s))),
            Err(_) => row
                .try_get::<&[u8], _>(idx)?
                .map(|v| SqlValue::Bytes(Cow::Borrowed(v))),
        },
    };

    Ok(value.unwrap_or(SqlValue::Null))
}
