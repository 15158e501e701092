//! T-SQL literal encoding for row values.

use std::fmt::Write;

use chrono::{NaiveTime, Timelike};

use crate::core::{Column, SqlValue};

/// Largest declared varbinary length; anything above is `MAX`.
const MAX_VARBINARY_LENGTH: i32 = 8000;

/// Append the literal for `value` in `column` to `out`.
pub fn push_literal(out: &mut String, value: &SqlValue<'_>, column: &Column) {
    match value {
        SqlValue::Null => out.push_str("NULL"),
        SqlValue::Bytes(bytes) => {
            // style 1 parses the string as hex instead of taking its characters
            let _ = write!(
                out,
                "CONVERT(varbinary({}), '0x{}', 1)",
                varbinary_length(column),
                hex::encode_upper(bytes)
            );
        }
        SqlValue::Uuid(uuid) => {
            let _ = write!(out, "CONVERT(uniqueidentifier, '{}')", uuid);
        }
        SqlValue::Text(text) => {
            out.push_str("N'");
            push_escaped(out, text);
            out.push('\'');
        }
        SqlValue::Bool(b) => out.push_str(if *b { "'1'" } else { "'0'" }),
        SqlValue::U8(v) => quoted(out, v),
        SqlValue::I16(v) => quoted(out, v),
        SqlValue::I32(v) => quoted(out, v),
        SqlValue::I64(v) => quoted(out, v),
        SqlValue::F32(v) => quoted(out, v),
        SqlValue::F64(v) => quoted(out, v),
        SqlValue::Decimal(v) => quoted(out, v),
        SqlValue::Date(d) => quoted(out, d.format("%Y-%m-%d")),
        SqlValue::Time(t) => {
            out.push('\'');
            push_time(out, t, 7);
            out.push('\'');
        }
        SqlValue::DateTime(dt) => {
            let digits = if legacy_datetime(column) { 3 } else { 7 };
            out.push('\'');
            let _ = write!(out, "{}T", dt.format("%Y-%m-%d"));
            push_time(out, &dt.time(), digits);
            out.push('\'');
        }
        SqlValue::DateTimeOffset(dto) => {
            out.push('\'');
            let _ = write!(out, "{}T", dto.format("%Y-%m-%d"));
            push_time(out, &dto.time(), 7);
            let _ = write!(out, "{}", dto.format("%:z"));
            out.push('\'');
        }
    }
}

fn quoted(out: &mut String, value: impl std::fmt::Display) {
    let _ = write!(out, "'{}'", value);
}

/// Double every single quote.
pub fn push_escaped(out: &mut String, text: &str) {
    for (i, part) in text.split('\'').enumerate() {
        if i > 0 {
            out.push_str("''");
        }
        out.push_str(part);
    }
}

fn varbinary_length(column: &Column) -> String {
    match column.max_length {
        Some(n) if n > 0 && n <= MAX_VARBINARY_LENGTH => n.to_string(),
        _ => "MAX".to_string(),
    }
}

/// datetime and smalldatetime only parse up to three fractional digits.
fn legacy_datetime(column: &Column) -> bool {
    matches!(
        column.data_type.to_lowercase().as_str(),
        "datetime" | "smalldatetime"
    )
}

/// `hh:mm:ss` plus `digits` fractional digits (truncated, 1..=7).
fn push_time(out: &mut String, time: &NaiveTime, digits: u32) {
    let _ = write!(out, "{}", time.format("%H:%M:%S"));
    // leap second nanos exceed 999_999_999
    let nanos = time.nanosecond().min(999_999_999);
    let fraction = nanos / 10u32.pow(9 - digits);
    let _ = write!(out, ".{:0width$}", fraction, width = digits as usize);
}
