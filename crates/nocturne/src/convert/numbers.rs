//! Value-level conversions shared by the reader and writer tables.
//!
//! Every narrowing is range-checked. Floating point and decimal values only
//! convert to integers when they carry no fractional part.

use std::any::type_name;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use nocturne_sql::types::parse_timestamp;
use nocturne_sql::{SqlType, SqlValue};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use uuid::Uuid;

fn cannot(value: &SqlValue, what: &str) -> String {
    format!("cannot convert {} value {} to {}", value.natural_type(), value, what)
}

fn unparsable(s: &str, what: &str) -> String {
    format!("cannot parse {:?} as {}", s, what)
}

pub fn narrow<T: TryFrom<i64>>(v: i64) -> Result<T, String> {
    T::try_from(v).map_err(|_| format!("{} out of range for {}", v, type_name::<T>()))
}

pub fn f64_to_i64_exact(v: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or above it overflows i64.
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < 9_223_372_036_854_775_808.0 {
        Some(v as i64)
    } else {
        None
    }
}

pub fn decimal_to_i64_exact(d: Decimal) -> Option<i64> {
    if d.fract().is_zero() { d.to_i64() } else { None }
}

pub fn f64_to_f32(v: f64) -> Result<f32, String> {
    if v.is_finite() && v.abs() > f32::MAX as f64 {
        Err(format!("{} out of range for f32", v))
    } else {
        Ok(v as f32)
    }
}

pub fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(unparsable(s, "bool")),
    }
}

pub fn as_bool(value: &SqlValue) -> Result<bool, String> {
    match value {
        SqlValue::Bool(b) => Ok(*b),
        SqlValue::Text(s) => parse_bool(s),
        other => as_i64(other)
            .map(|n| n != 0)
            .map_err(|_| cannot(other, "bool")),
    }
}

pub fn as_i64(value: &SqlValue) -> Result<i64, String> {
    match value {
        SqlValue::TinyInt(v) => Ok(*v as i64),
        SqlValue::SmallInt(v) => Ok(*v as i64),
        SqlValue::Int(v) => Ok(*v as i64),
        SqlValue::BigInt(v) => Ok(*v),
        SqlValue::Bool(b) => Ok(*b as i64),
        SqlValue::Real(v) => f64_to_i64_exact(*v as f64).ok_or_else(|| cannot(value, "integer")),
        SqlValue::Double(v) => f64_to_i64_exact(*v).ok_or_else(|| cannot(value, "integer")),
        SqlValue::Decimal(d) => decimal_to_i64_exact(*d).ok_or_else(|| cannot(value, "integer")),
        SqlValue::Text(s) => s.trim().parse().map_err(|_| unparsable(s, "integer")),
        other => Err(cannot(other, "integer")),
    }
}

pub fn as_f64(value: &SqlValue) -> Result<f64, String> {
    match value {
        SqlValue::TinyInt(v) => Ok(*v as f64),
        SqlValue::SmallInt(v) => Ok(*v as f64),
        SqlValue::Int(v) => Ok(*v as f64),
        SqlValue::BigInt(v) => Ok(*v as f64),
        SqlValue::Real(v) => Ok(*v as f64),
        SqlValue::Double(v) => Ok(*v),
        SqlValue::Decimal(d) => d.to_f64().ok_or_else(|| cannot(value, "float")),
        SqlValue::Text(s) => s.trim().parse().map_err(|_| unparsable(s, "float")),
        other => Err(cannot(other, "float")),
    }
}

pub fn as_decimal(value: &SqlValue) -> Result<Decimal, String> {
    match value {
        SqlValue::TinyInt(v) => Ok(Decimal::from(*v)),
        SqlValue::SmallInt(v) => Ok(Decimal::from(*v)),
        SqlValue::Int(v) => Ok(Decimal::from(*v)),
        SqlValue::BigInt(v) => Ok(Decimal::from(*v)),
        SqlValue::Real(v) => Decimal::from_f32(*v).ok_or_else(|| cannot(value, "decimal")),
        SqlValue::Double(v) => Decimal::from_f64(*v).ok_or_else(|| cannot(value, "decimal")),
        SqlValue::Decimal(d) => Ok(*d),
        SqlValue::Text(s) => s.trim().parse().map_err(|_| unparsable(s, "decimal")),
        other => Err(cannot(other, "decimal")),
    }
}

pub fn as_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) | SqlValue::Json(s) => s.clone(),
        other => other.to_text().unwrap_or_default(),
    }
}

pub fn as_bytes(value: &SqlValue) -> Result<Vec<u8>, String> {
    match value {
        SqlValue::Bytes(b) => Ok(b.clone()),
        SqlValue::Text(s) => Ok(s.as_bytes().to_vec()),
        SqlValue::Uuid(u) => Ok(u.as_bytes().to_vec()),
        other => Err(cannot(other, "bytes")),
    }
}

pub fn as_date(value: &SqlValue) -> Result<NaiveDate, String> {
    match value {
        SqlValue::Date(d) => Ok(*d),
        SqlValue::Timestamp(ts) => Ok(ts.date()),
        SqlValue::Text(s) => {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| unparsable(s, "date"))
        }
        other => Err(cannot(other, "date")),
    }
}

pub fn as_time(value: &SqlValue) -> Result<NaiveTime, String> {
    match value {
        SqlValue::Time(t) => Ok(*t),
        SqlValue::Timestamp(ts) => Ok(ts.time()),
        SqlValue::Text(s) => {
            NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").map_err(|_| unparsable(s, "time"))
        }
        other => Err(cannot(other, "time")),
    }
}

pub fn as_timestamp(value: &SqlValue) -> Result<NaiveDateTime, String> {
    match value {
        SqlValue::Timestamp(ts) => Ok(*ts),
        SqlValue::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| cannot(value, "timestamp")),
        SqlValue::Text(s) => parse_timestamp(s.trim()).ok_or_else(|| unparsable(s, "timestamp")),
        other => Err(cannot(other, "timestamp")),
    }
}

pub fn as_uuid(value: &SqlValue) -> Result<Uuid, String> {
    match value {
        SqlValue::Uuid(u) => Ok(*u),
        SqlValue::Text(s) => Uuid::parse_str(s.trim()).map_err(|_| unparsable(s, "uuid")),
        SqlValue::Bytes(b) => Uuid::from_slice(b).map_err(|_| cannot(value, "uuid")),
        other => Err(cannot(other, "uuid")),
    }
}

/// Convert a value into the representation used for a column of type `target`.
pub fn coerce(value: SqlValue, target: SqlType) -> Result<SqlValue, String> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    Ok(match target {
        SqlType::Boolean => SqlValue::Bool(as_bool(&value)?),
        SqlType::TinyInt => SqlValue::TinyInt(narrow(as_i64(&value)?)?),
        SqlType::SmallInt => SqlValue::SmallInt(narrow(as_i64(&value)?)?),
        SqlType::Integer => SqlValue::Int(narrow(as_i64(&value)?)?),
        SqlType::BigInt => SqlValue::BigInt(as_i64(&value)?),
        SqlType::Real => SqlValue::Real(f64_to_f32(as_f64(&value)?)?),
        SqlType::Float | SqlType::Double => SqlValue::Double(as_f64(&value)?),
        SqlType::Numeric | SqlType::Decimal => SqlValue::Decimal(as_decimal(&value)?),
        SqlType::Char | SqlType::Varchar | SqlType::Text => SqlValue::Text(as_text(&value)),
        SqlType::Binary | SqlType::Varbinary => SqlValue::Bytes(as_bytes(&value)?),
        SqlType::Date => SqlValue::Date(as_date(&value)?),
        SqlType::Time => SqlValue::Time(as_time(&value)?),
        SqlType::Timestamp => SqlValue::Timestamp(as_timestamp(&value)?),
        SqlType::Uuid => SqlValue::Uuid(as_uuid(&value)?),
        SqlType::Json => SqlValue::Json(as_text(&value)),
        SqlType::Null | SqlType::Other => value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrowing_is_range_checked() {
        assert_eq!(narrow::<i8>(127).unwrap(), 127i8);
        assert!(narrow::<i8>(128).is_err());
        assert!(narrow::<i16>(-40_000).is_err());
        assert_eq!(narrow::<i32>(-5).unwrap(), -5);
    }

    #[test]
    fn test_float_to_integer_requires_integral_value() {
        assert_eq!(as_i64(&SqlValue::Double(42.0)).unwrap(), 42);
        assert!(as_i64(&SqlValue::Double(42.5)).is_err());
        assert!(as_i64(&SqlValue::Double(f64::NAN)).is_err());
        assert!(as_i64(&SqlValue::Double(1e19)).is_err());
        assert_eq!(as_i64(&SqlValue::Decimal(Decimal::new(1200, 2))).unwrap(), 12);
        assert!(as_i64(&SqlValue::Decimal(Decimal::new(1250, 2))).is_err());
    }

    #[test]
    fn test_strings_parse() {
        assert_eq!(as_i64(&SqlValue::Text(" 17 ".into())).unwrap(), 17);
        assert!(as_i64(&SqlValue::Text("seventeen".into())).is_err());
        assert!(as_bool(&SqlValue::Text("YES".into())).unwrap());
        assert!(!as_bool(&SqlValue::Int(0)).unwrap());
        assert_eq!(
            as_timestamp(&SqlValue::Text("2024-05-01T10:30:00".into()))
                .unwrap()
                .to_string(),
            "2024-05-01 10:30:00"
        );
    }

    #[test]
    fn test_coerce_to_column_types() {
        assert_eq!(coerce(SqlValue::BigInt(3), SqlType::SmallInt).unwrap(), SqlValue::SmallInt(3));
        assert!(coerce(SqlValue::BigInt(1 << 40), SqlType::Integer).is_err());
        assert_eq!(
            coerce(SqlValue::Bool(true), SqlType::Varchar).unwrap(),
            SqlValue::Text("true".into())
        );
        assert_eq!(coerce(SqlValue::Null, SqlType::Integer).unwrap(), SqlValue::Null);
        assert!(coerce(SqlValue::Double(1e300), SqlType::Real).is_err());
    }
}
