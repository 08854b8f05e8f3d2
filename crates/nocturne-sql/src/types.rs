//! Column type tags and dynamically typed values.
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{DriverError, DriverResult};

/// Well-known PostgreSQL type OIDs, for drivers that report column types that way.
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const BYTEA: u32 = 17;
    pub const CHAR: u32 = 18;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const OID: u32 = 26;
    pub const JSON: u32 = 114;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const BPCHAR: u32 = 1042;
    pub const VARCHAR: u32 = 1043;
    pub const DATE: u32 = 1082;
    pub const TIME: u32 = 1083;
    pub const TIMESTAMP: u32 = 1114;
    pub const TIMESTAMPTZ: u32 = 1184;
    pub const NUMERIC: u32 = 1700;
    pub const UUID: u32 = 2950;
    pub const JSONB: u32 = 3802;
}

/// The closed set of column type identifiers the conversion tables are keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    Text,
    Binary,
    Varbinary,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
    Null,
    Other,
}

impl SqlType {
    pub const ALL: [SqlType; 22] = [
        SqlType::Boolean,
        SqlType::TinyInt,
        SqlType::SmallInt,
        SqlType::Integer,
        SqlType::BigInt,
        SqlType::Real,
        SqlType::Float,
        SqlType::Double,
        SqlType::Numeric,
        SqlType::Decimal,
        SqlType::Char,
        SqlType::Varchar,
        SqlType::Text,
        SqlType::Binary,
        SqlType::Varbinary,
        SqlType::Date,
        SqlType::Time,
        SqlType::Timestamp,
        SqlType::Uuid,
        SqlType::Json,
        SqlType::Null,
        SqlType::Other,
    ];

    /// Canonical upper-case name, as used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::Float => "FLOAT",
            SqlType::Double => "DOUBLE",
            SqlType::Numeric => "NUMERIC",
            SqlType::Decimal => "DECIMAL",
            SqlType::Char => "CHAR",
            SqlType::Varchar => "VARCHAR",
            SqlType::Text => "TEXT",
            SqlType::Binary => "BINARY",
            SqlType::Varbinary => "VARBINARY",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Uuid => "UUID",
            SqlType::Json => "JSON",
            SqlType::Null => "NULL",
            SqlType::Other => "OTHER",
        }
    }

    /// Map a PostgreSQL type OID to a tag. Unknown OIDs become [`SqlType::Other`].
    pub fn from_oid(type_oid: u32) -> Self {
        match type_oid {
            oid::BOOL => SqlType::Boolean,
            oid::BYTEA => SqlType::Varbinary,
            oid::CHAR | oid::BPCHAR => SqlType::Char,
            oid::INT2 => SqlType::SmallInt,
            oid::INT4 | oid::OID => SqlType::Integer,
            oid::INT8 => SqlType::BigInt,
            oid::TEXT => SqlType::Text,
            oid::VARCHAR => SqlType::Varchar,
            oid::FLOAT4 => SqlType::Real,
            oid::FLOAT8 => SqlType::Double,
            oid::NUMERIC => SqlType::Numeric,
            oid::DATE => SqlType::Date,
            oid::TIME => SqlType::Time,
            oid::TIMESTAMP | oid::TIMESTAMPTZ => SqlType::Timestamp,
            oid::UUID => SqlType::Uuid,
            oid::JSON | oid::JSONB => SqlType::Json,
            _ => SqlType::Other,
        }
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }

    pub fn is_textual(self) -> bool {
        matches!(self, SqlType::Char | SqlType::Varchar | SqlType::Text)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlType {
    type Err = DriverError;

    /// Parses canonical names and the common aliases (`INT`, `INT8`, `BOOL`, ...).
    fn from_str(s: &str) -> DriverResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let ty = match upper.as_str() {
            "BOOLEAN" | "BOOL" | "BIT" => SqlType::Boolean,
            "TINYINT" => SqlType::TinyInt,
            "SMALLINT" | "INT2" => SqlType::SmallInt,
            "INTEGER" | "INT" | "INT4" => SqlType::Integer,
            "BIGINT" | "INT8" => SqlType::BigInt,
            "REAL" | "FLOAT4" => SqlType::Real,
            "FLOAT" => SqlType::Float,
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" => SqlType::Double,
            "NUMERIC" => SqlType::Numeric,
            "DECIMAL" => SqlType::Decimal,
            "CHAR" | "BPCHAR" => SqlType::Char,
            "VARCHAR" | "CHARACTER VARYING" => SqlType::Varchar,
            "TEXT" | "LONGVARCHAR" | "CLOB" => SqlType::Text,
            "BINARY" => SqlType::Binary,
            "VARBINARY" | "BYTEA" | "BLOB" => SqlType::Varbinary,
            "DATE" => SqlType::Date,
            "TIME" => SqlType::Time,
            "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" => SqlType::Timestamp,
            "UUID" => SqlType::Uuid,
            "JSON" | "JSONB" => SqlType::Json,
            "NULL" => SqlType::Null,
            "OTHER" => SqlType::Other,
            _ => {
                return Err(DriverError::TypeConversion(format!(
                    "no such SQL type: {}",
                    s
                )));
            }
        };
        Ok(ty)
    }
}

/// A value as it travels to and from the driver: a bound parameter or a decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Json(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The column type this value would naturally be stored in.
    pub fn natural_type(&self) -> SqlType {
        match self {
            SqlValue::Null => SqlType::Null,
            SqlValue::Bool(_) => SqlType::Boolean,
            SqlValue::TinyInt(_) => SqlType::TinyInt,
            SqlValue::SmallInt(_) => SqlType::SmallInt,
            SqlValue::Int(_) => SqlType::Integer,
            SqlValue::BigInt(_) => SqlType::BigInt,
            SqlValue::Real(_) => SqlType::Real,
            SqlValue::Double(_) => SqlType::Double,
            SqlValue::Decimal(_) => SqlType::Decimal,
            SqlValue::Text(_) => SqlType::Varchar,
            SqlValue::Bytes(_) => SqlType::Varbinary,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::Time(_) => SqlType::Time,
            SqlValue::Timestamp(_) => SqlType::Timestamp,
            SqlValue::Uuid(_) => SqlType::Uuid,
            SqlValue::Json(_) => SqlType::Json,
        }
    }

    /// Render this value in text format (`None` for NULL).
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::TinyInt(v) => Some(v.to_string()),
            SqlValue::SmallInt(v) => Some(v.to_string()),
            SqlValue::Int(v) => Some(v.to_string()),
            SqlValue::BigInt(v) => Some(v.to_string()),
            SqlValue::Real(v) => Some(v.to_string()),
            SqlValue::Double(v) => Some(v.to_string()),
            SqlValue::Decimal(v) => Some(v.to_string()),
            SqlValue::Text(s) | SqlValue::Json(s) => Some(s.clone()),
            SqlValue::Bytes(b) => Some(encode_bytea_hex(b)),
            SqlValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            SqlValue::Time(t) => Some(t.format("%H:%M:%S%.f").to_string()),
            SqlValue::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            SqlValue::Uuid(u) => Some(u.to_string()),
        }
    }

    /// Parse a text-format cell according to its column type.
    pub fn from_text(ty: SqlType, s: &str) -> DriverResult<Self> {
        let invalid = |what: &str| DriverError::TypeConversion(format!("invalid {}: {:?}", what, s));
        match ty {
            SqlType::Boolean => match s {
                "t" | "true" | "TRUE" | "1" => Ok(SqlValue::Bool(true)),
                "f" | "false" | "FALSE" | "0" => Ok(SqlValue::Bool(false)),
                _ => Err(invalid("BOOLEAN")),
            },
            SqlType::TinyInt => s.parse().map(SqlValue::TinyInt).map_err(|_| invalid("TINYINT")),
            SqlType::SmallInt => s.parse().map(SqlValue::SmallInt).map_err(|_| invalid("SMALLINT")),
            SqlType::Integer => s.parse().map(SqlValue::Int).map_err(|_| invalid("INTEGER")),
            SqlType::BigInt => s.parse().map(SqlValue::BigInt).map_err(|_| invalid("BIGINT")),
            SqlType::Real => s.parse().map(SqlValue::Real).map_err(|_| invalid("REAL")),
            SqlType::Float | SqlType::Double => {
                s.parse().map(SqlValue::Double).map_err(|_| invalid("DOUBLE"))
            }
            SqlType::Numeric | SqlType::Decimal => {
                s.parse().map(SqlValue::Decimal).map_err(|_| invalid("NUMERIC"))
            }
            SqlType::Binary | SqlType::Varbinary => decode_bytea_hex(s)
                .map(SqlValue::Bytes)
                .ok_or_else(|| invalid("BYTEA")),
            SqlType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(SqlValue::Date)
                .map_err(|_| invalid("DATE")),
            SqlType::Time => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .map(SqlValue::Time)
                .map_err(|_| invalid("TIME")),
            SqlType::Timestamp => parse_timestamp(s)
                .map(SqlValue::Timestamp)
                .ok_or_else(|| invalid("TIMESTAMP")),
            SqlType::Uuid => Uuid::parse_str(s).map(SqlValue::Uuid).map_err(|_| invalid("UUID")),
            SqlType::Json => Ok(SqlValue::Json(s.to_string())),
            SqlType::Null => Ok(SqlValue::Null),
            SqlType::Char | SqlType::Varchar | SqlType::Text | SqlType::Other => {
                Ok(SqlValue::Text(s.to_string()))
            }
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

/// Accepts both `2024-01-31 12:00:00` and the ISO `T` separator.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

fn encode_bytea_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Decode PostgreSQL hex-format bytea (\\x prefix).
/// `None` when a digit is not hex or the digit count is odd.
fn decode_bytea_hex(s: &str) -> Option<Vec<u8>> {
    let Some(hex) = s.strip_prefix("\\x") else {
        return Some(s.as_bytes().to_vec());
    };
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    bytes
        .chunks_exact(2)
        .map(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
