use nocturne_sql::{DriverResult, Row, SqlValue};

/// The primitive row getter a reader fetches a cell with before adapting it.
///
/// Each accessor normalizes the cell into one [`SqlValue`] variant (or `Null`),
/// so the adapter only has to handle a single input shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    String,
    Bytes,
    Date,
    Time,
    Timestamp,
    Uuid,
    /// The raw cell, unchanged.
    Value,
}

impl Accessor {
    pub fn fetch(self, row: &Row, index: usize) -> DriverResult<SqlValue> {
        fn wrap<T>(v: Option<T>, f: impl FnOnce(T) -> SqlValue) -> SqlValue {
            v.map_or(SqlValue::Null, f)
        }
        Ok(match self {
            Accessor::Bool => wrap(row.get_bool(index)?, SqlValue::Bool),
            Accessor::I8 => wrap(row.get_i8(index)?, SqlValue::TinyInt),
            Accessor::I16 => wrap(row.get_i16(index)?, SqlValue::SmallInt),
            Accessor::I32 => wrap(row.get_i32(index)?, SqlValue::Int),
            Accessor::I64 => wrap(row.get_i64(index)?, SqlValue::BigInt),
            Accessor::F32 => wrap(row.get_f32(index)?, SqlValue::Real),
            Accessor::F64 => wrap(row.get_f64(index)?, SqlValue::Double),
            Accessor::Decimal => wrap(row.get_decimal(index)?, SqlValue::Decimal),
            Accessor::String => wrap(row.get_string(index)?, SqlValue::Text),
            Accessor::Bytes => wrap(row.get_bytes(index)?, SqlValue::Bytes),
            Accessor::Date => wrap(row.get_date(index)?, SqlValue::Date),
            Accessor::Time => wrap(row.get_time(index)?, SqlValue::Time),
            Accessor::Timestamp => wrap(row.get_timestamp(index)?, SqlValue::Timestamp),
            Accessor::Uuid => wrap(row.get_uuid(index)?, SqlValue::Uuid),
            Accessor::Value => row.get(index)?.clone(),
        })
    }
}
