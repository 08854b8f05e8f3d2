//! Row abstraction for query results.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use uuid::Uuid;

use crate::error::{DriverError, DriverResult};
use crate::types::{SqlType, SqlValue, parse_timestamp};

/// Result-set column metadata: label plus type tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub label: String,
    pub sql_type: SqlType,
}

impl Column {
    pub fn new(label: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            label: label.into(),
            sql_type,
        }
    }
}

/// A row returned from a query. Column metadata is shared by every row of a cursor.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a new row. Missing trailing values are padded with NULL.
    pub fn new(columns: Arc<[Column]>, mut values: Vec<SqlValue>) -> Self {
        values.resize(columns.len(), SqlValue::Null);
        Self { columns, values }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the row is empty.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column descriptions.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get a column value by index.
    pub fn get(&self, index: usize) -> DriverResult<&SqlValue> {
        self.values.get(index).ok_or(DriverError::ColumnIndex {
            index,
            len: self.values.len(),
        })
    }

    /// Get a column value by label (case-sensitive, first match wins).
    pub fn get_by_name(&self, name: &str) -> DriverResult<&SqlValue> {
        let index = self
            .columns
            .iter()
            .position(|c| c.label == name)
            .ok_or_else(|| DriverError::ColumnNotFound(name.to_string()))?;
        self.get(index)
    }

    /// Move all values out of the row.
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    pub fn get_bool(&self, index: usize) -> DriverResult<Option<bool>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Bool(v) => Ok(Some(*v)),
            other => Err(mismatch(other, "bool")),
        }
    }

    pub fn get_i8(&self, index: usize) -> DriverResult<Option<i8>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::TinyInt(v) => Ok(Some(*v)),
            other => Err(mismatch(other, "i8")),
        }
    }

    pub fn get_i16(&self, index: usize) -> DriverResult<Option<i16>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::SmallInt(v) => Ok(Some(*v)),
            SqlValue::TinyInt(v) => Ok(Some(*v as i16)),
            other => Err(mismatch(other, "i16")),
        }
    }

    pub fn get_i32(&self, index: usize) -> DriverResult<Option<i32>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Int(v) => Ok(Some(*v)),
            SqlValue::SmallInt(v) => Ok(Some(*v as i32)),
            SqlValue::TinyInt(v) => Ok(Some(*v as i32)),
            other => Err(mismatch(other, "i32")),
        }
    }

    pub fn get_i64(&self, index: usize) -> DriverResult<Option<i64>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::BigInt(v) => Ok(Some(*v)),
            SqlValue::Int(v) => Ok(Some(*v as i64)),
            SqlValue::SmallInt(v) => Ok(Some(*v as i64)),
            SqlValue::TinyInt(v) => Ok(Some(*v as i64)),
            other => Err(mismatch(other, "i64")),
        }
    }

    pub fn get_f32(&self, index: usize) -> DriverResult<Option<f32>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Real(v) => Ok(Some(*v)),
            other => Err(mismatch(other, "f32")),
        }
    }

    pub fn get_f64(&self, index: usize) -> DriverResult<Option<f64>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Double(v) => Ok(Some(*v)),
            SqlValue::Real(v) => Ok(Some(*v as f64)),
            other => Err(mismatch(other, "f64")),
        }
    }

    /// Exact numerics. Integers widen losslessly, floats are converted if finite.
    pub fn get_decimal(&self, index: usize) -> DriverResult<Option<Decimal>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Decimal(v) => Ok(Some(*v)),
            SqlValue::BigInt(v) => Ok(Some(Decimal::from(*v))),
            SqlValue::Int(v) => Ok(Some(Decimal::from(*v))),
            SqlValue::SmallInt(v) => Ok(Some(Decimal::from(*v))),
            SqlValue::TinyInt(v) => Ok(Some(Decimal::from(*v))),
            SqlValue::Double(v) => Decimal::from_f64(*v)
                .map(Some)
                .ok_or_else(|| DriverError::TypeConversion(format!("{} is not a decimal", v))),
            SqlValue::Real(v) => Decimal::from_f32(*v)
                .map(Some)
                .ok_or_else(|| DriverError::TypeConversion(format!("{} is not a decimal", v))),
            other => Err(mismatch(other, "decimal")),
        }
    }

    /// Text representation of any non-NULL cell.
    pub fn get_string(&self, index: usize) -> DriverResult<Option<String>> {
        match self.get(index)? {
            SqlValue::Text(s) | SqlValue::Json(s) => Ok(Some(s.clone())),
            other => Ok(other.to_text()),
        }
    }

    pub fn get_bytes(&self, index: usize) -> DriverResult<Option<Vec<u8>>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Bytes(b) => Ok(Some(b.clone())),
            SqlValue::Text(s) => Ok(Some(s.as_bytes().to_vec())),
            other => Err(mismatch(other, "bytes")),
        }
    }

    pub fn get_date(&self, index: usize) -> DriverResult<Option<NaiveDate>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Date(d) => Ok(Some(*d)),
            SqlValue::Timestamp(ts) => Ok(Some(ts.date())),
            other => Err(mismatch(other, "date")),
        }
    }

    pub fn get_time(&self, index: usize) -> DriverResult<Option<NaiveTime>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Time(t) => Ok(Some(*t)),
            SqlValue::Timestamp(ts) => Ok(Some(ts.time())),
            other => Err(mismatch(other, "time")),
        }
    }

    pub fn get_timestamp(&self, index: usize) -> DriverResult<Option<NaiveDateTime>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Timestamp(ts) => Ok(Some(*ts)),
            SqlValue::Date(d) => Ok(d.and_hms_opt(0, 0, 0)),
            SqlValue::Text(s) => parse_timestamp(s)
                .map(Some)
                .ok_or_else(|| DriverError::TypeConversion(format!("invalid timestamp: {:?}", s))),
            other => Err(mismatch(other, "timestamp")),
        }
    }

    pub fn get_uuid(&self, index: usize) -> DriverResult<Option<Uuid>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Uuid(u) => Ok(Some(*u)),
            SqlValue::Text(s) => Uuid::parse_str(s)
                .map(Some)
                .map_err(|_| DriverError::TypeConversion(format!("invalid uuid: {:?}", s))),
            other => Err(mismatch(other, "uuid")),
        }
    }
}

fn mismatch(value: &SqlValue, target: &str) -> DriverError {
    DriverError::TypeConversion(format!(
        "cannot read {} value as {}",
        value.natural_type(),
        target
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let columns: Arc<[Column]> = vec![
            Column::new("ID", SqlType::Integer),
            Column::new("NAME", SqlType::Varchar),
            Column::new("SCORE", SqlType::Double),
        ]
        .into();
        Row::new(
            columns,
            vec![SqlValue::Int(7), SqlValue::Text("Alice".into())],
        )
    }

    #[test]
    fn test_short_rows_are_padded_with_null() {
        let row = row();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get(2).unwrap(), &SqlValue::Null);
        assert_eq!(row.get_f64(2).unwrap(), None);
    }

    #[test]
    fn test_widening_accessors() {
        let row = row();
        assert_eq!(row.get_i32(0).unwrap(), Some(7));
        assert_eq!(row.get_i64(0).unwrap(), Some(7));
        assert_eq!(row.get_decimal(0).unwrap(), Some(Decimal::from(7)));
        assert_eq!(row.get_string(0).unwrap(), Some("7".to_string()));
        assert!(row.get_i16(0).is_err());
        assert!(row.get_bool(1).is_err());
    }

    #[test]
    fn test_lookup_by_name_and_range() {
        let row = row();
        assert_eq!(
            row.get_by_name("NAME").unwrap(),
            &SqlValue::Text("Alice".into())
        );
        assert!(matches!(
            row.get_by_name("name"),
            Err(DriverError::ColumnNotFound(_))
        ));
        assert!(matches!(
            row.get(9),
            Err(DriverError::ColumnIndex { index: 9, len: 3 })
        ));
    }
}
