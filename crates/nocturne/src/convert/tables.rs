//! Predefined converter tables.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use nocturne_sql::{SqlType, SqlValue};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::numbers::{
    as_bool, as_bytes, as_date, as_decimal, as_f64, as_i64, as_text, as_time, as_timestamp,
    as_uuid, coerce, f64_to_f32, narrow,
};
use super::reader::unexpected;
use super::{Accessor, ColumnReader, ColumnWriter, RegistryBuilder};

const INTEGERS: [SqlType; 4] = [SqlType::TinyInt, SqlType::SmallInt, SqlType::Integer, SqlType::BigInt];
const FLOATS: [SqlType; 3] = [SqlType::Real, SqlType::Float, SqlType::Double];
const DECIMALS: [SqlType; 2] = [SqlType::Numeric, SqlType::Decimal];
const TEXTS: [SqlType; 3] = [SqlType::Char, SqlType::Varchar, SqlType::Text];
const BINARIES: [SqlType; 2] = [SqlType::Binary, SqlType::Varbinary];

pub(super) fn install(b: &mut RegistryBuilder) {
    install_readers(b);
    install_writers(b);
}

fn non_null<T>(
    value: SqlValue,
    f: impl FnOnce(&SqlValue) -> Result<T, String>,
) -> Result<T, String> {
    if value.is_null() {
        unexpected(value)
    } else {
        f(&value)
    }
}

fn read_int<T: TryFrom<i64>>(value: SqlValue) -> Result<T, String> {
    non_null(value, |v| as_i64(v).and_then(narrow::<T>))
}

fn read_f32(value: SqlValue) -> Result<f32, String> {
    non_null(value, |v| as_f64(v).and_then(f64_to_f32))
}

fn read_f64(value: SqlValue) -> Result<f64, String> {
    non_null(value, as_f64)
}

fn read_decimal(value: SqlValue) -> Result<Decimal, String> {
    non_null(value, as_decimal)
}

fn read_bool(value: SqlValue) -> Result<bool, String> {
    non_null(value, as_bool)
}

fn read_string(value: SqlValue) -> Result<String, String> {
    non_null(value, |v| Ok(as_text(v)))
}

fn read_bytes(value: SqlValue) -> Result<Vec<u8>, String> {
    non_null(value, as_bytes)
}

fn read_date(value: SqlValue) -> Result<NaiveDate, String> {
    non_null(value, as_date)
}

fn read_time(value: SqlValue) -> Result<NaiveTime, String> {
    non_null(value, as_time)
}

fn read_timestamp(value: SqlValue) -> Result<NaiveDateTime, String> {
    non_null(value, as_timestamp)
}

fn read_uuid(value: SqlValue) -> Result<Uuid, String> {
    non_null(value, as_uuid)
}

/// Register `adapter` for `T` under every (column type, accessor) pair, plus
/// NULL-typed columns, and the matching `Option<T>` table.
fn readers<T: 'static>(
    b: &mut RegistryBuilder,
    natural: SqlType,
    entries: &[(SqlType, Accessor)],
    adapter: fn(SqlValue) -> Result<T, String>,
) {
    let null = std::iter::once((SqlType::Null, Accessor::Value));
    for (sql_type, accessor) in entries.iter().copied().chain(null) {
        let reader = ColumnReader::new(accessor, adapter);
        b.insert_reader::<Option<T>>(natural, sql_type, reader.optional());
        b.insert_reader::<T>(natural, sql_type, reader);
    }
}

fn each(types: &[SqlType], accessor: Accessor) -> impl Iterator<Item = (SqlType, Accessor)> + '_ {
    types.iter().map(move |t| (*t, accessor))
}

fn install_readers(b: &mut RegistryBuilder) {
    let integral: Vec<_> = each(&INTEGERS, Accessor::I64)
        .chain(each(&FLOATS, Accessor::F64))
        .chain(each(&DECIMALS, Accessor::Decimal))
        .chain(each(&[SqlType::Boolean], Accessor::Bool))
        .chain(each(&TEXTS, Accessor::String))
        .collect();
    readers::<i8>(b, SqlType::TinyInt, &integral, read_int::<i8>);
    readers::<i16>(b, SqlType::SmallInt, &integral, read_int::<i16>);
    readers::<i32>(b, SqlType::Integer, &integral, read_int::<i32>);
    readers::<i64>(b, SqlType::BigInt, &integral, read_int::<i64>);

    let floating: Vec<_> = each(&FLOATS, Accessor::F64)
        .chain(each(&DECIMALS, Accessor::Decimal))
        .chain(each(&INTEGERS, Accessor::I64))
        .chain(each(&TEXTS, Accessor::String))
        .collect();
    let mut single = floating.clone();
    single[0] = (SqlType::Real, Accessor::F32);
    readers::<f32>(b, SqlType::Real, &single, read_f32);
    readers::<f64>(b, SqlType::Double, &floating, read_f64);

    let exact: Vec<_> = each(&DECIMALS, Accessor::Decimal)
        .chain(each(&INTEGERS, Accessor::Decimal))
        .chain(each(&FLOATS, Accessor::F64))
        .chain(each(&TEXTS, Accessor::String))
        .collect();
    readers::<Decimal>(b, SqlType::Decimal, &exact, read_decimal);

    let boolean: Vec<_> = each(&[SqlType::Boolean], Accessor::Bool)
        .chain(each(&INTEGERS, Accessor::I64))
        .chain(each(&TEXTS, Accessor::String))
        .collect();
    readers::<bool>(b, SqlType::Boolean, &boolean, read_bool);

    let textual: Vec<_> = SqlType::ALL
        .iter()
        .filter(|t| **t != SqlType::Null)
        .map(|t| (*t, Accessor::String))
        .collect();
    readers::<String>(b, SqlType::Varchar, &textual, read_string);

    let binary: Vec<_> = each(&BINARIES, Accessor::Bytes)
        .chain(each(&TEXTS, Accessor::Bytes))
        .chain(each(&[SqlType::Uuid], Accessor::Uuid))
        .collect();
    readers::<Vec<u8>>(b, SqlType::Varbinary, &binary, read_bytes);

    let date: Vec<_> = each(&[SqlType::Date, SqlType::Timestamp], Accessor::Date)
        .chain(each(&TEXTS, Accessor::String))
        .collect();
    readers::<NaiveDate>(b, SqlType::Date, &date, read_date);

    let time: Vec<_> = each(&[SqlType::Time, SqlType::Timestamp], Accessor::Time)
        .chain(each(&TEXTS, Accessor::String))
        .collect();
    readers::<NaiveTime>(b, SqlType::Time, &time, read_time);

    let timestamp: Vec<_> = each(&[SqlType::Timestamp, SqlType::Date], Accessor::Timestamp)
        .chain(each(&TEXTS, Accessor::String))
        .collect();
    readers::<NaiveDateTime>(b, SqlType::Timestamp, &timestamp, read_timestamp);

    let uuid: Vec<_> = each(&[SqlType::Uuid], Accessor::Uuid)
        .chain(each(&TEXTS, Accessor::String))
        .chain(each(&BINARIES, Accessor::Bytes))
        .collect();
    readers::<Uuid>(b, SqlType::Uuid, &uuid, read_uuid);

    // Raw values pass through untouched; NULL stays SqlValue::Null.
    for sql_type in SqlType::ALL {
        b.insert_reader::<SqlValue>(SqlType::Other, sql_type, ColumnReader::new(Accessor::Value, Ok));
    }
}

/// Register writers for `T` that render the value naturally and coerce it
/// into each listed column type, plus the matching `Option<T>` table.
fn writers<T: 'static>(
    b: &mut RegistryBuilder,
    natural: fn(&T) -> SqlValue,
    default: SqlType,
    targets: &[SqlType],
) {
    let primary = ColumnWriter::new(default, move |value: &T| Ok(natural(value)));
    b.insert_writer::<Option<T>>(default, primary.optional());
    b.insert_writer::<T>(default, primary);
    for &target in targets.iter().filter(|t| **t != default) {
        let writer = ColumnWriter::new(target, move |value: &T| coerce(natural(value), target));
        b.insert_writer::<Option<T>>(target, writer.optional());
        b.insert_writer::<T>(target, writer);
    }
}

fn concat(groups: &[&[SqlType]]) -> Vec<SqlType> {
    groups.iter().flat_map(|g| g.iter().copied()).collect()
}

fn install_writers(b: &mut RegistryBuilder) {
    let numeric = concat(&[&INTEGERS, &FLOATS, &DECIMALS, &[SqlType::Boolean], &TEXTS]);
    writers::<i8>(b, |v| SqlValue::TinyInt(*v), SqlType::TinyInt, &numeric);
    writers::<i16>(b, |v| SqlValue::SmallInt(*v), SqlType::SmallInt, &numeric);
    writers::<i32>(b, |v| SqlValue::Int(*v), SqlType::Integer, &numeric);
    writers::<i64>(b, |v| SqlValue::BigInt(*v), SqlType::BigInt, &numeric);

    let fractional = concat(&[&FLOATS, &DECIMALS, &INTEGERS, &TEXTS]);
    writers::<f32>(b, |v| SqlValue::Real(*v), SqlType::Real, &fractional);
    writers::<f64>(b, |v| SqlValue::Double(*v), SqlType::Double, &fractional);
    writers::<Decimal>(b, |v| SqlValue::Decimal(*v), SqlType::Decimal, &fractional);

    writers::<bool>(b, |v| SqlValue::Bool(*v), SqlType::Boolean, &concat(&[&[SqlType::Boolean], &INTEGERS, &TEXTS]));

    let from_text = concat(&[
        &TEXTS,
        &[SqlType::Json, SqlType::Boolean, SqlType::Date, SqlType::Time, SqlType::Timestamp, SqlType::Uuid],
        &INTEGERS,
        &FLOATS,
        &DECIMALS,
        &BINARIES,
    ]);
    writers::<String>(b, |v| SqlValue::Text(v.clone()), SqlType::Varchar, &from_text);
    writers::<&'static str>(b, |v| SqlValue::Text(v.to_string()), SqlType::Varchar, &from_text);

    writers::<Vec<u8>>(b, |v| SqlValue::Bytes(v.clone()), SqlType::Varbinary, &concat(&[&BINARIES, &[SqlType::Uuid]]));

    writers::<NaiveDate>(b, |v| SqlValue::Date(*v), SqlType::Date, &concat(&[&[SqlType::Date, SqlType::Timestamp], &TEXTS]));
    writers::<NaiveTime>(b, |v| SqlValue::Time(*v), SqlType::Time, &concat(&[&[SqlType::Time], &TEXTS]));
    writers::<NaiveDateTime>(
        b,
        |v| SqlValue::Timestamp(*v),
        SqlType::Timestamp,
        &concat(&[&[SqlType::Timestamp, SqlType::Date, SqlType::Time], &TEXTS]),
    );
    writers::<Uuid>(b, |v| SqlValue::Uuid(*v), SqlType::Uuid, &concat(&[&[SqlType::Uuid], &TEXTS, &BINARIES]));

    writers::<SqlValue>(b, SqlValue::clone, SqlType::Other, &SqlType::ALL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConverterRegistry;

    #[test]
    fn test_every_table_accepts_null_typed_columns() {
        let registry = ConverterRegistry::standard();
        assert!(registry.reader::<Option<i32>>(SqlType::Null).is_ok());
        assert!(registry.reader::<Option<Uuid>>(SqlType::Null).is_ok());
        assert!(registry.reader::<String>(SqlType::Null).is_ok());
    }

    #[test]
    fn test_string_reads_every_column_type() {
        let registry = ConverterRegistry::standard();
        for sql_type in SqlType::ALL {
            assert!(registry.reader::<String>(sql_type).is_ok(), "{}", sql_type);
        }
    }

    #[test]
    fn test_raw_values_pass_through() {
        let registry = ConverterRegistry::standard();
        let reader = registry.reader::<SqlValue>(SqlType::Integer).unwrap();
        assert_eq!(reader.convert(SqlValue::Null).unwrap(), SqlValue::Null);
        let writer = registry.writer::<SqlValue>(SqlType::Varchar).unwrap();
        assert_eq!(
            writer.write(&SqlValue::Int(4)).unwrap(),
            SqlValue::Text("4".into())
        );
    }

    #[test]
    fn test_uuid_round_trips_through_text_columns() {
        let registry = ConverterRegistry::standard();
        let id = Uuid::new_v4();
        let bound = registry.writer::<Uuid>(SqlType::Varchar).unwrap().write(&id).unwrap();
        let read = registry.reader::<Uuid>(SqlType::Varchar).unwrap().convert(bound).unwrap();
        assert_eq!(read, id);
    }

    #[test]
    fn test_static_str_binds_as_text() {
        let registry = ConverterRegistry::standard();
        let writer = registry.default_writer::<&'static str>().unwrap();
        assert_eq!(writer.write(&"abc").unwrap(), SqlValue::Text("abc".into()));
        let number = registry.writer::<&'static str>(SqlType::Integer).unwrap();
        assert_eq!(number.write(&"12").unwrap(), SqlValue::Int(12));
    }
}
