//! Two-way type conversion between Rust values and column values.
//!
//! Converters are looked up by target Rust type first and column type second.
//! The bind direction ([`ColumnWriter`]) and the read direction
//! ([`ColumnReader`]) share the same two-level layout. Types without a table
//! fall back to a string factory: a reader that fetches the cell as text and
//! parses it, or a writer that formats the value with `Display`.

mod accessor;
pub mod numbers;
mod reader;
mod tables;
mod writer;

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use log::trace;
use nocturne_sql::{SqlType, SqlValue};
use parking_lot::RwLock;

use crate::error::{Error, Result};

pub use accessor::Accessor;
pub use reader::{ColumnReader, ReadAdapter};
pub use writer::{ColumnWriter, WriteAdapter};

pub(crate) use reader::unexpected;

/// Builds a `T` from the text of a cell.
pub type StringParser<T> = fn(&str) -> std::result::Result<T, String>;
/// Renders a `T` as the text bound for a parameter.
pub type StringFormatter<T> = fn(&T) -> String;

type AnyMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

struct ReaderTable<T> {
    natural: SqlType,
    by_type: HashMap<SqlType, ColumnReader<T>>,
}

struct WriterTable<T> {
    default: ColumnWriter<T>,
    by_type: HashMap<SqlType, ColumnWriter<T>>,
}

/// Parse through `FromStr`, reporting the parse error as text.
pub fn parse_via_from_str<T>(s: &str) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    s.parse::<T>().map_err(|e| e.to_string())
}

pub fn format_via_display<T: Display>(value: &T) -> String {
    value.to_string()
}

/// Collects converters before freezing them into a [`ConverterRegistry`].
///
/// `RegistryBuilder::new()` starts from the predefined tables; later
/// registrations for the same (type, column type) pair replace them.
pub struct RegistryBuilder {
    readers: AnyMap,
    writers: AnyMap,
    parsers: AnyMap,
    formatters: AnyMap,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            readers: HashMap::new(),
            writers: HashMap::new(),
            parsers: HashMap::new(),
            formatters: HashMap::new(),
        };
        tables::install(&mut builder);
        builder
    }

    /// Read `T` from columns of `sql_type` with a custom reader.
    pub fn reader<T: 'static>(mut self, sql_type: SqlType, reader: ColumnReader<T>) -> Self {
        self.insert_reader(sql_type, sql_type, reader);
        self
    }

    /// Bind `T` into columns of `sql_type` with a custom writer. The first
    /// writer registered for a type without a table also becomes its default.
    pub fn writer<T: 'static>(mut self, sql_type: SqlType, writer: ColumnWriter<T>) -> Self {
        self.insert_writer(sql_type, writer);
        self
    }

    /// Replace the writer used when no column type is given.
    pub fn default_writer<T: 'static>(mut self, writer: ColumnWriter<T>) -> Self {
        if let Some(table) = self.writer_table::<T>(&writer) {
            table.default = writer;
        }
        self
    }

    /// Read `T` (from any column type) by parsing the cell text with `FromStr`.
    pub fn register_from_str<T>(self) -> Self
    where
        T: FromStr + 'static,
        T::Err: Display,
    {
        self.register_parser::<T>(parse_via_from_str::<T>)
    }

    pub fn register_parser<T: 'static>(mut self, parser: StringParser<T>) -> Self {
        self.parsers.insert(TypeId::of::<T>(), Box::new(parser));
        self
    }

    /// Bind `T` as text produced by `Display`.
    pub fn register_display<T: Display + 'static>(self) -> Self {
        self.register_formatter::<T>(format_via_display::<T>)
    }

    pub fn register_formatter<T: 'static>(mut self, formatter: StringFormatter<T>) -> Self {
        self.formatters.insert(TypeId::of::<T>(), Box::new(formatter));
        self
    }

    pub fn build(self) -> ConverterRegistry {
        ConverterRegistry {
            readers: self.readers,
            writers: self.writers,
            parsers: self.parsers,
            formatters: self.formatters,
            synthesized_readers: RwLock::new(HashMap::new()),
            synthesized_writers: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn insert_reader<T: 'static>(
        &mut self,
        natural: SqlType,
        sql_type: SqlType,
        reader: ColumnReader<T>,
    ) {
        let table = self
            .readers
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                Box::new(ReaderTable::<T> {
                    natural,
                    by_type: HashMap::new(),
                })
            });
        if let Some(table) = table.downcast_mut::<ReaderTable<T>>() {
            table.by_type.insert(sql_type, reader);
        }
    }

    pub(crate) fn insert_writer<T: 'static>(&mut self, sql_type: SqlType, writer: ColumnWriter<T>) {
        if let Some(table) = self.writer_table::<T>(&writer) {
            table.by_type.insert(sql_type, writer);
        }
    }

    /// The table for `T`, created with `seed` as its default when absent.
    fn writer_table<T: 'static>(&mut self, seed: &ColumnWriter<T>) -> Option<&mut WriterTable<T>> {
        self.writers
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                Box::new(WriterTable::<T> {
                    default: seed.clone(),
                    by_type: HashMap::new(),
                })
            })
            .downcast_mut::<WriterTable<T>>()
    }
}

/// Frozen converter tables plus the memo of synthesized string converters.
///
/// Lookups are lock-free except for the synthesis memo, which is filled lazily
/// under a read-then-write lock. Two threads racing on the same type may both
/// synthesize; the results are equivalent and the last one is kept.
pub struct ConverterRegistry {
    readers: AnyMap,
    writers: AnyMap,
    parsers: AnyMap,
    formatters: AnyMap,
    synthesized_readers: RwLock<AnyMap>,
    synthesized_writers: RwLock<AnyMap>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ConverterRegistry {
    /// The predefined tables and nothing else.
    pub fn standard() -> Self {
        RegistryBuilder::new().build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    fn reader_table<T: 'static>(&self) -> Option<&ReaderTable<T>> {
        self.readers
            .get(&TypeId::of::<T>())
            .and_then(|t| t.downcast_ref::<ReaderTable<T>>())
    }

    fn writer_table<T: 'static>(&self) -> Option<&WriterTable<T>> {
        self.writers
            .get(&TypeId::of::<T>())
            .and_then(|t| t.downcast_ref::<WriterTable<T>>())
    }

    /// Whether `T` has a predefined or registered table in either direction.
    pub fn has_table<T: 'static>(&self) -> bool {
        self.readers.contains_key(&TypeId::of::<T>())
            || self.writers.contains_key(&TypeId::of::<T>())
    }

    /// Reader for `T` from a column of `sql_type`.
    pub fn reader<T: 'static>(&self, sql_type: SqlType) -> Result<ColumnReader<T>> {
        self.reader_with(sql_type, None)
    }

    /// Like [`reader`](Self::reader), with a string factory to fall back on
    /// when `T` has no table. A factory registered on the builder takes
    /// precedence over `parser`.
    pub fn reader_with<T: 'static>(
        &self,
        sql_type: SqlType,
        parser: Option<StringParser<T>>,
    ) -> Result<ColumnReader<T>> {
        match self.reader_table::<T>() {
            Some(table) => table.by_type.get(&sql_type).cloned().ok_or(
                Error::UnsupportedConversion {
                    sql_type,
                    target: type_name::<T>(),
                },
            ),
            None => self.synthesized_reader(parser),
        }
    }

    /// Reader for `Option<T>`: the `Option<T>` table if there is one,
    /// otherwise the reader for `T` with NULL mapped to `None`.
    pub fn optional_reader_with<T: 'static>(
        &self,
        sql_type: SqlType,
        parser: Option<StringParser<T>>,
    ) -> Result<ColumnReader<Option<T>>> {
        if self.reader_table::<Option<T>>().is_some() {
            return self.reader::<Option<T>>(sql_type);
        }
        self.reader_with::<T>(sql_type, parser)
            .map(|reader| reader.optional())
    }

    /// Reader for `T` from its natural column type.
    pub fn default_reader<T: 'static>(&self) -> Result<ColumnReader<T>> {
        match self.reader_table::<T>() {
            Some(table) => self.reader::<T>(table.natural),
            None => self.synthesized_reader(None),
        }
    }

    /// Writer binding `T` into a column of `sql_type`.
    pub fn writer<T: 'static>(&self, sql_type: SqlType) -> Result<ColumnWriter<T>> {
        self.writer_with(sql_type, None)
    }

    pub fn writer_with<T: 'static>(
        &self,
        sql_type: SqlType,
        formatter: Option<StringFormatter<T>>,
    ) -> Result<ColumnWriter<T>> {
        match self.writer_table::<T>() {
            Some(table) => table.by_type.get(&sql_type).cloned().ok_or(
                Error::UnsupportedConversion {
                    sql_type,
                    target: type_name::<T>(),
                },
            ),
            None => {
                let text = self.synthesized_writer(formatter)?;
                if sql_type.is_textual() {
                    return Ok(text);
                }
                Ok(ColumnWriter::new(sql_type, move |value: &T| {
                    numbers::coerce(text.write(value)?, sql_type)
                }))
            }
        }
    }

    /// Writer used when the column type is not known.
    pub fn default_writer<T: 'static>(&self) -> Result<ColumnWriter<T>> {
        self.default_writer_with(None)
    }

    pub fn default_writer_with<T: 'static>(
        &self,
        formatter: Option<StringFormatter<T>>,
    ) -> Result<ColumnWriter<T>> {
        match self.writer_table::<T>() {
            Some(table) => Ok(table.default.clone()),
            None => self.synthesized_writer(formatter),
        }
    }

    pub fn optional_default_writer_with<T: 'static>(
        &self,
        formatter: Option<StringFormatter<T>>,
    ) -> Result<ColumnWriter<Option<T>>> {
        if self.writer_table::<Option<T>>().is_some() {
            return self.default_writer::<Option<T>>();
        }
        self.default_writer_with::<T>(formatter)
            .map(|writer| writer.optional())
    }

    pub fn optional_writer_with<T: 'static>(
        &self,
        sql_type: SqlType,
        formatter: Option<StringFormatter<T>>,
    ) -> Result<ColumnWriter<Option<T>>> {
        if self.writer_table::<Option<T>>().is_some() {
            return self.writer::<Option<T>>(sql_type);
        }
        self.writer_with::<T>(sql_type, formatter)
            .map(|writer| writer.optional())
    }

    fn synthesized_reader<T: 'static>(
        &self,
        parser: Option<StringParser<T>>,
    ) -> Result<ColumnReader<T>> {
        let key = TypeId::of::<T>();
        if let Some(reader) = self
            .synthesized_readers
            .read()
            .get(&key)
            .and_then(|r| r.downcast_ref::<ColumnReader<T>>())
        {
            return Ok(reader.clone());
        }

        let parser = self
            .parsers
            .get(&key)
            .and_then(|p| p.downcast_ref::<StringParser<T>>())
            .copied()
            .or(parser)
            .ok_or(Error::UnsupportedType(type_name::<T>()))?;

        let reader = ColumnReader::new(Accessor::String, move |value| match value {
            SqlValue::Text(s) => parser(&s),
            other => unexpected(other),
        });
        trace!("synthesized string reader for {}", type_name::<T>());
        self.synthesized_readers
            .write()
            .insert(key, Box::new(reader.clone()));
        Ok(reader)
    }

    fn synthesized_writer<T: 'static>(
        &self,
        formatter: Option<StringFormatter<T>>,
    ) -> Result<ColumnWriter<T>> {
        let key = TypeId::of::<T>();
        if let Some(writer) = self
            .synthesized_writers
            .read()
            .get(&key)
            .and_then(|w| w.downcast_ref::<ColumnWriter<T>>())
        {
            return Ok(writer.clone());
        }

        let formatter = self
            .formatters
            .get(&key)
            .and_then(|f| f.downcast_ref::<StringFormatter<T>>())
            .copied()
            .or(formatter)
            .ok_or(Error::UnsupportedType(type_name::<T>()))?;

        let writer = ColumnWriter::new(SqlType::Varchar, move |value: &T| {
            Ok(SqlValue::Text(formatter(value)))
        });
        trace!("synthesized string writer for {}", type_name::<T>());
        self.synthesized_writers
            .write()
            .insert(key, Box::new(writer.clone()));
        Ok(writer)
    }

    /// Number of memoized string converters, readers and writers together.
    pub fn synthesized_count(&self) -> usize {
        self.synthesized_readers.read().len() + self.synthesized_writers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use nocturne_sql::{Column, Row};
    use rust_decimal::Decimal;

    use super::*;

    fn row(sql_type: SqlType, value: SqlValue) -> Row {
        let columns: Arc<[Column]> = vec![Column::new("C", sql_type)].into();
        Row::new(columns, vec![value])
    }

    fn read<T: 'static>(registry: &ConverterRegistry, sql_type: SqlType, value: SqlValue) -> std::result::Result<T, String> {
        registry
            .reader::<T>(sql_type)
            .map_err(|e| e.to_string())?
            .read(&row(sql_type, value), 0)
    }

    #[derive(Debug, PartialEq)]
    struct Isbn(String);

    impl FromStr for Isbn {
        type Err = String;

        fn from_str(s: &str) -> std::result::Result<Self, String> {
            if s.len() == 13 {
                Ok(Isbn(s.to_string()))
            } else {
                Err(format!("bad isbn {}", s))
            }
        }
    }

    impl Display for Isbn {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[test]
    fn test_integer_narrowing_on_read() {
        let registry = ConverterRegistry::standard();
        assert_eq!(read::<i32>(&registry, SqlType::BigInt, SqlValue::BigInt(7)).unwrap(), 7);
        assert!(read::<i8>(&registry, SqlType::Integer, SqlValue::Int(300)).is_err());
        assert_eq!(read::<i16>(&registry, SqlType::Double, SqlValue::Double(12.0)).unwrap(), 12);
        assert!(read::<i16>(&registry, SqlType::Double, SqlValue::Double(12.5)).is_err());
        assert_eq!(read::<i64>(&registry, SqlType::Varchar, SqlValue::Text("99".into())).unwrap(), 99);
    }

    #[test]
    fn test_null_handling() {
        let registry = ConverterRegistry::standard();
        assert_eq!(
            read::<Option<i32>>(&registry, SqlType::Integer, SqlValue::Null).unwrap(),
            None
        );
        assert_eq!(
            read::<Option<String>>(&registry, SqlType::Varchar, SqlValue::Text("a".into())).unwrap(),
            Some("a".to_string())
        );
        let err = read::<i32>(&registry, SqlType::Integer, SqlValue::Null).unwrap_err();
        assert!(err.contains("NULL"), "{}", err);
    }

    #[test]
    fn test_missing_conversion_and_type() {
        let registry = ConverterRegistry::standard();
        let err = registry.reader::<NaiveDate>(SqlType::Boolean).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedConversion {
                sql_type: SqlType::Boolean,
                ..
            }
        ));
        let message = err.to_string();
        assert!(message.starts_with("cannot convert BOOLEAN to "), "{}", message);
        assert!(message.ends_with("NaiveDate"), "{}", message);
        assert!(matches!(
            registry.reader::<Isbn>(SqlType::Varchar),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_default_reader_uses_natural_type() {
        let registry = ConverterRegistry::standard();
        assert_eq!(registry.default_reader::<i64>().unwrap().accessor(), Accessor::I64);
        assert_eq!(
            registry.default_reader::<Decimal>().unwrap().accessor(),
            Accessor::Decimal
        );
    }

    #[test]
    fn test_string_factory_synthesis_is_memoized() {
        let registry = ConverterRegistry::builder()
            .register_from_str::<Isbn>()
            .register_display::<Isbn>()
            .build();
        assert_eq!(
            read::<Isbn>(&registry, SqlType::Char, SqlValue::Text("9780306406157".into())).unwrap(),
            Isbn("9780306406157".into())
        );
        assert!(read::<Isbn>(&registry, SqlType::Char, SqlValue::Text("123".into())).is_err());
        read::<Isbn>(&registry, SqlType::Varchar, SqlValue::Text("9780306406157".into())).unwrap();
        assert_eq!(registry.synthesized_count(), 1);

        let writer = registry.default_writer::<Isbn>().unwrap();
        assert_eq!(writer.target(), SqlType::Varchar);
        assert_eq!(
            writer.write(&Isbn("9780306406157".into())).unwrap(),
            SqlValue::Text("9780306406157".into())
        );
    }

    #[test]
    fn test_probed_parser_used_when_nothing_registered() {
        let registry = ConverterRegistry::standard();
        let reader = registry
            .reader_with::<Isbn>(SqlType::Text, Some(parse_via_from_str::<Isbn>))
            .unwrap();
        assert_eq!(reader.accessor(), Accessor::String);
        let optional = registry
            .optional_reader_with::<Isbn>(SqlType::Text, Some(parse_via_from_str::<Isbn>))
            .unwrap();
        assert_eq!(optional.read(&row(SqlType::Text, SqlValue::Null), 0).unwrap(), None);
    }

    #[test]
    fn test_writers_coerce_to_column_type() {
        let registry = ConverterRegistry::standard();
        assert_eq!(
            registry.default_writer::<i32>().unwrap().write(&5).unwrap(),
            SqlValue::Int(5)
        );
        assert_eq!(
            registry.writer::<i64>(SqlType::SmallInt).unwrap().write(&5).unwrap(),
            SqlValue::SmallInt(5)
        );
        assert!(registry.writer::<i64>(SqlType::SmallInt).unwrap().write(&1_000_000).is_err());
        assert_eq!(
            registry.writer::<bool>(SqlType::Integer).unwrap().write(&true).unwrap(),
            SqlValue::Int(1)
        );
        assert_eq!(
            registry.default_writer::<Option<String>>().unwrap().write(&None).unwrap(),
            SqlValue::Null
        );
        assert!(matches!(
            registry.writer::<Vec<u8>>(SqlType::Integer),
            Err(Error::UnsupportedConversion { .. })
        ));
    }

    #[test]
    fn test_boolean_text_is_the_same_both_ways() {
        let registry = ConverterRegistry::standard();
        let text = read::<String>(&registry, SqlType::Boolean, SqlValue::Bool(true)).unwrap();
        let written = registry
            .writer::<bool>(SqlType::Varchar)
            .unwrap()
            .write(&true)
            .unwrap();
        assert_eq!(text, "true");
        assert_eq!(written, SqlValue::Text(text));
    }

    #[test]
    fn test_custom_reader_overrides_predefined() {
        let registry = ConverterRegistry::builder()
            .reader::<bool>(
                SqlType::Char,
                ColumnReader::new(Accessor::String, |value| match value {
                    SqlValue::Text(s) => Ok(s == "J"),
                    other => unexpected(other),
                }),
            )
            .build();
        assert!(read::<bool>(&registry, SqlType::Char, SqlValue::Text("J".into())).unwrap());
        assert!(!read::<bool>(&registry, SqlType::Char, SqlValue::Text("Y".into())).unwrap());
        assert!(read::<bool>(&registry, SqlType::Boolean, SqlValue::Bool(true)).unwrap());
    }
}
