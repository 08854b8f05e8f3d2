//! Shape descriptors: the compile-time description of a materialization target.
//!
//! A shape is a struct whose fields are filled from result-set columns. It is
//! either *mutable* (created with `Default`, then each mapped field is assigned)
//! or *immutable* (all arguments are collected first and handed to a single
//! constructor). `#[derive(Shape)]` generates the descriptor; writing one by
//! hand looks like this:
//!
//! ```
//! use nocturne::shape::{Field, ShapeDescriptor};
//! use nocturne::Shape;
//!
//! #[derive(Default)]
//! struct Person {
//!     id: i32,
//!     name: String,
//! }
//!
//! impl Shape for Person {
//!     fn descriptor() -> &'static ShapeDescriptor<Self> {
//!         static DESCRIPTOR: std::sync::OnceLock<ShapeDescriptor<Person>> =
//!             std::sync::OnceLock::new();
//!         DESCRIPTOR.get_or_init(|| {
//!             ShapeDescriptor::mutable(
//!                 "Person",
//!                 Person::default,
//!                 vec![
//!                     Field::new("id", |p: &Person| &p.id)
//!                         .setter(|p: &mut Person, v| p.id = v)
//!                         .build(),
//!                     Field::new("name", |p: &Person| &p.name)
//!                         .setter(|p: &mut Person, v| p.name = v)
//!                         .column("FULL_NAME")
//!                         .build(),
//!                 ],
//!             )
//!         })
//!     }
//! }
//! ```

use std::any::{Any, type_name};

use nocturne_sql::{Row, SqlType, SqlValue};

use crate::convert::{ColumnReader, ColumnWriter, ConverterRegistry, StringFormatter, StringParser};
use crate::error::{Error, Result};

/// A materialization target. Implement with `#[derive(Shape)]`.
pub trait Shape: Sized + Send + 'static {
    fn descriptor() -> &'static ShapeDescriptor<Self>;
}

/// How instances of a shape are created.
pub enum Construction<S> {
    /// Start from a default instance and assign fields one by one.
    Mutable(fn() -> S),
    /// Collect one value per field (in declared order), then construct.
    Immutable(fn(&mut ShapeArgs) -> Result<S>),
}

pub struct ShapeDescriptor<S> {
    name: &'static str,
    fields: Vec<FieldDescriptor<S>>,
    construction: Construction<S>,
}

impl<S: 'static> ShapeDescriptor<S> {
    pub fn mutable(name: &'static str, ctor: fn() -> S, fields: Vec<FieldDescriptor<S>>) -> Self {
        Self {
            name,
            fields,
            construction: Construction::Mutable(ctor),
        }
    }

    pub fn immutable(
        name: &'static str,
        ctor: fn(&mut ShapeArgs) -> Result<S>,
        fields: Vec<FieldDescriptor<S>>,
    ) -> Self {
        Self {
            name,
            fields,
            construction: Construction::Immutable(ctor),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor<S>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor<S>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn construction(&self) -> &Construction<S> {
        &self.construction
    }

    pub fn is_immutable(&self) -> bool {
        matches!(self.construction, Construction::Immutable(_))
    }
}

/// One field of a shape, with its type erased.
pub struct FieldDescriptor<S> {
    name: &'static str,
    column: Option<&'static str>,
    sql_type: Option<SqlType>,
    access: Box<dyn FieldAccess<S>>,
}

impl<S> FieldDescriptor<S> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Explicit column label, if the field overrides name mapping.
    pub fn column(&self) -> Option<&'static str> {
        self.column
    }

    /// Column type the field is bound as, when it overrides the default writer.
    pub fn sql_type(&self) -> Option<SqlType> {
        self.sql_type
    }

    pub fn type_name(&self) -> &'static str {
        self.access.type_name()
    }

    pub fn is_writable(&self) -> bool {
        self.access.is_writable()
    }

    pub(crate) fn channel(
        &self,
        registry: &ConverterRegistry,
        sql_type: SqlType,
        column: usize,
        subject: String,
    ) -> Result<Box<dyn FieldChannel<S>>> {
        self.access.channel(registry, sql_type, column, subject)
    }

    /// Value of this field of `shape`, converted for binding.
    pub fn bind_value(&self, registry: &ConverterRegistry, shape: &S) -> Result<SqlValue> {
        self.access.bind_value(registry, self.sql_type, shape)
    }
}

type ReaderResolver<F> =
    Box<dyn Fn(&ConverterRegistry, SqlType) -> Result<ColumnReader<F>> + Send + Sync>;
type WriterResolver<F> =
    Box<dyn Fn(&ConverterRegistry, Option<SqlType>) -> Result<ColumnWriter<F>> + Send + Sync>;

/// Typed builder for a [`FieldDescriptor`].
pub struct Field<S, F> {
    name: &'static str,
    column: Option<&'static str>,
    sql_type: Option<SqlType>,
    getter: fn(&S) -> &F,
    setter: Option<fn(&mut S, F)>,
    reader: ReaderResolver<F>,
    writer: WriterResolver<F>,
}

impl<S: 'static, F: Send + 'static> Field<S, F> {
    pub fn new(name: &'static str, getter: fn(&S) -> &F) -> Self {
        Self {
            name,
            column: None,
            sql_type: None,
            getter,
            setter: None,
            reader: Box::new(|registry: &ConverterRegistry, sql_type: SqlType| {
                registry.reader::<F>(sql_type)
            }),
            writer: Box::new(|registry: &ConverterRegistry, sql_type: Option<SqlType>| {
                match sql_type {
                    Some(sql_type) => registry.writer::<F>(sql_type),
                    None => registry.default_writer::<F>(),
                }
            }),
        }
    }

    pub fn setter(mut self, setter: fn(&mut S, F)) -> Self {
        self.setter = Some(setter);
        self
    }

    pub fn column(mut self, label: &'static str) -> Self {
        self.column = Some(label);
        self
    }

    /// Bind the field as `sql_type` instead of through the default writer.
    pub fn sql_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// String factory used when `F` has no conversion table.
    pub fn parse_with(mut self, parser: Option<StringParser<F>>) -> Self {
        self.reader = Box::new(move |registry: &ConverterRegistry, sql_type: SqlType| {
            registry.reader_with(sql_type, parser)
        });
        self
    }

    pub fn format_with(mut self, formatter: Option<StringFormatter<F>>) -> Self {
        self.writer = Box::new(move |registry: &ConverterRegistry, sql_type: Option<SqlType>| {
            match sql_type {
                Some(sql_type) => registry.writer_with(sql_type, formatter),
                None => registry.default_writer_with(formatter),
            }
        });
        self
    }

    pub fn build(self) -> FieldDescriptor<S> {
        FieldDescriptor {
            name: self.name,
            column: self.column,
            sql_type: self.sql_type,
            access: Box::new(TypedAccess {
                field: self.name,
                getter: self.getter,
                setter: self.setter,
                reader: self.reader,
                writer: self.writer,
            }),
        }
    }
}

impl<S: 'static, I: Send + 'static> Field<S, Option<I>> {
    /// String factory for the inner type of an optional field.
    pub fn parse_inner_with(mut self, parser: Option<StringParser<I>>) -> Self {
        self.reader = Box::new(move |registry: &ConverterRegistry, sql_type: SqlType| {
            registry.optional_reader_with::<I>(sql_type, parser)
        });
        self
    }

    pub fn format_inner_with(mut self, formatter: Option<StringFormatter<I>>) -> Self {
        self.writer = Box::new(move |registry: &ConverterRegistry, sql_type: Option<SqlType>| {
            match sql_type {
                Some(sql_type) => registry.optional_writer_with::<I>(sql_type, formatter),
                None => registry.optional_default_writer_with::<I>(formatter),
            }
        });
        self
    }
}

trait FieldAccess<S>: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn is_writable(&self) -> bool;

    fn channel(
        &self,
        registry: &ConverterRegistry,
        sql_type: SqlType,
        column: usize,
        subject: String,
    ) -> Result<Box<dyn FieldChannel<S>>>;

    fn bind_value(
        &self,
        registry: &ConverterRegistry,
        sql_type: Option<SqlType>,
        shape: &S,
    ) -> Result<SqlValue>;
}

struct TypedAccess<S, F> {
    field: &'static str,
    getter: fn(&S) -> &F,
    setter: Option<fn(&mut S, F)>,
    reader: ReaderResolver<F>,
    writer: WriterResolver<F>,
}

impl<S: 'static, F: Send + 'static> FieldAccess<S> for TypedAccess<S, F> {
    fn type_name(&self) -> &'static str {
        type_name::<F>()
    }

    fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    fn channel(
        &self,
        registry: &ConverterRegistry,
        sql_type: SqlType,
        column: usize,
        subject: String,
    ) -> Result<Box<dyn FieldChannel<S>>> {
        let reader = (self.reader)(registry, sql_type)?;
        Ok(Box::new(TypedChannel {
            column,
            subject,
            reader,
            setter: self.setter,
        }))
    }

    fn bind_value(
        &self,
        registry: &ConverterRegistry,
        sql_type: Option<SqlType>,
        shape: &S,
    ) -> Result<SqlValue> {
        let writer = (self.writer)(registry, sql_type)?;
        writer
            .write((self.getter)(shape))
            .map_err(|message| Error::conversion(format!("field {}", self.field), message))
    }
}

/// Moves one column of a row into one field.
pub(crate) trait FieldChannel<S>: Send + Sync {
    /// Read the column and assign it to the field of `target`.
    fn apply(&self, row: &Row, target: &mut S) -> Result<()>;

    /// Read the column as a constructor argument.
    fn read_arg(&self, row: &Row) -> Result<Box<dyn Any + Send>>;
}

struct TypedChannel<S, F> {
    column: usize,
    subject: String,
    reader: ColumnReader<F>,
    setter: Option<fn(&mut S, F)>,
}

impl<S, F: Send + 'static> TypedChannel<S, F> {
    fn read(&self, row: &Row) -> Result<F> {
        self.reader
            .read(row, self.column)
            .map_err(|message| Error::conversion(self.subject.clone(), message))
    }
}

impl<S: 'static, F: Send + 'static> FieldChannel<S> for TypedChannel<S, F> {
    fn apply(&self, row: &Row, target: &mut S) -> Result<()> {
        let value = self.read(row)?;
        match self.setter {
            Some(set) => {
                set(target, value);
                Ok(())
            }
            None => Err(Error::conversion(
                self.subject.clone(),
                "field has no setter",
            )),
        }
    }

    fn read_arg(&self, row: &Row) -> Result<Box<dyn Any + Send>> {
        Ok(Box::new(self.read(row)?))
    }
}

/// Constructor arguments of an immutable shape, one slot per field in
/// declared order.
pub struct ShapeArgs {
    shape: &'static str,
    values: Vec<Option<Box<dyn Any + Send>>>,
}

impl ShapeArgs {
    pub(crate) fn new(shape: &'static str, values: Vec<Option<Box<dyn Any + Send>>>) -> Self {
        Self { shape, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Move argument `index` out as a `T`.
    pub fn take<T: 'static>(&mut self, index: usize) -> Result<T> {
        let value = self
            .values
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| {
                Error::shape_mismatch(self.shape, format!("no value for argument {}", index))
            })?;
        value.downcast::<T>().map(|v| *v).map_err(|_| {
            Error::shape_mismatch(
                self.shape,
                format!("argument {} is not a {}", index, type_name::<T>()),
            )
        })
    }
}

/// Autoref-based probing for string factories, used by `#[derive(Shape)]`.
///
/// `(&&&Probe::<T>::new()).parser()` resolves to `FromStr` when `T`
/// implements it, else to `From<String>`, else to `None`.
/// `(&&Probe::<T>::new()).formatter()` resolves to `Display` or `None`.
pub mod probe {
    use std::fmt::Display;
    use std::marker::PhantomData;
    use std::str::FromStr;

    use crate::convert::{StringFormatter, StringParser, format_via_display, parse_via_from_str};

    pub struct Probe<T>(PhantomData<T>);

    impl<T> Probe<T> {
        pub const fn new() -> Self {
            Probe(PhantomData)
        }
    }

    impl<T> Default for Probe<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    pub trait ViaFromStr<T> {
        fn parser(&self) -> Option<StringParser<T>>;
    }

    impl<T> ViaFromStr<T> for &&Probe<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        fn parser(&self) -> Option<StringParser<T>> {
            Some(parse_via_from_str::<T>)
        }
    }

    pub trait ViaFromString<T> {
        fn parser(&self) -> Option<StringParser<T>>;
    }

    fn parse_via_from_string<T: From<String>>(s: &str) -> Result<T, String> {
        Ok(T::from(s.to_string()))
    }

    impl<T: From<String>> ViaFromString<T> for &Probe<T> {
        fn parser(&self) -> Option<StringParser<T>> {
            Some(parse_via_from_string::<T>)
        }
    }

    pub trait NoParser<T> {
        fn parser(&self) -> Option<StringParser<T>>;
    }

    impl<T> NoParser<T> for Probe<T> {
        fn parser(&self) -> Option<StringParser<T>> {
            None
        }
    }

    pub trait ViaDisplay<T> {
        fn formatter(&self) -> Option<StringFormatter<T>>;
    }

    impl<T: Display> ViaDisplay<T> for &Probe<T> {
        fn formatter(&self) -> Option<StringFormatter<T>> {
            Some(format_via_display::<T>)
        }
    }

    pub trait NoFormatter<T> {
        fn formatter(&self) -> Option<StringFormatter<T>>;
    }

    impl<T> NoFormatter<T> for Probe<T> {
        fn formatter(&self) -> Option<StringFormatter<T>> {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::probe::{NoFormatter, NoParser, Probe, ViaDisplay, ViaFromStr, ViaFromString};
    use super::*;

    struct Opaque;

    struct Wrapped(String);

    impl From<String> for Wrapped {
        fn from(s: String) -> Self {
            Wrapped(s)
        }
    }

    #[test]
    fn test_probe_prefers_from_str() {
        let parser = (&&&Probe::<u16>::new()).parser().unwrap();
        assert_eq!(parser("17").unwrap(), 17);
        assert!(parser("x").is_err());
    }

    #[test]
    fn test_probe_falls_back_to_from_string() {
        let parser = (&&&Probe::<Wrapped>::new()).parser().unwrap();
        assert_eq!(parser("abc").unwrap().0, "abc");
    }

    #[test]
    fn test_probe_finds_nothing() {
        assert!((&&&Probe::<Opaque>::new()).parser().is_none());
        assert!((&&Probe::<Opaque>::new()).formatter().is_none());
        let format = (&&Probe::<u16>::new()).formatter().unwrap();
        assert_eq!(format(&5), "5");
    }

    #[test]
    fn test_shape_args_take() {
        let mut args = ShapeArgs::new("Pair", vec![Some(Box::new(1i32)), Some(Box::new("x".to_string()))]);
        assert_eq!(args.len(), 2);
        assert_eq!(args.take::<i32>(0).unwrap(), 1);
        assert!(matches!(args.take::<i32>(0), Err(Error::ShapeMismatch { .. })));
        assert!(matches!(args.take::<i32>(1), Err(Error::ShapeMismatch { .. })));
    }

    struct Reading {
        value: i64,
        label: Option<u16>,
    }

    #[test]
    fn test_field_sql_type_replaces_default_writer() {
        let registry = ConverterRegistry::standard();
        let reading = Reading {
            value: 12,
            label: Some(3),
        };
        let plain = Field::new("value", |r: &Reading| &r.value).build();
        let typed = Field::new("value", |r: &Reading| &r.value)
            .sql_type(SqlType::Varchar)
            .build();
        let label = Field::new("label", |r: &Reading| &r.label)
            .sql_type(SqlType::SmallInt)
            .format_inner_with((&&Probe::<u16>::new()).formatter())
            .build();

        assert_eq!(plain.sql_type(), None);
        assert_eq!(plain.bind_value(&registry, &reading).unwrap(), SqlValue::BigInt(12));
        assert_eq!(typed.sql_type(), Some(SqlType::Varchar));
        assert_eq!(
            typed.bind_value(&registry, &reading).unwrap(),
            SqlValue::Text("12".into())
        );
        assert_eq!(label.bind_value(&registry, &reading).unwrap(), SqlValue::SmallInt(3));
    }
}
