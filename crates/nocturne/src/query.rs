//! Named-parameter statements bound against an executor.

use std::fmt::{self, Display};
use std::sync::Arc;

use indexmap::IndexMap;
use nocturne_sql::{Column, Cursor, Executor, SqlType, SqlValue};

use crate::convert::{ColumnReader, format_via_display};
use crate::error::{Error, Result};
use crate::extract::ShapeExtractor;
use crate::session::Session;
use crate::shape::Shape;
use crate::sql::ParsedSql;

/// A statement with named parameters, bound value by value and then run
/// against `executor`. Execution does not consume the query, so it can be
/// rebound and run again.
///
/// ```
/// use nocturne::Session;
/// use nocturne::nocturne_sql::memory::MemoryExecutor;
///
/// let session = Session::default();
/// let mut db = MemoryExecutor::new();
/// let mut query = session
///     .query(&mut db, "UPDATE T SET A = :a WHERE ID = :id OR PARENT = :id")
///     .unwrap();
/// query.bind("a", &"x").unwrap().bind("id", &7_i64).unwrap();
/// query.execute_update().unwrap();
///
/// assert_eq!(db.statements()[0].sql, "UPDATE T SET A = ? WHERE ID = ? OR PARENT = ?");
/// assert_eq!(db.statements()[0].params.len(), 3);
/// ```
pub struct Query<'s, E> {
    session: &'s Session,
    executor: E,
    sql: Arc<ParsedSql>,
    values: Vec<Option<SqlValue>>,
}

impl<E: fmt::Debug> fmt::Debug for Query<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("executor", &self.executor)
            .field("sql", &self.sql)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

impl<'s, E: Executor> Query<'s, E> {
    pub(crate) fn new(session: &'s Session, executor: E, sql: Arc<ParsedSql>) -> Self {
        let values = vec![None; sql.parameters().len()];
        Self {
            session,
            executor,
            sql,
            values,
        }
    }

    pub fn sql(&self) -> &ParsedSql {
        &self.sql
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Bind `value` to every occurrence of `name`, converted by the
    /// registry's default writer for `T`. A later bind of the same name wins.
    pub fn bind<T: 'static>(&mut self, name: &str, value: &T) -> Result<&mut Self> {
        let slot = self.slot(name)?;
        let writer = self.session.registry().default_writer::<T>()?;
        let value = writer
            .write(value)
            .map_err(|message| Error::conversion(format!("parameter {}", name), message))?;
        self.values[slot] = Some(value);
        Ok(self)
    }

    /// Bind `value` converted for a column of `sql_type`.
    pub fn bind_as<T: 'static>(
        &mut self,
        name: &str,
        value: &T,
        sql_type: SqlType,
    ) -> Result<&mut Self> {
        let slot = self.slot(name)?;
        let writer = self.session.registry().writer::<T>(sql_type)?;
        let value = writer
            .write(value)
            .map_err(|message| Error::conversion(format!("parameter {}", name), message))?;
        self.values[slot] = Some(value);
        Ok(self)
    }

    /// Bind the `Display` rendering of a type the registry has no table for.
    pub fn bind_display<T: Display + 'static>(&mut self, name: &str, value: &T) -> Result<&mut Self> {
        let slot = self.slot(name)?;
        let writer = self
            .session
            .registry()
            .default_writer_with::<T>(Some(format_via_display::<T>))?;
        let value = writer
            .write(value)
            .map_err(|message| Error::conversion(format!("parameter {}", name), message))?;
        self.values[slot] = Some(value);
        Ok(self)
    }

    pub fn bind_value(&mut self, name: &str, value: SqlValue) -> Result<&mut Self> {
        let slot = self.slot(name)?;
        self.values[slot] = Some(value);
        Ok(self)
    }

    pub fn bind_null(&mut self, name: &str) -> Result<&mut Self> {
        self.bind_value(name, SqlValue::Null)
    }

    /// Bind every field of `shape` whose name is a parameter of this statement.
    /// Other fields are ignored.
    pub fn bind_shape<S: Shape>(&mut self, shape: &S) -> Result<&mut Self> {
        for field in S::descriptor().fields() {
            if let Some(slot) = self.sql.parameters().index_of(field.name()) {
                self.values[slot] = Some(field.bind_value(self.session.registry(), shape)?);
            }
        }
        Ok(self)
    }

    /// Bind every entry whose key is a parameter of this statement. Other keys
    /// are ignored.
    pub fn bind_map<K, I>(&mut self, values: I) -> Result<&mut Self>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, SqlValue)>,
    {
        for (name, value) in values {
            if let Some(slot) = self.sql.parameters().index_of(name.as_ref()) {
                self.values[slot] = Some(value);
            }
        }
        Ok(self)
    }

    /// Names that have no value yet, in order of first occurrence.
    pub fn unbound(&self) -> Vec<&str> {
        self.sql
            .parameters()
            .names()
            .zip(&self.values)
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect()
    }

    /// Bound values laid out by placeholder position.
    pub fn positional_params(&self) -> Result<Vec<SqlValue>> {
        let missing = self.unbound();
        if !missing.is_empty() {
            return Err(Error::IncompleteBinding {
                missing: missing.into_iter().map(str::to_string).collect(),
                sql: self.sql.original().to_string(),
            });
        }

        let parameters = self.sql.parameters();
        let mut params = vec![SqlValue::Null; parameters.placeholder_count()];
        for (parameter, value) in parameters.iter().zip(&self.values) {
            if let Some(value) = value {
                for &position in parameter.positions() {
                    params[position - 1] = value.clone();
                }
            }
        }
        Ok(params)
    }

    /// Run the statement and hand back the open cursor.
    pub fn execute(&mut self) -> Result<E::Cursor> {
        let params = self.positional_params()?;
        log::debug!(
            "Executing Query: {} | Params: {}",
            self.sql.normalized(),
            params.len()
        );
        self.executor
            .query(self.sql.normalized(), &params)
            .map_err(|e| Error::driver(self.sql.normalized(), e))
    }

    /// Run a statement that returns an update count.
    pub fn execute_update(&mut self) -> Result<u64> {
        let params = self.positional_params()?;
        log::debug!(
            "Executing Update: {} | Params: {}",
            self.sql.normalized(),
            params.len()
        );
        self.executor
            .execute(self.sql.normalized(), &params)
            .map_err(|e| Error::driver(self.sql.normalized(), e))
    }

    /// Run the statement and extract rows as `S` lazily. The caller owns the
    /// cursor inside the extractor.
    pub fn extract<S: Shape>(&mut self) -> Result<ShapeExtractor<S, E::Cursor>> {
        let mut cursor = self.execute()?;
        match self.session.materializer().plan::<S>(cursor.columns()) {
            Ok(plan) => Ok(ShapeExtractor::new(cursor, plan).with_sql(self.sql.normalized())),
            Err(err) => {
                if let Err(close) = cursor.close() {
                    log::warn!("Failed to close cursor of {}: {}", self.sql.normalized(), close);
                }
                Err(err)
            }
        }
    }

    pub fn fetch_all<S: Shape>(&mut self) -> Result<Vec<S>> {
        let extractor = self.extract::<S>()?;
        self.drain(extractor, |e| e.extract_all(), ShapeExtractor::into_inner)
    }

    pub fn fetch_one<S: Shape>(&mut self) -> Result<Option<S>> {
        let extractor = self.extract::<S>()?;
        self.drain(extractor, |e| e.extract_one(), ShapeExtractor::into_inner)
    }

    pub fn fetch_maps(&mut self) -> Result<Vec<IndexMap<String, SqlValue>>> {
        let cursor = self.execute()?;
        let extractor = self
            .session
            .materializer()
            .map_extractor(cursor)
            .with_sql(self.sql.normalized());
        self.drain(extractor, |e| e.extract_all(), |e| e.into_inner())
    }

    /// First column of the first row, converted to `T`.
    pub fn first_value<T: 'static>(&mut self) -> Result<Option<T>> {
        let cursor = self.execute()?;
        self.drain(
            cursor,
            |cursor| {
                let (reader, subject) = self.first_column_reader::<T>(cursor.columns())?;
                match cursor.next_row()? {
                    Some(row) => reader
                        .read(&row, 0)
                        .map(Some)
                        .map_err(|message| Error::conversion(subject, message)),
                    None => Ok(None),
                }
            },
            |cursor| cursor,
        )
    }

    /// Whether the statement returns at least one row. Reads no further than
    /// the first row.
    pub fn exists(&mut self) -> Result<bool> {
        let cursor = self.execute()?;
        self.drain(cursor, |cursor| Ok(cursor.next_row()?.is_some()), |cursor| cursor)
    }

    /// First column of every row, converted to `T`.
    pub fn column_values<T: 'static>(&mut self) -> Result<Vec<T>> {
        let cursor = self.execute()?;
        self.drain(
            cursor,
            |cursor| {
                let (reader, subject) = self.first_column_reader::<T>(cursor.columns())?;
                let mut out = Vec::new();
                while let Some(row) = cursor.next_row()? {
                    let value = reader
                        .read(&row, 0)
                        .map_err(|message| Error::conversion(subject.clone(), message))?;
                    out.push(value);
                }
                Ok(out)
            },
            |cursor| cursor,
        )
    }

    fn first_column_reader<T: 'static>(&self, columns: &[Column]) -> Result<(ColumnReader<T>, String)> {
        let column = columns
            .first()
            .ok_or_else(|| Error::conversion("first column", "result set has no columns"))?;
        let reader = self.session.registry().reader::<T>(column.sql_type)?;
        Ok((reader, format!("column {}", column.label)))
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.sql
            .parameters()
            .index_of(name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))
    }

    /// Run `f` over `source`, then close the cursor whatever the outcome.
    /// Driver errors that surface while reading get the statement attached.
    fn drain<X, R>(
        &self,
        mut source: X,
        f: impl FnOnce(&mut X) -> Result<R>,
        into_cursor: impl FnOnce(X) -> E::Cursor,
    ) -> Result<R> {
        let result = f(&mut source);
        let closed = into_cursor(source).close();
        let value = result.map_err(|e| e.with_sql(self.sql.normalized()))?;
        closed.map_err(|e| Error::driver(self.sql.normalized(), e))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use nocturne_sql::memory::{MemoryCursor, MemoryExecutor};
    use nocturne_sql::DriverError;

    use super::*;

    #[test]
    fn test_positions_expand_values() {
        let session = Session::default();
        let mut db = MemoryExecutor::new();
        let mut query = session
            .query(&mut db, "SELECT * FROM T WHERE A = :x AND B = :y OR B = :x")
            .unwrap();
        query.bind("x", &1_i32).unwrap().bind("y", &"two").unwrap();
        assert_eq!(
            query.positional_params().unwrap(),
            vec![
                SqlValue::Int(1),
                SqlValue::Text("two".into()),
                SqlValue::Int(1)
            ]
        );
    }

    #[test]
    fn test_rebinding_last_wins() {
        let session = Session::default();
        let mut db = MemoryExecutor::new();
        let mut query = session.query(&mut db, "SELECT :a").unwrap();
        query.bind("a", &1_i64).unwrap().bind("a", &2_i64).unwrap();
        assert_eq!(query.positional_params().unwrap(), vec![SqlValue::BigInt(2)]);
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let session = Session::default();
        let mut db = MemoryExecutor::new();
        let mut query = session.query(&mut db, "SELECT :a").unwrap();
        assert!(matches!(
            query.bind("b", &1_i32),
            Err(Error::UnknownParameter(name)) if name == "b"
        ));
        query
            .bind_map([("a", SqlValue::Int(3)), ("zzz", SqlValue::Int(4))])
            .unwrap();
        assert!(query.unbound().is_empty());
    }

    #[test]
    fn test_incomplete_binding_names_every_missing_parameter() {
        let session = Session::default();
        let mut db = MemoryExecutor::new();
        let mut query = session.query(&mut db, "SELECT :a, :b, :c").unwrap();
        query.bind_null("b").unwrap();
        match query.execute_update() {
            Err(Error::IncompleteBinding { missing, sql }) => {
                assert_eq!(missing, vec!["a", "c"]);
                assert_eq!(sql, "SELECT :a, :b, :c");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_driver_failure_carries_sql() {
        let session = Session::default();
        let mut db = MemoryExecutor::new();
        db.push_failure(DriverError::ConnectionClosed);
        let err = session
            .query(&mut db, "SELECT 1")
            .unwrap()
            .execute_update()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "connection closed **** while executing: SELECT 1"
        );
    }

    #[test]
    fn test_first_value_and_column_values_close_the_cursor() {
        let session = Session::default();
        let mut db = MemoryExecutor::new();
        let rows = || {
            MemoryCursor::new(
                vec![Column::new("N", SqlType::Integer)],
                vec![vec![SqlValue::Int(4)], vec![SqlValue::Int(5)]],
            )
        };
        let first = rows();
        let first_probe = first.probe();
        db.push_result(first).push_result(rows());

        let mut query = session.static_query(&mut db, "SELECT N FROM T");
        assert_eq!(query.first_value::<i64>().unwrap(), Some(4));
        assert!(first_probe.is_closed());
        assert_eq!(query.column_values::<String>().unwrap(), vec!["4", "5"]);
    }

    #[test]
    fn test_bind_display_for_unregistered_type() {
        struct Code(u8);
        impl Display for Code {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "C-{}", self.0)
            }
        }

        let session = Session::default();
        let mut db = MemoryExecutor::new();
        let mut query = session.query(&mut db, "SELECT :code").unwrap();
        assert!(matches!(
            query.bind("code", &Code(1)),
            Err(Error::UnsupportedType(_))
        ));
        query.bind_display("code", &Code(7)).unwrap();
        assert_eq!(
            query.positional_params().unwrap(),
            vec![SqlValue::Text("C-7".into())]
        );
    }
}
