use std::fmt;
use std::sync::Arc;

use nocturne_sql::{Row, SqlValue};

use super::accessor::Accessor;

pub type ReadAdapter<T> = Arc<dyn Fn(SqlValue) -> Result<T, String> + Send + Sync>;

/// Read-direction converter: a primitive accessor plus an adapter from the
/// accessor's value to `T`. Immutable once built.
pub struct ColumnReader<T> {
    accessor: Accessor,
    adapter: ReadAdapter<T>,
}

impl<T> Clone for ColumnReader<T> {
    fn clone(&self) -> Self {
        Self {
            accessor: self.accessor,
            adapter: Arc::clone(&self.adapter),
        }
    }
}

impl<T> fmt::Debug for ColumnReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnReader")
            .field("accessor", &self.accessor)
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: 'static> ColumnReader<T> {
    pub fn new(
        accessor: Accessor,
        adapter: impl Fn(SqlValue) -> Result<T, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            accessor,
            adapter: Arc::new(adapter),
        }
    }

    pub fn accessor(&self) -> Accessor {
        self.accessor
    }

    /// Fetch cell `index` of `row` and convert it.
    pub fn read(&self, row: &Row, index: usize) -> Result<T, String> {
        let value = self
            .accessor
            .fetch(row, index)
            .map_err(|e| e.to_string())?;
        (self.adapter)(value)
    }

    /// Convert an already fetched value. The value must have the shape the
    /// accessor would have produced.
    pub fn convert(&self, value: SqlValue) -> Result<T, String> {
        (self.adapter)(value)
    }

    /// The same reader with NULL mapped to `None`.
    pub fn optional(&self) -> ColumnReader<Option<T>> {
        let inner = Arc::clone(&self.adapter);
        ColumnReader {
            accessor: self.accessor,
            adapter: Arc::new(move |value| match value {
                SqlValue::Null => Ok(None),
                other => inner(other).map(Some),
            }),
        }
    }
}

/// Adapter failure for a value outside the accessor's contract, or NULL
/// read into a non-optional target.
pub(crate) fn unexpected<T>(value: SqlValue) -> Result<T, String> {
    match value {
        SqlValue::Null => Err(format!(
            "NULL cannot be assigned to non-optional {}",
            std::any::type_name::<T>()
        )),
        other => Err(format!(
            "unexpected {} value {} for {}",
            other.natural_type(),
            other,
            std::any::type_name::<T>()
        )),
    }
}
