use std::fmt;
use std::sync::Arc;

use nocturne_sql::{SqlType, SqlValue};

pub type WriteAdapter<T> = Arc<dyn Fn(&T) -> Result<SqlValue, String> + Send + Sync>;

/// Bind-direction converter: turns a `T` into the value sent for a column of
/// type `target`.
pub struct ColumnWriter<T> {
    target: SqlType,
    adapter: WriteAdapter<T>,
}

impl<T> Clone for ColumnWriter<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            adapter: Arc::clone(&self.adapter),
        }
    }
}

impl<T> fmt::Debug for ColumnWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnWriter")
            .field("target", &self.target)
            .field("source", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: 'static> ColumnWriter<T> {
    pub fn new(
        target: SqlType,
        adapter: impl Fn(&T) -> Result<SqlValue, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            target,
            adapter: Arc::new(adapter),
        }
    }

    pub fn target(&self) -> SqlType {
        self.target
    }

    pub fn write(&self, value: &T) -> Result<SqlValue, String> {
        (self.adapter)(value)
    }

    /// The same writer with `None` bound as NULL.
    pub fn optional(&self) -> ColumnWriter<Option<T>> {
        let inner = Arc::clone(&self.adapter);
        ColumnWriter {
            target: self.target,
            adapter: Arc::new(move |value: &Option<T>| match value {
                Some(v) => inner(v),
                None => Ok(SqlValue::Null),
            }),
        }
    }
}
