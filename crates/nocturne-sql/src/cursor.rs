use crate::error::DriverResult;
use crate::row::{Column, Row};
use crate::types::SqlValue;

/// A forward-only handle over the rows of an executing query.
///
/// Implementations must report the same column list for every row they yield.
/// After `next_row` has returned `Ok(None)` callers will not call it again.
pub trait Cursor: Send {
    /// Column metadata of the result set.
    fn columns(&self) -> &[Column];

    /// Advance to the next row. `Ok(None)` means the cursor is exhausted.
    fn next_row(&mut self) -> DriverResult<Option<Row>>;

    /// Release the cursor. Must be idempotent.
    fn close(&mut self) -> DriverResult<()>;

    /// Close the connection the cursor was produced on. Drivers that do not
    /// own a connection per cursor can leave the default.
    fn close_connection(&mut self) -> DriverResult<()> {
        Ok(())
    }
}

impl<C: Cursor + ?Sized> Cursor for &mut C {
    fn columns(&self) -> &[Column] {
        (**self).columns()
    }

    fn next_row(&mut self) -> DriverResult<Option<Row>> {
        (**self).next_row()
    }

    fn close(&mut self) -> DriverResult<()> {
        (**self).close()
    }

    fn close_connection(&mut self) -> DriverResult<()> {
        (**self).close_connection()
    }
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn columns(&self) -> &[Column] {
        (**self).columns()
    }

    fn next_row(&mut self) -> DriverResult<Option<Row>> {
        (**self).next_row()
    }

    fn close(&mut self) -> DriverResult<()> {
        (**self).close()
    }

    fn close_connection(&mut self) -> DriverResult<()> {
        (**self).close_connection()
    }
}

/// Runs positional SQL (`?` placeholders) against an already-open connection.
pub trait Executor {
    type Cursor: Cursor;

    /// Execute a statement that produces rows.
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<Self::Cursor>;

    /// Execute a statement and return the affected row count.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<u64>;
}

impl<E: Executor + ?Sized> Executor for &mut E {
    type Cursor = E::Cursor;

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<Self::Cursor> {
        (**self).query(sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<u64> {
        (**self).execute(sql, params)
    }
}
