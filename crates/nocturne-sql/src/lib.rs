//! # nocturne-sql
//!
//! The driver seam of the nocturne client layer. Everything a database driver has
//! to provide to nocturne lives here:
//!
//! - **Type tags**: [`SqlType`], a closed set of column type identifiers.
//! - **Values**: [`SqlValue`], the dynamically typed cell and parameter value.
//! - **Rows**: [`Row`] and [`Column`], one decoded result row plus its metadata.
//! - **Traits**: [`Cursor`] (forward-only result handle) and [`Executor`]
//!   (runs positional SQL against an already-open connection).
//!
//! The [`memory`] module contains a complete in-memory driver, handy for tests.

pub mod cursor;
pub mod error;
pub mod memory;
pub mod row;
pub mod types;

pub use cursor::{Cursor, Executor};
pub use error::{DriverError, DriverResult};
pub use row::{Column, Row};
pub use types::{SqlType, SqlValue};
