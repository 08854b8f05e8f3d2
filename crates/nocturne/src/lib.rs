//! # nocturne
//!
//! A convenience layer over a synchronous SQL driver:
//!
//! - **Named parameters**: `:name` placeholders are rewritten to positional `?`
//!   and bound by name ([`Query`]).
//! - **Type conversion**: a two-level registry of readers and writers keyed by
//!   Rust type and column type, with string-factory fallback
//!   ([`ConverterRegistry`]).
//! - **Row materialization**: result rows become structs through cached
//!   per-layout plans ([`Materializer`], `#[derive(Shape)]`).
//! - **Cursor cache**: open cursors parked under an id with idle expiry
//!   ([`CursorCache`]).
//!
//! ```
//! use nocturne::{Session, Shape};
//! use nocturne::nocturne_sql::memory::{MemoryCursor, MemoryExecutor};
//! use nocturne::nocturne_sql::{Column, SqlType, SqlValue};
//!
//! #[derive(Debug, Default, Shape)]
//! struct User {
//!     id: i64,
//!     user_name: String,
//! }
//!
//! let session = Session::default();
//! let mut db = MemoryExecutor::new();
//! db.push_result(MemoryCursor::new(
//!     vec![Column::new("ID", SqlType::BigInt), Column::new("USER_NAME", SqlType::Varchar)],
//!     vec![vec![SqlValue::BigInt(1), SqlValue::Text("ada".into())]],
//! ));
//!
//! let users: Vec<User> = session
//!     .query(&mut db, "SELECT ID, USER_NAME FROM USERS WHERE ID = :id")?
//!     .bind("id", &1_i64)?
//!     .fetch_all()?;
//! assert_eq!(users[0].user_name, "ada");
//! # Ok::<(), nocturne::Error>(())
//! ```

extern crate self as nocturne;

pub mod clock;
pub mod config;
pub mod convert;
pub mod cursor_cache;
pub mod error;
pub mod extract;
pub mod naming;
pub mod params;
pub mod plan;
pub mod query;
pub mod session;
pub mod shape;
pub mod sql;

pub use nocturne_macro::Shape;
pub use nocturne_sql;

pub use config::{CursorCacheConfig, SessionConfig};
pub use convert::{ColumnReader, ColumnWriter, ConverterRegistry, RegistryBuilder};
pub use cursor_cache::{CursorCache, CursorHandle, CursorId};
pub use error::{Error, Result};
pub use extract::{MapExtractor, ShapeExtractor};
pub use naming::{ColumnNaming, NameMapper};
pub use plan::{MaterializationPlan, Materializer};
pub use query::Query;
pub use session::Session;
pub use shape::{Shape, ShapeDescriptor};
pub use sql::{ParsedSql, SqlCache};
