use nocturne_sql::{DriverError, SqlType};
use thiserror::Error;

use crate::cursor_cache::CursorId;

/// Error type for nocturne.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed named-parameter SQL.
    #[error("{0}")]
    Syntax(String),
    /// No conversion table and no string factory exists for the type.
    #[error("type not supported: {0}")]
    UnsupportedType(&'static str),
    /// The type is known but cannot be read from or written to this column type.
    #[error("cannot convert {sql_type} to {target}")]
    UnsupportedConversion {
        sql_type: SqlType,
        target: &'static str,
    },
    /// A converter rejected a concrete value.
    #[error("error converting {subject}: {message}")]
    Conversion { subject: String, message: String },
    /// Execution was attempted before every named parameter received a value.
    #[error(
        "SQL contains named parameters that have not been bound yet: {} (SQL: {sql})",
        .missing.join(", ")
    )]
    IncompleteBinding { missing: Vec<String>, sql: String },
    /// A value was bound to a name the SQL does not contain.
    #[error("no such parameter: \"{0}\"")]
    UnknownParameter(String),
    #[error("No query with ID {0} in cache. It may have gone stale")]
    StaleCursor(CursorId),
    #[error("a cursor with ID {0} is already registered")]
    DuplicateCursor(CursorId),
    #[error("invalid cursor ID: {0:?}")]
    InvalidCursorId(String),
    /// The shape cannot be built from the columns of the result set.
    #[error("cannot materialize {shape}: {message}")]
    ShapeMismatch { shape: &'static str, message: String },
    /// Failure reported by the driver, together with the SQL being executed.
    #[error("{source}{}", while_executing(.sql))]
    Driver {
        sql: String,
        #[source]
        source: DriverError,
    },
}

impl Error {
    pub fn driver(sql: impl Into<String>, source: DriverError) -> Self {
        Error::Driver {
            sql: sql.into(),
            source,
        }
    }

    /// Attach `sql` to a driver error that does not carry a statement yet.
    pub fn with_sql(self, sql: &str) -> Self {
        match self {
            Error::Driver { sql: missing, source } if missing.is_empty() => Error::driver(sql, source),
            other => other,
        }
    }

    pub(crate) fn conversion(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Conversion {
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub(crate) fn shape_mismatch(shape: &'static str, message: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            shape,
            message: message.into(),
        }
    }
}

impl From<DriverError> for Error {
    fn from(source: DriverError) -> Self {
        Error::Driver {
            sql: String::new(),
            source,
        }
    }
}

fn while_executing(sql: &str) -> String {
    if sql.is_empty() {
        String::new()
    } else {
        format!(" **** while executing: {}", sql)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_mentions_sql() {
        let err = Error::driver("SELECT 1", DriverError::ConnectionClosed);
        assert_eq!(
            err.to_string(),
            "connection closed **** while executing: SELECT 1"
        );
        let bare: Error = DriverError::CursorClosed.into();
        assert_eq!(bare.to_string(), "cursor closed");
    }

    #[test]
    fn test_incomplete_binding_lists_names() {
        let err = Error::IncompleteBinding {
            missing: vec!["y".into(), "z".into()],
            sql: "SELECT :y, :z".into(),
        };
        assert_eq!(
            err.to_string(),
            "SQL contains named parameters that have not been bound yet: y, z (SQL: SELECT :y, :z)"
        );
    }
}
