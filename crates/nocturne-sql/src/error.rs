use thiserror::Error;

/// Errors reported by a driver through the [`Cursor`](crate::Cursor) and
/// [`Executor`](crate::Executor) traits.
#[derive(Debug, Error)]
pub enum DriverError {
    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Server-sent error response.
    #[error("{severity}: {message} ({code})")]
    Server {
        severity: String,
        code: String,
        message: String,
    },
    /// Connection is closed or in an invalid state.
    #[error("connection closed")]
    ConnectionClosed,
    /// The cursor was closed before this call.
    #[error("cursor closed")]
    CursorClosed,
    /// Column index outside the row.
    #[error("column index {index} out of range (row has {len} columns)")]
    ColumnIndex { index: usize, len: usize },
    /// No column with this label.
    #[error("column '{0}' not found")]
    ColumnNotFound(String),
    /// A cell could not be decoded or narrowed to the requested primitive.
    #[error("type conversion: {0}")]
    TypeConversion(String),
    /// Anything else a driver wants to surface.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl DriverError {
    /// Wrap an arbitrary driver-specific error.
    pub fn other(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        DriverError::Other(Box::new(e))
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
