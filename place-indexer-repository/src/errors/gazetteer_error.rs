//! Gazetteer error types.

use thiserror::Error;

/// Errors raised while reading from the gazetteer database.
#[derive(Debug, Error)]
pub enum GazetteerError {
    /// The database rejected a query or the connection dropped.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A single row could not be decoded. Callers skip and count these.
    ///
    /// `column` is set when the column itself could not be read (missing or of the wrong
    /// type), and unset when the value was read but is unusable.
    #[error("Failed to decode row (place_id={place_id:?}): {message}")]
    RowDecode {
        place_id: Option<i64>,
        column: Option<String>,
        message: String,
    },

    /// The database does not look like a gazetteer (missing columns on every row,
    /// missing functions). Aborts the current operation.
    #[error("Structural error: {0}")]
    Structural(String),
}

impl GazetteerError {
    /// Create a row decode error for an unusable value.
    pub fn row_decode(place_id: Option<i64>, message: impl Into<String>) -> Self {
        Self::RowDecode {
            place_id,
            column: None,
            message: message.into(),
        }
    }

    /// Create a row decode error for a column that could not be read.
    pub fn column_decode(
        place_id: Option<i64>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RowDecode {
            place_id,
            column: Some(column.into()),
            message: message.into(),
        }
    }

    /// The unreadable column of a row decode error.
    pub fn decode_column(&self) -> Option<&str> {
        match self {
            Self::RowDecode { column, .. } => column.as_deref(),
            _ => None,
        }
    }

    /// Create a structural error.
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }
}
