//! Error taxonomy for the loader.
//!
//! Row-level failures (`NormalizeError`) drop a single record. Store
//! failures split into fatal ones (`Connection`, `Query`) and recoverable
//! ones (`Insert`) that only skip the affected row or batch.

use thiserror::Error;

/// A raw field that could not be coerced into its canonical type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("malformed numeric field '{field}': '{value}'")]
    MalformedNumericField { field: &'static str, value: String },

    #[error("malformed date field '{field}': '{value}' (expected DD/MM/YYYY)")]
    MalformedDateField { field: &'static str, value: String },
}

/// Errors raised by a sales store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store unreachable or authentication rejected.
    #[error("store connection failed: {message}")]
    Connection { message: String },

    /// A read, commit or close failed.
    #[error("store query failed: {message}")]
    Query { message: String },

    /// A single-row upsert or a fact batch was rejected.
    #[error("store insert failed: {message}")]
    Insert { message: String },
}

impl StoreError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn insert(message: impl Into<String>) -> Self {
        Self::Insert {
            message: message.into(),
        }
    }

    /// Whether the pipeline can skip past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Insert { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_insert_errors_are_recoverable() {
        assert!(StoreError::insert("duplicate").is_recoverable());
        assert!(!StoreError::query("select failed").is_recoverable());
        assert!(!StoreError::connection("refused").is_recoverable());
    }

    #[test]
    fn test_error_messages_name_the_field() {
        let err = NormalizeError::MalformedNumericField {
            field: "Units_Sold",
            value: "12a".to_string(),
        };
        assert_eq!(err.to_string(), "malformed numeric field 'Units_Sold': '12a'");

        let err = StoreError::connection("password authentication failed");
        assert!(err.to_string().contains("password authentication failed"));
    }
}
