//! Error types for policy application
//!
//! This module defines the errors a run can hit: reaching the store,
//! statements the store rejects, catalog reads that fail, and bad
//! configuration. Only some of them end a run; see [`PolicyError::is_fatal`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use storage_policy_model::NamespaceError;

use crate::config::ConfigError;

/// Why the store rejected a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The object is already there (duplicate policy, function, table).
    AlreadyExists,
    /// A referenced object is missing (table, function, schema).
    UndefinedObject,
    /// The connected role lacks the privilege.
    PermissionDenied,
    /// The statement did not parse.
    Syntax,
    /// Anything else.
    Other,
}

impl RejectionKind {
    /// Classify by PostgreSQL SQLSTATE.
    pub fn from_sql_state(code: &str) -> Self {
        match code {
            "42710" | "42P07" | "42723" | "42P06" => RejectionKind::AlreadyExists,
            "42704" | "42883" | "42P01" | "3F000" => RejectionKind::UndefinedObject,
            "42501" => RejectionKind::PermissionDenied,
            "42601" => RejectionKind::Syntax,
            _ => RejectionKind::Other,
        }
    }

    /// Classify by message text, for stores that do not report a SQLSTATE.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("already exists") || lower.contains("duplicate") {
            RejectionKind::AlreadyExists
        } else if lower.contains("does not exist") {
            RejectionKind::UndefinedObject
        } else if lower.contains("permission denied") || lower.contains("must be owner") {
            RejectionKind::PermissionDenied
        } else if lower.contains("syntax error") {
            RejectionKind::Syntax
        } else {
            RejectionKind::Other
        }
    }

    /// Short label used in report lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::AlreadyExists => "already exists",
            RejectionKind::UndefinedObject => "undefined object",
            RejectionKind::PermissionDenied => "permission denied",
            RejectionKind::Syntax => "syntax error",
            RejectionKind::Other => "rejected",
        }
    }
}

/// Policy engine error types.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Could not reach or authenticate to the store
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The store refused a statement
    #[error("Statement rejected: {message}")]
    StatementRejected {
        /// Store-provided error message.
        message: String,
        /// SQLSTATE, when the store reports one.
        sql_state: Option<String>,
    },

    /// A read query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Catalog rows did not have the expected shape
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// The handle was used after `close`
    #[error("Connection closed")]
    ConnectionClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Namespace names that cannot be spliced into SQL
    #[error("Invalid namespace: {0}")]
    Namespace(#[from] NamespaceError),
}

/// Result type for policy engine operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

impl PolicyError {
    /// Build a statement rejection without a SQLSTATE.
    pub fn rejected(message: impl Into<String>) -> Self {
        PolicyError::StatementRejected {
            message: message.into(),
            sql_state: None,
        }
    }

    /// Check if this error ends the run.
    ///
    /// Statement and verification failures are absorbed into the report;
    /// failing to connect, or being misconfigured, is not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PolicyError::ConnectionFailed(_) | PolicyError::Config(_) | PolicyError::Namespace(_)
        )
    }

    /// Classify a statement rejection.
    ///
    /// Returns `None` for errors that are not statement rejections.
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            PolicyError::StatementRejected { message, sql_state } => Some(
                sql_state
                    .as_deref()
                    .map(RejectionKind::from_sql_state)
                    .filter(|kind| *kind != RejectionKind::Other)
                    .unwrap_or_else(|| RejectionKind::from_message(message)),
            ),
            _ => None,
        }
    }

    /// Get error code for structured output.
    pub fn error_code(&self) -> &'static str {
        match self {
            PolicyError::ConnectionFailed(_) => "CONNECTION_FAILED",
            PolicyError::StatementRejected { .. } => "STATEMENT_REJECTED",
            PolicyError::QueryFailed(_) => "QUERY_FAILED",
            PolicyError::VerificationFailed(_) => "VERIFICATION_FAILED",
            PolicyError::ConnectionClosed => "CONNECTION_CLOSED",
            PolicyError::Config(_) => "CONFIG_ERROR",
            PolicyError::Namespace(_) => "INVALID_NAMESPACE",
        }
    }

    /// The store's own message, without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            PolicyError::ConnectionFailed(m)
            | PolicyError::QueryFailed(m)
            | PolicyError::VerificationFailed(m) => m.clone(),
            PolicyError::StatementRejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(PolicyError::ConnectionFailed("refused".into()).is_fatal());
        assert!(PolicyError::Config(ConfigError::MissingValue("host".into())).is_fatal());
        assert!(!PolicyError::rejected("boom").is_fatal());
        assert!(!PolicyError::QueryFailed("boom".into()).is_fatal());
        assert!(!PolicyError::VerificationFailed("boom".into()).is_fatal());
    }

    #[test]
    fn test_rejection_kind_prefers_sql_state() {
        let err = PolicyError::StatementRejected {
            message: "something odd".into(),
            sql_state: Some("42710".into()),
        };
        assert_eq!(err.rejection_kind(), Some(RejectionKind::AlreadyExists));

        let err = PolicyError::StatementRejected {
            message: "permission denied for table objects".into(),
            sql_state: Some("XX000".into()),
        };
        assert_eq!(err.rejection_kind(), Some(RejectionKind::PermissionDenied));
    }

    #[test]
    fn test_rejection_kind_from_message() {
        assert_eq!(
            RejectionKind::from_message("policy \"x\" for table \"objects\" already exists"),
            RejectionKind::AlreadyExists
        );
        assert_eq!(
            RejectionKind::from_message("function storage.is_admin() does not exist"),
            RejectionKind::UndefinedObject
        );
        assert_eq!(
            RejectionKind::from_message("must be owner of table objects"),
            RejectionKind::PermissionDenied
        );
        assert_eq!(
            RejectionKind::from_message("syntax error at or near \"FOO\""),
            RejectionKind::Syntax
        );
        assert_eq!(RejectionKind::from_message("disk full"), RejectionKind::Other);
    }

    #[test]
    fn test_non_statement_errors_have_no_rejection_kind() {
        assert_eq!(PolicyError::QueryFailed("x".into()).rejection_kind(), None);
        assert_eq!(PolicyError::ConnectionClosed.rejection_kind(), None);
    }

    #[test]
    fn test_error_codes_and_detail() {
        let err = PolicyError::rejected("duplicate key");
        assert_eq!(err.error_code(), "STATEMENT_REJECTED");
        assert_eq!(err.detail(), "duplicate key");
        assert_eq!(err.to_string(), "Statement rejected: duplicate key");
        assert_eq!(PolicyError::ConnectionClosed.detail(), "Connection closed");
    }
}
