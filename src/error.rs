use thiserror::Error;

use crate::ast::SqlNodeKind;

/// Errors raised by the compilation pipeline.
///
/// "No match" outcomes of individual provider compilers are not errors; they
/// are `Ok(None)` and only become [`SqlError::NotCompilable`] once every
/// compiler of a chain declined.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SqlError {
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    #[error("cannot replace a {expected:?} node with a {actual:?} node")]
    NodeKindMismatch {
        expected: SqlNodeKind,
        actual: SqlNodeKind,
    },

    #[error("value for placeholder {0} is not set")]
    PlaceholderNotSet(String),

    #[error("values for dynamic filter {0} are not set")]
    DynamicFilterNotSet(String),

    #[error("parameter name not found for {0}")]
    ParameterNameNotFound(String),

    #[error("{dialect} translator has no rule for {rule}")]
    MissingTranslation { dialect: String, rule: String },

    #[error("{feature} is not supported by {server}")]
    Unsupported { feature: String, server: String },

    #[error("unsupported server: {0}")]
    UnsupportedServer(String),

    #[error("invalid server version `{0}`")]
    InvalidVersion(String),

    #[error("no compiler accepted the {0} provider")]
    NotCompilable(&'static str),

    #[error("column index {index} is out of range for a source with {count} columns")]
    ColumnOutOfRange { index: usize, count: usize },
}

impl SqlError {
    pub(crate) fn invalid_argument(argument: &'static str, reason: impl Into<String>) -> Self {
        SqlError::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(feature: impl Into<String>, server: impl Into<String>) -> Self {
        SqlError::Unsupported {
            feature: feature.into(),
            server: server.into(),
        }
    }
}

pub type Result<T, E = SqlError> = std::result::Result<T, E>;
