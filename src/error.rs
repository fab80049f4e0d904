//! Error types
//!
//! Configuration mistakes, cast failures and tolerance overruns all surface
//! through [`Error`]. A selector or pattern that simply matches nothing is not
//! an error: it yields [`Value::Null`](crate::Value::Null) and the field
//! default takes over.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("`{schema}.{field}` requires `{backend}` backend configuration")]
    MissingBackendConfig {
        schema: String,
        field: String,
        backend: &'static str,
    },

    #[error("`{schema}.{field}`: nested field type should be `{expected}` or `list[{expected}]`, not `{found}`")]
    NestedShape {
        schema: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("`{schema}`: {reason}")]
    Config { schema: String, reason: String },

    #[error("operation `{op}` is not supported by `{found}` value")]
    OpMismatch { op: String, found: &'static str },

    #[error("operation `{op}` should follow `attrs`, not `{previous}`")]
    ChainOrder { op: &'static str, previous: String },

    #[error("pattern `{pattern}` does not contain named groups")]
    NoNamedGroups { pattern: String },

    #[error("operation `{op}` needs a non-empty separator")]
    EmptySeparator { op: &'static str },

    #[error("invalid pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("invalid css query `{query}`: {reason}")]
    Query { query: String, reason: String },

    #[error("failed to build `{backend}` backend: {reason}")]
    Backend {
        backend: &'static str,
        reason: String,
    },

    #[error("cannot cast {value} to `{shape}`: {reason}")]
    Cast {
        shape: String,
        value: String,
        reason: String,
    },

    #[error("`{schema}`: {failed} of {total} fields failed parse")]
    ToleranceExceeded {
        schema: String,
        failed: usize,
        total: usize,
    },

    #[error("`{schema}` pre-validation failed: {reason}")]
    PreValidation { schema: String, reason: String },

    #[error("invalid schema definition: {0}")]
    Definition(String),
}

impl Error {
    pub(crate) fn config(schema: &str, reason: impl Into<String>) -> Self {
        Error::Config {
            schema: schema.to_string(),
            reason: reason.into(),
        }
    }
}
