use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid query parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Operator '{op}' is not supported on {field}")]
    UnsupportedOperator { field: String, op: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Duplicate constraint on {0}")]
    DuplicateConstraint(String),

    #[error("Cannot mix included and excluded fields")]
    MixedProjection,
}
