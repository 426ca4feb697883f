use thiserror::Error;

/// Errors produced by identifier parsing and structural checks on trust
/// objects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid ISD identifier: {0}")]
    InvalidIsd(String),

    #[error("invalid AS number: {0}")]
    InvalidAsn(String),

    #[error("invalid ISD-AS identifier: {0}")]
    InvalidIa(String),

    #[error("wildcard identifier not allowed for {field}: {value}")]
    Wildcard { field: &'static str, value: String },

    #[error("version of {field} must be at least 1")]
    ZeroVersion { field: &'static str },

    #[error("required field is empty: {0}")]
    EmptyField(&'static str),

    #[error("malformed chain: {0}")]
    MalformedChain(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
