//! Error types surfaced by the bridge
//!
//! One enum per failure kind, plus [`BridgeError`] for callers that want a
//! single error type.

use thiserror::Error;

/// The filter program did not compile. Fatal to the session.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error("Unable to compile jq filter: {message} (at offset {offset})")]
    Syntax { message: String, offset: usize },
}

/// Input text was not valid JSON. Local to the one call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// An engine value could not be represented as a host value
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    /// The value is the engine's invalid marker, optionally with its message
    #[error("invalid")]
    Invalid(Option<String>),

    /// The handle does not address a value the bridge recognizes
    #[error("unknown type")]
    UnknownType,
}

/// Session protocol misuse
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    #[error("Session is closed")]
    Closed,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BridgeError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Run(#[from] RunError),
}
