//! Error taxonomy for connection planning and client-side transfers.

use thiserror::Error;

/// Malformed URL syntax or an unsupported scheme.
///
/// Parse errors are surfaced synchronously while building a connection and
/// never touch the network.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("scheme must be monetdb:// or monetdbs://")]
    InvalidScheme,
    #[error("invalid port: '{0}'")]
    InvalidPort(String),
    #[error("invalid host '{0}'")]
    InvalidHost(String),
    #[error("unknown query parameter '{0}'")]
    UnknownParameter(String),
    #[error("missing '=' in query parameter '{0}'")]
    MissingValue(String),
    #[error("invalid percent-encoding in '{0}'")]
    InvalidPercentEncoding(String),
    #[error("url path may only contain the database name")]
    TooManyPathSegments,
    /// A query value failed its parameter's type check. The URL grammar
    /// itself was fine, so the underlying cause is a [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Internally consistent syntax but a contradictory or out-of-range
/// parameter combination.
///
/// Validation is fail-fast: the first violated rule is reported, and no
/// network I/O has happened yet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("parameter '{parameter}': invalid {expected} value '{value}'")]
    InvalidValue {
        parameter: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("invalid port number: {0}")]
    PortOutOfRange(i32),
    #[error("with sock=, host must be 'localhost' or empty, not '{0}'")]
    SockRequiresLocalhost(String),
    #[error("monetdbs:// and sock= cannot be combined")]
    SockTlsConflict,
    #[error("invalid certhash: {0}")]
    InvalidCertHash(String),
    #[error("clientcert= can only be used together with clientkey=")]
    ClientCertWithoutKey,
    #[error("clientpem= cannot be combined with clientkey= or clientcert=")]
    ClientPemConflict,
    #[error("invalid database name '{0}'")]
    InvalidDatabaseName(String),
    #[error("invalid binary level '{0}'")]
    InvalidBinaryLevel(String),
}

/// A transfer that did not run to completion.
///
/// A refusal is not represented here: the handler declining a transfer is a
/// statement-level outcome that leaves the connection usable (see
/// [`TransferOutcome::Refused`](crate::transfer::TransferOutcome)). A
/// `Failed` transfer poisons the underlying stream because the byte-level
/// protocol state can no longer be trusted.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("malformed transfer request: {0}")]
    MalformedRequest(String),
    #[error("transfer failed: {0}")]
    Failed(#[from] std::io::Error),
}
