//! Error types for the session engine.
//!
//! # Design
//! Parsing and translation failures are detected synchronously and fail a
//! transfer before the transport is involved. Everything the transport itself
//! reports (connect failures, timeouts, cancellation, truncated streams) is
//! carried opaquely in `TransportError` and surfaced verbatim at completion.

use std::io;

/// Failures while decoding a message head.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// Header bytes could not be decoded as text.
    #[error("header line is not valid text")]
    InvalidLine,

    /// The request line did not start with a method token.
    #[error("request line has no valid method")]
    InvalidMethod,

    /// The request line did not carry a target URI and version.
    #[error("request line has no valid URI")]
    InvalidUri,

    /// The header block ended but the start line could not be turned into a
    /// response, or the block never ended.
    #[error("incomplete or malformed header block")]
    IncompleteHeader,
}

/// Failures reported by a transport while executing a transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("request timed out")]
    Timeout,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("connection closed before the response completed")]
    ConnectionClosed,

    #[error("transport has been shut down")]
    Shutdown,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Top-level error for every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The translator only speaks GET, POST, PUT, DELETE and HEAD.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("failed to open request body stream: {0}")]
    StreamOpenFailed(#[source] io::Error),

    #[error("failed to read request body stream: {0}")]
    StreamReadFailed(#[source] io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A transfer method was called in a state that does not permit it.
    #[error("invalid transfer state: {0}")]
    InvalidState(&'static str),

    #[error("local io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl SessionError {
    /// True when the transfer ended because somebody cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Transport(TransportError::Cancelled))
    }

    /// True when the transfer ended because its deadline passed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Transport(TransportError::Timeout))
    }
}
