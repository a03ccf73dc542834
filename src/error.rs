//! Symbolic error taxonomy for the Mode 6 engine.
//!
//! Mirrors the `Mode6Exception` / `SERR_*` templates in `packet.py`, but as a
//! closed, matchable enum instead of a single exception class carrying a
//! pre-formatted string.

use thiserror::Error;

/// Server error codes, from the high byte of the `status` field on an
/// error response. See spec.md §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorCode {
    Ok,
    Permission,
    BadFormat,
    BadOp,
    BadAssoc,
    UnknownVar,
    BadValue,
    Restrict,
    Unspec(u8),
}

impl From<u8> for ServerErrorCode {
    fn from(code: u8) -> Self {
        match code {
            0 => ServerErrorCode::Ok,
            1 => ServerErrorCode::Permission,
            2 => ServerErrorCode::BadFormat,
            3 => ServerErrorCode::BadOp,
            4 => ServerErrorCode::BadAssoc,
            5 => ServerErrorCode::UnknownVar,
            6 => ServerErrorCode::BadValue,
            7 => ServerErrorCode::Restrict,
            other => ServerErrorCode::Unspec(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed packet")]
    BadFormat,

    #[error("server disallowed request (authentication?)")]
    Permission,

    #[error("server reports a bad opcode in request")]
    BadOp,

    #[error("association ID {0} unknown to server")]
    BadAssoc(u16),

    #[error("a request variable unknown to the server")]
    UnknownVar,

    #[error("server indicates a request variable was bad")]
    BadValue,

    #[error("server denied the request (restricted)")]
    Restrict,

    #[error("server returned an unspecified error ({0})")]
    Unspec(u8),

    #[error("request timed out")]
    Timeout,

    #[error("response from server was incomplete")]
    Incomplete,

    #[error("buffer size exceeded for returned data")]
    TooMuch,

    #[error("select/poll call failed: {0}")]
    SelectFailed(#[source] nix::Error),

    #[error("no host open")]
    NoHost,

    #[error("response length should have been a multiple of 4")]
    BadLength,

    #[error("write to host failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("could not connect to host: {0}")]
    ConnectFailed(#[source] std::io::Error),

    #[error("read from host failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("authenticated send is not yet implemented")]
    NotImplemented,

    #[error("payload too long for a single request ({0} > {1})")]
    InternalTooLong(usize, usize),

    #[error("host lookup failed: {0}")]
    NoSuchHost(String),
}

impl Error {
    /// Maps a server-reported error code (status high byte) to a symbolic
    /// kind, per spec.md §4.4. `associd` is carried through so `BadAssoc`
    /// always has the id in scope, resolving the Open Question in spec.md §9.
    pub fn from_server_code(code: u8, associd: u16) -> Option<Error> {
        match ServerErrorCode::from(code) {
            ServerErrorCode::Ok => None,
            ServerErrorCode::Permission => Some(Error::Permission),
            ServerErrorCode::BadFormat => Some(Error::BadFormat),
            ServerErrorCode::BadOp => Some(Error::BadOp),
            ServerErrorCode::BadAssoc => Some(Error::BadAssoc(associd)),
            ServerErrorCode::UnknownVar => Some(Error::UnknownVar),
            ServerErrorCode::BadValue => Some(Error::BadValue),
            ServerErrorCode::Restrict => Some(Error::Restrict),
            ServerErrorCode::Unspec(c) => Some(Error::Unspec(c)),
        }
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Self {
        Error::SelectFailed(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
