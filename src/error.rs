use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors crossing the dialog-core boundary.
///
/// No error ever propagates through the UA back into the transaction
/// manager; handlers log and recover locally. These values surface in
/// logs and in `Result`s returned by the helper surfaces (body parsing,
/// request building, the transaction facade).
#[derive(Debug)]
pub enum Error {
    /// Malformed SIP header or message content.
    Parse(String),
    /// Malformed SDP payload.
    Sdp(String),
    /// Malformed multipart/mixed body.
    Multipart(String),
    /// Well-formed but semantically invalid message, e.g. a tag-less 2xx.
    Protocol(String),
    /// A UA timer fired.
    Timeout(String),
    Internal(String),
    /// The transaction manager refused an operation.
    Transaction(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "parse error: {}", e),
            Error::Sdp(e) => write!(f, "sdp error: {}", e),
            Error::Multipart(e) => write!(f, "multipart error: {}", e),
            Error::Protocol(e) => write!(f, "protocol error: {}", e),
            Error::Timeout(e) => write!(f, "timeout: {}", e),
            Error::Internal(e) => write!(f, "internal error: {}", e),
            Error::Transaction(e) => write!(f, "transaction error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<rsip::Error> for Error {
    fn from(e: rsip::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
