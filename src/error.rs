//! Error types for the wire codec, the dispatch engine and backends.

use std::io;

use thiserror::Error;

/// Result type alias for engine and backend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the wire codec.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("buffer too short: wanted {wanted} bytes, got {got}")]
    BufferTooShort { wanted: usize, got: usize },

    #[error("could not write entire message")]
    CouldNotWriteAll,

    #[error("string of {0} bytes too long to write to wire, max length 65535")]
    StringTooBig(usize),

    #[error("field of {0} elements does not fit its length prefix")]
    FieldTooBig(usize),

    #[error("9p message type {0} not recognized")]
    UnknownMessageType(u8),

    #[error("invalid frame size {0}")]
    BadFrameSize(u32),

    #[error("string is not valid utf-8")]
    InvalidUtf8,

    #[error("{0} unexpected trailing bytes in message")]
    TrailingBytes(usize),

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for WireError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WriteZero => WireError::CouldNotWriteAll,
            _ => WireError::Io(err),
        }
    }
}

impl WireError {
    /// Whether this failure belongs to a single send attempt rather than to
    /// the incoming byte stream.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            WireError::StringTooBig(_) | WireError::FieldTooBig(_) | WireError::CouldNotWriteAll
        )
    }
}

/// Errors surfaced by the dispatch engine and by `Server` implementations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed frame; nothing after it on the stream can be trusted.
    #[error("framing error: {0}")]
    Framing(WireError),

    /// The peer sent a message that cannot be handled in context.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Backend-reported failure, answered with an Rerror.
    #[error("{0}")]
    Application(String),

    #[error("{0} is not implemented by this server")]
    Unimplemented(&'static str),

    /// A single response could not be serialized or sent.
    #[error("encoding error: {0}")]
    Encoding(WireError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn application(msg: impl Into<String>) -> Self {
        Error::Application(msg.into())
    }

    /// Fatal errors tear down the connection; the rest become an Rerror.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Framing(_) | Error::Protocol(_) | Error::Io(_))
    }
}

impl From<WireError> for Error {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(io) => Error::Io(io),
            err if err.is_encoding() => Error::Encoding(err),
            err => Error::Framing(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_are_classified() {
        let err: Error = WireError::StringTooBig(70000).into();
        assert!(matches!(err, Error::Encoding(_)));
        assert!(!err.is_fatal());

        let err: Error = WireError::UnknownMessageType(3).into();
        assert!(matches!(err, Error::Framing(_)));
        assert!(err.is_fatal());

        let err: Error = WireError::BufferTooShort { wanted: 4, got: 1 }.into();
        assert!(err.is_fatal());
    }

    #[test]
    fn refused_writes_are_short_writes() {
        let err = WireError::from(io::Error::from(io::ErrorKind::WriteZero));
        assert!(matches!(err, WireError::CouldNotWriteAll));

        let err = WireError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(Error::from(err), Error::Io(_)));
    }

    #[test]
    fn application_errors_keep_their_text() {
        let err = Error::application("requested path `x` not found");
        assert_eq!(err.to_string(), "requested path `x` not found");
        assert!(!err.is_fatal());
        assert_eq!(
            Error::Unimplemented("walk").to_string(),
            "walk is not implemented by this server"
        );
    }
}
