//! IMAP and POP3 retrieval error types.

use std::fmt;
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::result;

use crate::types::Uid;

/// A convenience wrapper around `Result` for `mail_retriever::Error`.
pub type Result<T> = result::Result<T, Error>;

/// The kind of failure reported by a session transport.
///
/// Every error crossing the transport boundary is reduced to one of these kinds before the retry
/// machinery looks at it, so that classification never depends on the concrete protocol library.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The peer reset the connection.
    ConnectionReset,
    /// The connection was aborted locally or by the peer.
    ConnectionAborted,
    /// Writing to a connection whose other end is gone.
    BrokenPipe,
    /// A read or write timed out.
    TimedOut,
    /// A command was issued on a socket that is not connected.
    NotConnected,
    /// Any other `io::Error` while talking to the server.
    Io,
    /// A TLS handshake or TLS stream failure.
    Tls,
    /// The server terminated the session with an unsolicited `BYE`.
    Bye,
    /// A server response that could not be parsed.
    Parse,
    /// A well-formed but unexpected server response.
    Unexpected,
    /// A `BAD` response from the server.
    Bad,
    /// A `NO` response from the server.
    No,
    /// Anything else.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::ConnectionReset => "connection reset",
            TransportErrorKind::ConnectionAborted => "connection aborted",
            TransportErrorKind::BrokenPipe => "broken pipe",
            TransportErrorKind::TimedOut => "timed out",
            TransportErrorKind::NotConnected => "not connected",
            TransportErrorKind::Io => "I/O error",
            TransportErrorKind::Tls => "TLS error",
            TransportErrorKind::Bye => "server said BYE",
            TransportErrorKind::Parse => "unparseable response",
            TransportErrorKind::Unexpected => "unexpected response",
            TransportErrorKind::Bad => "BAD response",
            TransportErrorKind::No => "NO response",
            TransportErrorKind::Other => "transport error",
        };
        f.write_str(s)
    }
}

/// A structured error raised by a [`Transport`](crate::transport::Transport) or
/// [`Connector`](crate::transport::Connector).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    /// Make a new error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        TransportError {
            kind,
            message: message.into(),
        }
    }

    /// The kind of failure.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// The message reported along with the failure.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<IoError> for TransportError {
    fn from(err: IoError) -> TransportError {
        let kind = match err.kind() {
            IoErrorKind::ConnectionReset => TransportErrorKind::ConnectionReset,
            IoErrorKind::ConnectionAborted => TransportErrorKind::ConnectionAborted,
            IoErrorKind::BrokenPipe => TransportErrorKind::BrokenPipe,
            IoErrorKind::TimedOut | IoErrorKind::WouldBlock => TransportErrorKind::TimedOut,
            IoErrorKind::NotConnected => TransportErrorKind::NotConnected,
            _ => TransportErrorKind::Io,
        };
        TransportError::new(kind, err.to_string())
    }
}

impl From<native_tls::Error> for TransportError {
    fn from(err: native_tls::Error) -> TransportError {
        TransportError::new(TransportErrorKind::Tls, err.to_string())
    }
}

impl<S> From<native_tls::HandshakeError<S>> for TransportError {
    fn from(err: native_tls::HandshakeError<S>) -> TransportError {
        let message = match err {
            native_tls::HandshakeError::Failure(e) => e.to_string(),
            native_tls::HandshakeError::WouldBlock(_) => "TLS handshake would block".to_string(),
        };
        TransportError::new(TransportErrorKind::Tls, message)
    }
}

/// A set of errors that can occur while retrieving mail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection kept failing and the retry budget ran out.
    #[error("connection lost after {attempts} attempt(s): {source}")]
    ConnectionLost {
        /// How many times the unit of work was attempted.
        attempts: u32,
        /// The last connection failure.
        source: TransportError,
    },
    /// The server kept answering with malformed or unexpected responses.
    #[error("unusable server response after {attempts} attempt(s): {source}")]
    Protocol {
        /// How many times the unit of work was attempted.
        attempts: u32,
        /// The last response failure.
        source: TransportError,
    },
    /// The server explicitly refused a command.
    #[error("server error: {0}")]
    Server(#[source] TransportError),
    /// The server's certificate could not be verified. Never retried.
    #[error("certificate verification failed: {0}")]
    CertificateTrust(#[source] TransportError),
    /// A transport failure that is neither transient nor a server verdict.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
    /// The mailbox was recreated while the call was in progress.
    #[error("UIDVALIDITY of {mailbox} changed from {expected} to {found}")]
    UidValidityChanged {
        /// The (decoded) mailbox name.
        mailbox: String,
        /// The validity the call started with.
        expected: Uid,
        /// The validity reported after reselecting.
        found: Uid,
    },
    /// Retrieval options that cannot be honored.
    #[error("invalid option: {0}")]
    InvalidOption(String),
    /// A folder name pattern that is not a valid regular expression.
    #[error("invalid folder pattern: {0}")]
    Pattern(#[from] regex::Error),
    /// A message payload that could not be parsed.
    #[error("message parse error: {0}")]
    MessageParse(#[from] mailparse::MailParseError),
    /// A `-ERR` response from a POP3 server.
    #[error("POP3 error: {0}")]
    Pop3(String),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Error {
        Error::Transport(err)
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Transport(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_are_preserved() {
        let err: TransportError = IoError::new(IoErrorKind::BrokenPipe, "gone").into();
        assert_eq!(err.kind(), TransportErrorKind::BrokenPipe);
        assert_eq!(err.message(), "gone");

        let err: TransportError = IoError::new(IoErrorKind::WouldBlock, "slow").into();
        assert_eq!(err.kind(), TransportErrorKind::TimedOut);

        let err: TransportError = IoError::new(IoErrorKind::PermissionDenied, "nope").into();
        assert_eq!(err.kind(), TransportErrorKind::Io);
    }

    #[test]
    fn display_includes_attempts() {
        let err = Error::ConnectionLost {
            attempts: 4,
            source: TransportError::new(TransportErrorKind::ConnectionReset, "reset by peer"),
        };
        assert_eq!(
            err.to_string(),
            "connection lost after 4 attempt(s): connection reset: reset by peer"
        );
    }
}
